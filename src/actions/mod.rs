//! Action handlers.
//!
//! A step names an action; the registry maps that name to an [`ActionHandler`].
//! Built-in handlers cover the standard remediation operations and custom
//! handlers can be registered at runtime to extend or override them.

mod builtin;
mod calculate;
mod error;
mod registry;

pub use builtin::{BuiltinAction, BuiltinHandler};
pub use calculate::calculate;
pub use error::{ActionError, ActionResult};
pub use registry::ActionRegistry;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::runbook::{Context, Params};

/// Implementation of a named step action.
///
/// `params` arrive with placeholders already resolved; `context` is the
/// execution context as it stood when the step started.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action and return its output.
    async fn execute(&self, params: &Params, context: &Context) -> ActionResult<Value>;
}

/// Adapter turning a synchronous closure into an [`ActionHandler`].
///
/// The closure runs on tokio's blocking pool, so it may block on I/O without
/// stalling a runtime worker, and a step deadline still fires while it runs.
/// A closure that outlives its deadline keeps running to completion in the
/// background; its result is discarded.
pub struct FnHandler<F> {
    func: Arc<F>,
}

impl<F> FnHandler<F>
where
    F: Fn(&Params, &Context) -> ActionResult<Value> + Send + Sync + 'static,
{
    /// Wrap a closure.
    pub fn new(func: F) -> Self {
        Self { func: Arc::new(func) }
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(&Params, &Context) -> ActionResult<Value> + Send + Sync + 'static,
{
    async fn execute(&self, params: &Params, context: &Context) -> ActionResult<Value> {
        let func = Arc::clone(&self.func);
        let params = params.clone();
        let context = context.clone();

        match tokio::task::spawn_blocking(move || func(&params, &context)).await {
            Ok(result) => result,
            // Re-raise on this task so callers see the closure's own panic.
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(ActionError::failed(err)),
        }
    }
}
