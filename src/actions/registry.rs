//! Action handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::{ActionHandler, ActionResult, BuiltinAction, FnHandler};
use crate::cloud::CloudOperations;
use crate::runbook::{Context, Params};

/// Name-indexed table of action handlers.
///
/// Read-mostly: lookups take a shared lock and clone the handler `Arc`, so a
/// handler keeps running even if it is replaced mid-execution.
#[derive(Default)]
pub struct ActionRegistry {
    /// Handlers indexed by action name
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry").field("actions", &self.names()).finish()
    }
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in action.
    ///
    /// With a cloud backend the built-ins forward to it; without one they
    /// return deterministic stub outputs.
    pub fn with_builtins(cloud: Option<Arc<dyn CloudOperations>>) -> Self {
        let registry = Self::new();
        for action in BuiltinAction::ALL {
            registry.register(action.name(), Arc::new(action.handler(cloud.clone())));
        }
        registry
    }

    /// Register a handler, replacing any existing one with the same name.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        let name = name.into();
        if self.handlers.write().insert(name.clone(), handler).is_some() {
            tracing::debug!(action = name, "Replaced action handler");
        }
    }

    /// Register a synchronous closure as a handler.
    pub fn register_fn<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(&Params, &Context) -> ActionResult<Value> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnHandler::new(func)));
    }

    /// Remove a handler. Returns whether one was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.write().remove(name).is_some()
    }

    /// Look up a handler.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.read().get(name).cloned()
    }

    /// Check if a handler exists.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Registered action names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
