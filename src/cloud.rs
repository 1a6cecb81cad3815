//! Cloud operations seam.
//!
//! The engine never talks to infrastructure directly. Built-in action handlers
//! and the `resource_exists` precondition forward to an injected
//! [`CloudOperations`] implementation; without one they fall back to
//! deterministic stub results.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::runbook::Params;

/// Default resource kind when a step does not name one.
pub const DEFAULT_KIND: &str = "deployment";

/// Default namespace when a step does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Errors reported by a cloud operations backend.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The addressed resource does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The command security filter rejected the operation.
    #[error("Blocked by security policy: {0}")]
    Blocked(String),

    /// Any other API failure.
    #[error("Cloud API error: {0}")]
    Api(String),
}

/// Address of an infrastructure resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Resource kind (deployment, statefulset, ...)
    pub kind: String,
    /// Resource name
    pub name: String,
    /// Namespace
    pub namespace: String,
}

impl ResourceRef {
    /// Create a reference.
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self { kind: kind.into(), name: name.into(), namespace: namespace.into() }
    }

    /// Build a reference from step parameters.
    ///
    /// Reads `kind`, `name` (alias `resource`) and `namespace`; missing fields
    /// fall back to defaults, and `name` falls back to an empty string.
    pub fn from_params(params: &Params) -> Self {
        let field = |keys: &[&str], default: &str| {
            keys.iter()
                .find_map(|k| params.get(*k).and_then(Value::as_str))
                .unwrap_or(default)
                .to_string()
        };

        Self {
            kind: field(&["kind"], DEFAULT_KIND),
            name: field(&["name", "resource"], ""),
            namespace: field(&["namespace"], DEFAULT_NAMESPACE),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

/// Infrastructure operations the built-in handlers delegate to.
///
/// Outputs are opaque to the engine; they are stored on the step result and
/// bound into the context, never interpreted.
#[async_trait]
pub trait CloudOperations: Send + Sync {
    /// Whether the resource exists.
    async fn resource_exists(&self, target: &ResourceRef) -> Result<bool, CloudError>;

    /// Fetch a resource.
    async fn get_resource(&self, target: &ResourceRef) -> Result<Value, CloudError>;

    /// Apply a patch to a resource.
    async fn patch_resource(&self, target: &ResourceRef, patch: &Value)
        -> Result<Value, CloudError>;

    /// Trigger a rolling restart.
    async fn rollout_restart(&self, target: &ResourceRef) -> Result<Value, CloudError>;

    /// Roll back to a previous revision (latest previous when `None`).
    async fn rollout_undo(
        &self,
        target: &ResourceRef,
        revision: Option<i64>,
    ) -> Result<Value, CloudError>;

    /// Block until the rollout completes or `timeout` elapses.
    async fn wait_rollout(
        &self,
        target: &ResourceRef,
        timeout: Duration,
    ) -> Result<Value, CloudError>;

    /// Check resource health.
    async fn verify_health(&self, target: &ResourceRef) -> Result<Value, CloudError>;

    /// Run a metrics query.
    async fn query_metric(&self, query: &str) -> Result<Value, CloudError>;
}
