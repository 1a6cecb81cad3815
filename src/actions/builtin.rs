//! Built-in remediation actions.
//!
//! Each action forwards to the injected [`CloudOperations`] backend. Without a
//! backend the resource actions return deterministic stub shapes, which keeps
//! the engine usable for dry runs and tests. `calculate` is always local.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{calculate, ActionError, ActionHandler, ActionResult};
use crate::cloud::{CloudOperations, ResourceRef};
use crate::runbook::{Context, Params};

/// Wait used by `wait_rollout` when the step does not specify one.
const DEFAULT_ROLLOUT_WAIT: Duration = Duration::from_secs(300);

/// The built-in action set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinAction {
    GetResource,
    GetResourceLimits,
    PatchResource,
    RolloutRestart,
    RolloutUndo,
    WaitRollout,
    VerifyHealth,
    Calculate,
    CheckMetrics,
}

impl BuiltinAction {
    /// Every built-in, in registration order.
    pub const ALL: [Self; 9] = [
        Self::GetResource,
        Self::GetResourceLimits,
        Self::PatchResource,
        Self::RolloutRestart,
        Self::RolloutUndo,
        Self::WaitRollout,
        Self::VerifyHealth,
        Self::Calculate,
        Self::CheckMetrics,
    ];

    /// Action name as used in runbook steps.
    pub fn name(self) -> &'static str {
        match self {
            Self::GetResource => "get_resource",
            Self::GetResourceLimits => "get_resource_limits",
            Self::PatchResource => "patch_resource",
            Self::RolloutRestart => "rollout_restart",
            Self::RolloutUndo => "rollout_undo",
            Self::WaitRollout => "wait_rollout",
            Self::VerifyHealth => "verify_health",
            Self::Calculate => "calculate",
            Self::CheckMetrics => "check_metrics",
        }
    }

    /// Look up a built-in by action name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// Build a handler for this action.
    pub fn handler(self, cloud: Option<Arc<dyn CloudOperations>>) -> BuiltinHandler {
        BuiltinHandler { action: self, cloud }
    }
}

impl std::fmt::Display for BuiltinAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Handler backing one built-in action.
pub struct BuiltinHandler {
    action: BuiltinAction,
    cloud: Option<Arc<dyn CloudOperations>>,
}

impl std::fmt::Debug for BuiltinHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinHandler")
            .field("action", &self.action)
            .field("cloud", &self.cloud.is_some())
            .finish()
    }
}

fn patch_param(params: &Params) -> ActionResult<&Value> {
    params.get("patch").ok_or_else(|| ActionError::InvalidParams("patch is required".to_string()))
}

fn revision_param(params: &Params) -> Option<i64> {
    params.get("revision").and_then(|v| v.as_i64().or_else(|| v.as_str()?.trim().parse().ok()))
}

fn wait_param(params: &Params) -> Duration {
    params
        .get("timeout_seconds")
        .or_else(|| params.get("timeout"))
        .and_then(|v| v.as_u64().or_else(|| v.as_str()?.trim().parse().ok()))
        .map_or(DEFAULT_ROLLOUT_WAIT, Duration::from_secs)
}

fn threshold_param(params: &Params) -> Option<f64> {
    params.get("threshold").and_then(|v| v.as_f64().or_else(|| v.as_str()?.trim().parse().ok()))
}

impl BuiltinHandler {
    async fn forward(
        &self,
        cloud: &dyn CloudOperations,
        target: &ResourceRef,
        params: &Params,
    ) -> ActionResult<Value> {
        let output = match self.action {
            BuiltinAction::GetResource => cloud.get_resource(target).await?,
            BuiltinAction::GetResourceLimits => {
                let resource = cloud.get_resource(target).await?;
                resource.get("limits").cloned().unwrap_or_else(|| json!({}))
            }
            BuiltinAction::PatchResource => {
                cloud.patch_resource(target, patch_param(params)?).await?
            }
            BuiltinAction::RolloutRestart => cloud.rollout_restart(target).await?,
            BuiltinAction::RolloutUndo => cloud.rollout_undo(target, revision_param(params)).await?,
            BuiltinAction::WaitRollout => cloud.wait_rollout(target, wait_param(params)).await?,
            BuiltinAction::VerifyHealth => cloud.verify_health(target).await?,
            BuiltinAction::Calculate => calculate(params)?,
            BuiltinAction::CheckMetrics => {
                let query = params.get("query").and_then(Value::as_str).unwrap_or_default();
                cloud.query_metric(query).await?
            }
        };
        Ok(output)
    }

    fn stub(&self, target: &ResourceRef, params: &Params) -> ActionResult<Value> {
        let ResourceRef { kind, name, namespace } = target;
        let output = match self.action {
            BuiltinAction::GetResource => {
                json!({"kind": kind, "name": name, "namespace": namespace, "exists": true})
            }
            BuiltinAction::GetResourceLimits => {
                json!({"name": name, "namespace": namespace, "memory": "512Mi", "cpu": "500m"})
            }
            BuiltinAction::PatchResource => json!({
                "patched": true,
                "kind": kind,
                "name": name,
                "namespace": namespace,
                "patch": patch_param(params)?,
            }),
            BuiltinAction::RolloutRestart => {
                json!({"restarted": true, "name": name, "namespace": namespace})
            }
            BuiltinAction::RolloutUndo => json!({
                "rolled_back": true,
                "name": name,
                "namespace": namespace,
                "revision": revision_param(params),
            }),
            BuiltinAction::WaitRollout => {
                json!({"ready": true, "name": name, "namespace": namespace})
            }
            BuiltinAction::VerifyHealth => {
                json!({"healthy": true, "name": name, "namespace": namespace})
            }
            BuiltinAction::Calculate => calculate(params)?,
            BuiltinAction::CheckMetrics => {
                let threshold = threshold_param(params);
                let value = 0.0_f64;
                json!({
                    "query": params.get("query").cloned().unwrap_or(Value::Null),
                    "value": value,
                    "threshold": threshold,
                    "within_threshold": threshold.map_or(true, |t| value <= t),
                })
            }
        };
        Ok(output)
    }
}

#[async_trait]
impl ActionHandler for BuiltinHandler {
    async fn execute(&self, params: &Params, _context: &Context) -> ActionResult<Value> {
        let target = ResourceRef::from_params(params);
        match &self.cloud {
            Some(cloud) => {
                tracing::debug!(action = %self.action, target = %target, "Forwarding to cloud");
                self.forward(cloud.as_ref(), &target, params).await
            }
            None => self.stub(&target, params),
        }
    }
}
