//! Precondition checks.
//!
//! Guards run in declaration order before any step; the first failure aborts
//! the execution. Unknown check names are treated as not satisfied.

use std::sync::Arc;

use serde_json::Value;

use super::template::resolve_params;
use super::{Context, Params, Precondition, PreconditionError};
use crate::cloud::{CloudOperations, ResourceRef};

/// Used when `restart_count_below` does not declare `max_restarts`.
pub const DEFAULT_MAX_RESTARTS: u64 = 5;

/// Evaluates runbook preconditions against an execution context.
#[derive(Clone, Default)]
pub struct PreconditionChecker {
    /// Backend for `resource_exists`; absent means the check passes
    cloud: Option<Arc<dyn CloudOperations>>,
}

impl std::fmt::Debug for PreconditionChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreconditionChecker").field("cloud", &self.cloud.is_some()).finish()
    }
}

/// Read a non-negative count from a number or numeric string.
fn as_count(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str()?.trim().parse().ok())
        .filter(|count| count.is_finite() && *count >= 0.0)
}

impl PreconditionChecker {
    /// Create a checker without a cloud backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a checker that verifies resources through `cloud`.
    pub fn with_cloud(cloud: Arc<dyn CloudOperations>) -> Self {
        Self { cloud: Some(cloud) }
    }

    /// Check every precondition in order, stopping at the first failure.
    pub async fn check_all(
        &self,
        preconditions: &[Precondition],
        context: &Context,
    ) -> Result<(), PreconditionError> {
        for precondition in preconditions {
            self.check(precondition, context).await?;
        }
        Ok(())
    }

    /// Check a single precondition. Parameters are template-resolved first.
    pub async fn check(
        &self,
        precondition: &Precondition,
        context: &Context,
    ) -> Result<(), PreconditionError> {
        let params = resolve_params(&precondition.params, context);
        let check = precondition.check.as_str();

        match check {
            "resource_exists" => self.resource_exists(&params).await,
            "restart_count_below" => Self::restart_count_below(&params, context),
            other => Err(PreconditionError::new(other, "unknown check")),
        }
    }

    async fn resource_exists(&self, params: &Params) -> Result<(), PreconditionError> {
        let Some(cloud) = &self.cloud else {
            tracing::debug!("No cloud backend, treating resource_exists as satisfied");
            return Ok(());
        };

        let target = ResourceRef::from_params(params);
        match cloud.resource_exists(&target).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                Err(PreconditionError::new("resource_exists", format!("{target} does not exist")))
            }
            Err(e) => Err(PreconditionError::new("resource_exists", format!("{target}: {e}"))),
        }
    }

    fn restart_count_below(params: &Params, context: &Context) -> Result<(), PreconditionError> {
        let invalid = |field: &str, value: &Value| {
            PreconditionError::new("restart_count_below", format!("invalid {field}: {value}"))
        };

        let max = match params.get("max_restarts") {
            Some(value) => as_count(value).ok_or_else(|| invalid("max_restarts", value))?,
            None => DEFAULT_MAX_RESTARTS as f64,
        };
        let count = match context.get("restart_count") {
            Some(value) => as_count(value).ok_or_else(|| invalid("restart_count", value))?,
            None => 0.0,
        };

        if count > max {
            Err(PreconditionError::new(
                "restart_count_below",
                format!("restart_count {count} exceeds max_restarts {max}"),
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::CloudError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    fn ctx(value: Value) -> Context {
        value.as_object().cloned().unwrap()
    }

    struct FixedCloud {
        exists: Result<bool, String>,
    }

    #[async_trait]
    impl CloudOperations for FixedCloud {
        async fn resource_exists(&self, target: &ResourceRef) -> Result<bool, CloudError> {
            assert_eq!(target.name, "api");
            self.exists.clone().map_err(CloudError::Api)
        }
        async fn get_resource(&self, _: &ResourceRef) -> Result<Value, CloudError> {
            unreachable!()
        }
        async fn patch_resource(&self, _: &ResourceRef, _: &Value) -> Result<Value, CloudError> {
            unreachable!()
        }
        async fn rollout_restart(&self, _: &ResourceRef) -> Result<Value, CloudError> {
            unreachable!()
        }
        async fn rollout_undo(&self, _: &ResourceRef, _: Option<i64>) -> Result<Value, CloudError> {
            unreachable!()
        }
        async fn wait_rollout(&self, _: &ResourceRef, _: Duration) -> Result<Value, CloudError> {
            unreachable!()
        }
        async fn verify_health(&self, _: &ResourceRef) -> Result<Value, CloudError> {
            unreachable!()
        }
        async fn query_metric(&self, _: &str) -> Result<Value, CloudError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_restart_count_below() {
        let checker = PreconditionChecker::new();
        let guard = Precondition::new("restart_count_below").param("max_restarts", 5);

        assert!(checker.check(&guard, &ctx(json!({"restart_count": 10}))).await.is_err());
        assert!(checker.check(&guard, &ctx(json!({"restart_count": 5}))).await.is_ok());
        assert!(checker.check(&guard, &ctx(json!({"restart_count": "3"}))).await.is_ok());
        assert!(checker.check(&guard, &Context::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_restart_count_default_max() {
        let checker = PreconditionChecker::new();
        let guard = Precondition::new("restart_count_below");

        assert!(checker.check(&guard, &ctx(json!({"restart_count": 6}))).await.is_err());
        assert!(checker.check(&guard, &ctx(json!({"restart_count": 5}))).await.is_ok());
    }

    #[tokio::test]
    async fn test_restart_count_fractional_not_truncated() {
        let checker = PreconditionChecker::new();
        let guard = Precondition::new("restart_count_below").param("max_restarts", 5);

        assert!(checker.check(&guard, &ctx(json!({"restart_count": 5.9}))).await.is_err());
        assert!(checker.check(&guard, &ctx(json!({"restart_count": 4.5}))).await.is_ok());
    }

    #[tokio::test]
    async fn test_restart_count_invalid_values_not_satisfied() {
        let checker = PreconditionChecker::new();
        let context = ctx(json!({"restart_count": 0}));

        for bad in [json!("abc"), json!(-1), json!(null), json!([5])] {
            let guard = Precondition::new("restart_count_below").param("max_restarts", bad.clone());
            let err = checker.check(&guard, &context).await.unwrap_err();
            assert!(err.reason.contains("invalid max_restarts"), "{bad}: {}", err.reason);
        }

        let guard = Precondition::new("restart_count_below");
        assert!(checker.check(&guard, &ctx(json!({"restart_count": "many"}))).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_check_not_satisfied() {
        let checker = PreconditionChecker::new();
        let err = checker.check(&Precondition::new("moon_phase_is_full"), &Context::new()).await.unwrap_err();
        assert_eq!(err.check, "moon_phase_is_full");
    }

    #[tokio::test]
    async fn test_resource_exists_without_cloud_passes() {
        let checker = PreconditionChecker::new();
        let guard = Precondition::new("resource_exists").param("name", "api");
        assert!(checker.check(&guard, &Context::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_resource_exists_delegates_with_templated_name() {
        let guard = Precondition::new("resource_exists").param("name", "{{ deployment }}");
        let context = ctx(json!({"deployment": "api"}));

        let present = PreconditionChecker::with_cloud(Arc::new(FixedCloud { exists: Ok(true) }));
        assert!(present.check(&guard, &context).await.is_ok());

        let absent = PreconditionChecker::with_cloud(Arc::new(FixedCloud { exists: Ok(false) }));
        assert!(absent.check(&guard, &context).await.is_err());

        let broken = PreconditionChecker::with_cloud(Arc::new(FixedCloud { exists: Err("timeout".into()) }));
        let err = broken.check(&guard, &context).await.unwrap_err();
        assert!(err.reason.contains("timeout"));
    }

    #[tokio::test]
    async fn test_check_all_short_circuits() {
        let checker = PreconditionChecker::new();
        let guards = vec![
            Precondition::new("restart_count_below").param("max_restarts", 1),
            Precondition::new("not_a_check"),
        ];

        let err = checker.check_all(&guards, &ctx(json!({"restart_count": 2}))).await.unwrap_err();
        assert_eq!(err.check, "restart_count_below");
    }
}
