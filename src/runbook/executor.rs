//! Runbook execution engine.
//!
//! Drives one runbook through `running` to a terminal status: preconditions,
//! then main steps in order, then the rollback sequence if a main step
//! failed. Step failures are captured into the execution record; nothing a
//! handler does (error, timeout or panic) escapes [`RunbookExecutor::execute`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::template::resolve_params;
use super::{
    Context, ExecutionStatus, ExecutionStore, Params, PreconditionChecker, Runbook,
    RunbookExecution, RunbookLoader, RunbookStep, StepError, StepResult,
};
use crate::actions::{ActionHandler, ActionRegistry};
use crate::cloud::CloudOperations;
use crate::core::{retry_async, Config, EngineConfig, RetryConfig};

/// Error recorded when a precondition blocks an execution.
pub const PRECONDITIONS_NOT_MET: &str = "Preconditions not met";

/// Error recorded when an execution is cancelled between steps.
pub const EXECUTION_CANCELLED: &str = "Execution cancelled";

/// Executor-wide defaults.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Dry-run mode for calls that don't choose one
    pub dry_run: bool,

    /// Deadline for steps without `timeout_seconds` (zero disables it)
    pub default_timeout: Duration,

    /// Upper bound on a step's `retry_count`
    pub max_retries: u32,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ExecutorSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            default_timeout: config.default_timeout(),
            max_retries: config.max_retries,
        }
    }
}

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Overrides the executor's dry-run default
    pub dry_run: Option<bool>,

    /// External incident this run answers
    pub issue_id: Option<String>,

    /// Checked before each main step
    pub cancel: Option<CancellationToken>,
}

impl ExecuteOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force dry-run on or off for this call.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }

    /// Attach an issue id.
    pub fn issue(mut self, issue_id: impl Into<String>) -> Self {
        self.issue_id = Some(issue_id.into());
        self
    }

    /// Attach a cancellation token.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Executes runbooks and records their outcomes.
///
/// One instance is shared by concurrent executions; each call owns its own
/// context and step results.
pub struct RunbookExecutor {
    loader: Arc<RunbookLoader>,
    actions: Arc<ActionRegistry>,
    preconditions: PreconditionChecker,
    store: Arc<ExecutionStore>,
    settings: ExecutorSettings,
}

impl std::fmt::Debug for RunbookExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunbookExecutor")
            .field("runbooks", &self.loader.catalog().len())
            .field("actions", &self.actions.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RunbookExecutor {
    /// Create an executor over a catalog and an action registry.
    pub fn new(loader: Arc<RunbookLoader>, actions: Arc<ActionRegistry>) -> Self {
        Self {
            loader,
            actions,
            preconditions: PreconditionChecker::new(),
            store: Arc::new(ExecutionStore::default()),
            settings: ExecutorSettings::default(),
        }
    }

    /// Build a fully wired executor from configuration and load its runbooks.
    pub fn from_config(config: &Config, cloud: Option<Arc<dyn CloudOperations>>) -> Self {
        let loader = Arc::new(RunbookLoader::new(config.engine.runbooks_dir.clone()));
        loader.load_all();

        let actions = Arc::new(ActionRegistry::with_builtins(cloud.clone()));
        let mut executor = Self::new(loader, actions)
            .with_store(Arc::new(ExecutionStore::new(config.store.history_limit)))
            .with_settings(ExecutorSettings::from(&config.engine));
        if let Some(cloud) = cloud {
            executor = executor.with_cloud(cloud);
        }
        executor
    }

    /// Verify `resource_exists` preconditions through `cloud`.
    pub fn with_cloud(mut self, cloud: Arc<dyn CloudOperations>) -> Self {
        self.preconditions = PreconditionChecker::with_cloud(cloud);
        self
    }

    /// Record executions into `store`.
    pub fn with_store(mut self, store: Arc<ExecutionStore>) -> Self {
        self.store = store;
        self
    }

    /// Replace the executor defaults.
    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Runbook catalog.
    pub fn loader(&self) -> &Arc<RunbookLoader> {
        &self.loader
    }

    /// Action registry.
    pub fn actions(&self) -> &Arc<ActionRegistry> {
        &self.actions
    }

    /// Execution history.
    pub fn store(&self) -> &Arc<ExecutionStore> {
        &self.store
    }

    /// Executor defaults.
    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Execute the runbook registered under `runbook_id`.
    ///
    /// An unknown id yields a `failed` execution with no step results.
    pub async fn execute(
        &self,
        runbook_id: &str,
        context: Context,
        options: ExecuteOptions,
    ) -> RunbookExecution {
        match self.loader.get(runbook_id) {
            Some(runbook) => self.execute_runbook(&runbook, context, options).await,
            None => {
                tracing::warn!(runbook_id, "Runbook not found");
                let mut execution = RunbookExecution::start(runbook_id, options.issue_id, context);
                let error = format!("Runbook not found: {runbook_id}");
                execution.finish(ExecutionStatus::Failed, Some(error));
                self.complete(execution)
            }
        }
    }

    /// Execute the runbook triggered by `pattern_id`, if any.
    pub async fn execute_for_pattern(
        &self,
        pattern_id: &str,
        context: Context,
        options: ExecuteOptions,
    ) -> Option<RunbookExecution> {
        let runbook = self.loader.get_for_pattern(pattern_id)?;
        Some(self.execute_runbook(&runbook, context, options).await)
    }

    /// Execute a runbook definition directly.
    pub async fn execute_runbook(
        &self,
        runbook: &Runbook,
        context: Context,
        options: ExecuteOptions,
    ) -> RunbookExecution {
        let dry_run = options.dry_run.unwrap_or(self.settings.dry_run);
        let mut execution = RunbookExecution::start(&runbook.id, options.issue_id.clone(), context);

        tracing::info!(
            runbook_id = runbook.id,
            execution_id = execution.execution_id,
            dry_run,
            "Starting runbook execution"
        );

        let checked = self.preconditions.check_all(&runbook.preconditions, &execution.context).await;
        if let Err(e) = checked {
            tracing::warn!(runbook_id = runbook.id, error = %e, "Preconditions not met");
            execution.finish(ExecutionStatus::Failed, Some(PRECONDITIONS_NOT_MET.to_string()));
            return self.complete(execution);
        }

        let mut failure = None;
        for (index, step) in runbook.steps.iter().enumerate() {
            if options.is_cancelled() {
                tracing::info!(runbook_id = runbook.id, step_id = step.id, "Execution cancelled");
                let remaining = runbook.steps[index..].iter().map(|s| StepResult::skipped(&s.id));
                execution.step_results.extend(remaining);
                execution.main_step_count = execution.step_results.len();
                execution.finish(ExecutionStatus::Cancelled, Some(EXECUTION_CANCELLED.to_string()));
                return self.complete(execution);
            }

            let result = self.run_step(step, &execution.context, dry_run).await;
            let succeeded = result.is_success();

            if succeeded {
                if let Some(key) = &step.output {
                    execution.context.insert(key.clone(), result.output.clone());
                }
            } else {
                let message = result.error.as_deref().unwrap_or("unknown error");
                failure = Some(format!("Step '{}' failed: {message}", step.id));
            }
            execution.step_results.push(result);

            if !succeeded {
                break;
            }
        }
        execution.main_step_count = execution.step_results.len();

        match failure {
            None => execution.finish(ExecutionStatus::Success, None),
            Some(error) if !runbook.has_rollback() => {
                execution.finish(ExecutionStatus::Failed, Some(error));
            }
            Some(error) => {
                let error = self.roll_back(runbook, &mut execution, dry_run, error).await;
                execution.finish(ExecutionStatus::RolledBack, Some(error));
            }
        }

        self.complete(execution)
    }

    /// Run rollback steps until one fails. Returns the execution error.
    async fn roll_back(
        &self,
        runbook: &Runbook,
        execution: &mut RunbookExecution,
        dry_run: bool,
        mut error: String,
    ) -> String {
        tracing::warn!(
            runbook_id = runbook.id,
            execution_id = execution.execution_id,
            steps = runbook.rollback.len(),
            "Rolling back"
        );

        for step in &runbook.rollback {
            let result = self.run_step(step, &execution.context, dry_run).await;
            let failed = result.is_failed();

            if failed {
                let message = result.error.as_deref().unwrap_or("unknown error");
                error.push_str(&format!("; rollback step '{}' failed: {message}", step.id));
                tracing::warn!(step_id = step.id, "Rollback stopped at failed step");
            }
            execution.step_results.push(result);

            if failed {
                break;
            }
        }

        error
    }

    /// Resolve, dispatch and time one step.
    async fn run_step(&self, step: &RunbookStep, context: &Context, dry_run: bool) -> StepResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let params = resolve_params(&step.params, context);

        tracing::info!(step_id = step.id, action = step.action, dry_run, "Executing step");
        if step.requires_approval {
            tracing::info!(step_id = step.id, "Step is marked as requiring approval");
        }

        let (outcome, attempts) = self.dispatch(step, params, context, dry_run).await;
        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(output) => StepResult::success(&step.id, output),
            Err(e) => {
                tracing::warn!(
                    step_id = step.id,
                    kind = e.kind(),
                    attempts,
                    error = %e,
                    "Step failed"
                );
                StepResult::failed(&step.id, e.to_string())
            }
        };
        result.timed(started_at, duration_ms).with_attempts(attempts)
    }

    async fn dispatch(
        &self,
        step: &RunbookStep,
        params: Params,
        context: &Context,
        dry_run: bool,
    ) -> (Result<Value, StepError>, u32) {
        let Some(handler) = self.actions.get(&step.action) else {
            return (Err(StepError::UnknownAction(step.action.clone())), 0);
        };

        if dry_run {
            return (Ok(json!({"dry_run": true, "params": params})), 0);
        }

        let config = self.retry_config(step);
        let deadline = config.attempt_timeout;
        let handler = handler.as_ref();
        let params = &params;
        let step_id = step.id.as_str();

        let outcome = retry_async(
            &config,
            move |attempt| async move {
                if attempt > 1 {
                    tracing::debug!(step_id, attempt, "Retrying step");
                }
                invoke(handler, params, context, deadline).await
            },
            StepError::is_retryable,
        )
        .await;

        (outcome.result, outcome.attempts)
    }

    fn retry_config(&self, step: &RunbookStep) -> RetryConfig {
        let retries = step.retry_count.min(self.settings.max_retries);
        if retries < step.retry_count {
            tracing::debug!(step_id = step.id, retries, "Capped step retry_count");
        }

        let timeout = match step.timeout_seconds {
            Some(seconds) if seconds > 0 => Duration::from_secs(seconds),
            _ => self.settings.default_timeout,
        };

        RetryConfig::immediate(retries, (!timeout.is_zero()).then_some(timeout))
    }

    fn complete(&self, execution: RunbookExecution) -> RunbookExecution {
        tracing::info!(
            runbook_id = execution.runbook_id,
            execution_id = execution.execution_id,
            status = %execution.status,
            steps = execution.step_results.len(),
            "Execution finished"
        );
        self.store.save(execution.clone());
        execution
    }
}

/// Invoke a handler once under an optional deadline, containing panics.
async fn invoke(
    handler: &dyn ActionHandler,
    params: &Params,
    context: &Context,
    deadline: Option<Duration>,
) -> Result<Value, StepError> {
    let call = AssertUnwindSafe(handler.execute(params, context)).catch_unwind();

    let outcome = match deadline {
        Some(limit) => {
            tokio::time::timeout(limit, call).await.map_err(|_| StepError::Timeout(limit))?
        }
        None => call.await,
    };

    match outcome {
        Ok(result) => result.map_err(StepError::from),
        Err(payload) => Err(StepError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
