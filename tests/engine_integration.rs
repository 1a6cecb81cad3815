//! Engine Integration Tests
//!
//! Exercises the loader, executor and store together through the public API.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use remediator::actions::{ActionError, ActionRegistry};
use remediator::runbook::{
    template, Context, ExecuteOptions, ExecutionStatus, ExecutionStore, Precondition, Runbook,
    RunbookExecutor, RunbookLoader, RunbookStep, StepStatus,
};

fn ctx(value: Value) -> Context {
    value.as_object().cloned().unwrap_or_default()
}

fn runbook(id: &str, steps: Vec<RunbookStep>, rollback: Vec<RunbookStep>) -> Runbook {
    Runbook { id: id.into(), name: id.into(), steps, rollback, ..Default::default() }
}

fn executor_with(runbooks: Vec<Runbook>, actions: ActionRegistry) -> RunbookExecutor {
    let loader = Arc::new(RunbookLoader::with_runbooks("unused", runbooks));
    RunbookExecutor::new(loader, Arc::new(actions))
}

/// Registry with `ok` (echoes params) and `fail` (always errors).
fn test_actions() -> ActionRegistry {
    let actions = ActionRegistry::with_builtins(None);
    actions.register_fn("ok", |params, _| Ok(Value::Object(params.clone())));
    actions.register_fn("fail", |_, _| Err(ActionError::failed("boom")));
    actions
}

fn step_summary(results: &[remediator::StepResult]) -> Vec<(&str, StepStatus)> {
    results.iter().map(|r| (r.step_id.as_str(), r.status)).collect()
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_directory_skips_malformed_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.yaml"), "id: first\nsteps:\n  - id: s1\n    action: ok\n").unwrap();
    std::fs::write(dir.path().join("b.yml"), "id: second\nsteps: []\n").unwrap();
    std::fs::write(dir.path().join("c.yaml"), "id: [this is: not valid\n").unwrap();

    let loader = RunbookLoader::new(dir.path());
    let loaded = loader.load_all();

    assert_eq!(loaded.len(), 2);
    assert!(loader.get("first").is_some());
    assert!(loader.get("second").is_some());
}

#[test]
fn test_reload_swaps_catalog() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.yaml"), "id: first\ntriggers:\n  - pattern_id: oom\n").unwrap();

    let loader = RunbookLoader::new(dir.path());
    assert_eq!(loader.reload(), 1);
    let snapshot = loader.catalog();

    std::fs::write(dir.path().join("b.yaml"), "id: second\ntriggers:\n  - pattern_id: oom\n").unwrap();
    assert_eq!(loader.reload(), 2);

    assert_eq!(loader.get_for_pattern("oom").unwrap().id, "second");
    assert_eq!(snapshot.get_for_pattern("oom").unwrap().id, "first");
}

// ============================================================================
// Templates
// ============================================================================

#[test]
fn test_template_resolution() {
    let context = ctx(json!({"a": {"b": 5}}));

    assert_eq!(template::resolve_str("{{ a.b }}", &context), "5");
    assert_eq!(template::resolve_str("{{ a.c }}", &context), "{{ a.c }}");
}

// ============================================================================
// Executor
// ============================================================================

#[tokio::test]
async fn test_unknown_runbook() {
    let store = Arc::new(ExecutionStore::default());
    let exec = executor_with(Vec::new(), test_actions()).with_store(Arc::clone(&store));

    let execution = exec.execute("nonexistent", Context::new(), ExecuteOptions::new()).await;

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.step_results.is_empty());
    assert!(execution.error.as_deref().unwrap().contains("not found"));
    assert!(execution.completed_at.is_some());
    assert!(store.get(&execution.execution_id).is_some());
}

#[tokio::test]
async fn test_precondition_failure_runs_no_steps() {
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let actions = test_actions();
    actions.register_fn("mark", move |_, _| {
        flag.store(true, Ordering::SeqCst);
        Ok(Value::Null)
    });

    let mut guarded = runbook("guarded", vec![RunbookStep::new("s1", "mark")], Vec::new());
    guarded.preconditions = vec![Precondition::new("restart_count_below").param("max_restarts", 5)];

    let exec = executor_with(vec![guarded], actions);
    let execution = exec.execute("guarded", ctx(json!({"restart_count": 10})), ExecuteOptions::new()).await;

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.error.as_deref(), Some("Preconditions not met"));
    assert!(execution.step_results.is_empty());
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_output_binding_feeds_later_steps() {
    let definition = runbook(
        "bind",
        vec![
            RunbookStep::new("s1", "get_resource_limits").param("name", "api").with_output("limits"),
            RunbookStep::new("s2", "ok").param("memory", "{{ limits.memory }}"),
        ],
        Vec::new(),
    );

    let exec = executor_with(vec![definition], test_actions());
    let execution = exec.execute("bind", Context::new(), ExecuteOptions::new()).await;

    assert_eq!(execution.status, ExecutionStatus::Success);
    let limits = &execution.step_results[0].output;
    assert_eq!(execution.step_results[1].output["memory"], limits["memory"]);
    assert_eq!(execution.step_results[1].output["memory"], "512Mi");
    assert_eq!(execution.context["limits"], *limits);
}

#[tokio::test]
async fn test_failure_with_rollback() {
    let definition = runbook(
        "rb",
        vec![RunbookStep::new("step1", "ok"), RunbookStep::new("step2", "fail"), RunbookStep::new("step3", "ok")],
        vec![RunbookStep::new("rollback1", "ok"), RunbookStep::new("rollback2", "ok")],
    );

    let exec = executor_with(vec![definition], test_actions());
    let execution = exec.execute("rb", Context::new(), ExecuteOptions::new()).await;

    assert_eq!(execution.status, ExecutionStatus::RolledBack);
    assert_eq!(
        step_summary(&execution.step_results),
        vec![
            ("step1", StepStatus::Success),
            ("step2", StepStatus::Failed),
            ("rollback1", StepStatus::Success),
            ("rollback2", StepStatus::Success),
        ]
    );
    assert_eq!(execution.error.as_deref(), Some("Step 'step2' failed: boom"));
    assert_eq!(execution.main_step_results().len(), 2);
    assert_eq!(execution.rollback_step_results().len(), 2);
}

#[tokio::test]
async fn test_failure_without_rollback() {
    let definition = runbook(
        "rb",
        vec![RunbookStep::new("step1", "ok"), RunbookStep::new("step2", "fail"), RunbookStep::new("step3", "ok")],
        Vec::new(),
    );

    let exec = executor_with(vec![definition], test_actions());
    let execution = exec.execute("rb", Context::new(), ExecuteOptions::new()).await;

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(
        step_summary(&execution.step_results),
        vec![("step1", StepStatus::Success), ("step2", StepStatus::Failed)]
    );
}

#[tokio::test]
async fn test_rollback_stops_at_first_failure() {
    let definition = runbook(
        "rb",
        vec![RunbookStep::new("step1", "fail")],
        vec![
            RunbookStep::new("rollback1", "fail"),
            RunbookStep::new("rollback2", "ok"),
        ],
    );

    let exec = executor_with(vec![definition], test_actions());
    let execution = exec.execute("rb", Context::new(), ExecuteOptions::new()).await;

    assert_eq!(execution.status, ExecutionStatus::RolledBack);
    assert_eq!(
        step_summary(&execution.step_results),
        vec![("step1", StepStatus::Failed), ("rollback1", StepStatus::Failed)]
    );
    let error = execution.error.as_deref().unwrap();
    assert!(error.contains("rollback step 'rollback1' failed"), "{error}");
}

#[tokio::test]
async fn test_dry_run_never_invokes_handler() {
    let invoked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&invoked);
    let actions = test_actions();
    actions.register_fn("restart_everything", move |_, _| {
        flag.store(true, Ordering::SeqCst);
        Ok(json!({"restarted": true}))
    });

    let definition = runbook(
        "dry",
        vec![
            RunbookStep::new("s1", "restart_everything").param("target", "{{ deployment }}"),
            RunbookStep::new("s2", "rollout_restart").param("name", "{{ deployment }}"),
        ],
        Vec::new(),
    );

    let exec = executor_with(vec![definition], actions);
    let execution = exec
        .execute("dry", ctx(json!({"deployment": "api"})), ExecuteOptions::new().dry_run(true))
        .await;

    assert_eq!(execution.status, ExecutionStatus::Success);
    assert!(!invoked.load(Ordering::SeqCst));
    assert_eq!(execution.step_results[0].output, json!({"dry_run": true, "params": {"target": "api"}}));
    assert_eq!(execution.step_results[1].output, json!({"dry_run": true, "params": {"name": "api"}}));
}

#[tokio::test]
async fn test_dry_run_still_rejects_unknown_action() {
    let definition = runbook("dry", vec![RunbookStep::new("s1", "nonexistent_action")], Vec::new());

    let exec = executor_with(vec![definition], test_actions());
    let execution = exec.execute("dry", Context::new(), ExecuteOptions::new().dry_run(true)).await;

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.step_results[0].error.as_deref(), Some("Unknown action: nonexistent_action"));
}

#[tokio::test]
async fn test_duration_is_sum_of_steps() {
    let actions = test_actions();
    actions.register("slow", Arc::new(SlowHandler));

    let definition = runbook(
        "timed",
        vec![RunbookStep::new("s1", "slow"), RunbookStep::new("s2", "slow"), RunbookStep::new("s3", "fail")],
        vec![RunbookStep::new("undo", "slow")],
    );

    let exec = executor_with(vec![definition], actions);
    let execution = exec.execute("timed", Context::new(), ExecuteOptions::new()).await;

    let sum: u64 = execution.step_results.iter().map(|r| r.duration_ms).sum();
    assert_eq!(execution.duration_ms(), sum);
    assert!(execution.step_results[0].duration_ms >= 10);
}

struct SlowHandler;

#[async_trait::async_trait]
impl remediator::ActionHandler for SlowHandler {
    async fn execute(&self, _: &remediator::runbook::Params, _: &Context) -> remediator::actions::ActionResult<Value> {
        tokio::time::sleep(std::time::Duration::from_millis(15)).await;
        Ok(json!("done"))
    }
}

#[tokio::test]
async fn test_context_is_copied_from_input() {
    let definition = runbook("copy", vec![RunbookStep::new("s1", "ok").with_output("result")], Vec::new());
    let input = ctx(json!({"pod": "api-1"}));

    let exec = executor_with(vec![definition], test_actions());
    let execution = exec.execute("copy", input.clone(), ExecuteOptions::new()).await;

    assert!(!input.contains_key("result"));
    assert!(execution.context.contains_key("result"));
    assert_eq!(execution.context["pod"], "api-1");
}

#[tokio::test]
async fn test_export_shape() {
    let definition = runbook("shape", vec![RunbookStep::new("s1", "ok").param("x", 1)], Vec::new());

    let exec = executor_with(vec![definition], test_actions());
    let execution = exec.execute("shape", Context::new(), ExecuteOptions::new().issue("INC-9")).await;
    let exported = execution.to_json();

    assert_eq!(exported["runbook_id"], "shape");
    assert_eq!(exported["issue_id"], "INC-9");
    assert_eq!(exported["status"], "success");
    assert!(exported["completed_at"].is_string());
    let step = exported["step_results"][0].as_object().unwrap();
    let mut keys: Vec<_> = step.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["duration_ms", "error", "output", "status", "step_id"]);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_executions_are_isolated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let actions = test_actions();
    actions.register_fn("echo_pod", move |params, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"pod": params.get("pod").cloned().unwrap_or(Value::Null)}))
    });

    let definition = runbook(
        "echo",
        vec![
            RunbookStep::new("s1", "echo_pod").param("pod", "{{ pod }}").with_output("first"),
            RunbookStep::new("s2", "ok").param("seen", "{{ first.pod }}"),
        ],
        Vec::new(),
    );

    let exec = Arc::new(executor_with(vec![definition], actions));
    let handles: Vec<_> = (0..20)
        .map(|i| {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move {
                let pod = format!("pod-{i}");
                let execution = exec.execute("echo", ctx(json!({"pod": pod})), ExecuteOptions::new()).await;
                (pod, execution)
            })
        })
        .collect();

    for handle in handles {
        let (pod, execution) = handle.await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.step_results[1].output["seen"], pod);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 20);
    assert_eq!(exec.store().len(), 20);
    assert_eq!(exec.store().stats().success, 20);
}
