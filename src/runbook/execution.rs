//! Execution records.
//!
//! A [`RunbookExecution`] is the audit artifact of one invocation. Its JSON
//! form (see [`RunbookExecution::to_json`]) is consumed by downstream systems
//! and must keep a stable shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Context;

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// Step id
    pub step_id: String,

    /// Final status
    pub status: StepStatus,

    /// Handler output (null on failure)
    pub output: Value,

    /// Error message, present iff failed
    pub error: Option<String>,

    /// Wall time across all attempts
    pub duration_ms: u64,

    /// When the step started
    #[serde(skip_serializing)]
    pub timestamp: DateTime<Utc>,

    /// Handler invocations made (0 for dry-run and skipped steps)
    #[serde(skip_serializing)]
    pub attempts: u32,
}

impl StepResult {
    /// A successful result.
    pub fn success(step_id: impl Into<String>, output: Value) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Success,
            output,
            error: None,
            duration_ms: 0,
            timestamp: Utc::now(),
            attempts: 1,
        }
    }

    /// A failed result.
    pub fn failed(step_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Failed,
            output: Value::Null,
            error: Some(error.into()),
            duration_ms: 0,
            timestamp: Utc::now(),
            attempts: 1,
        }
    }

    /// A step that never started.
    pub fn skipped(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Skipped,
            output: Value::Null,
            error: None,
            duration_ms: 0,
            timestamp: Utc::now(),
            attempts: 0,
        }
    }

    /// Set timing information.
    pub fn timed(mut self, timestamp: DateTime<Utc>, duration_ms: u64) -> Self {
        self.timestamp = timestamp;
        self.duration_ms = duration_ms;
        self
    }

    /// Set the attempt count.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Whether the step succeeded.
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Whether the step failed.
    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Status of a whole execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    RolledBack,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this is a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::RolledBack | Self::Cancelled)
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one runbook invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunbookExecution {
    /// Unique per invocation
    pub execution_id: String,

    /// Runbook that was (or was asked to be) executed
    pub runbook_id: String,

    /// External incident this run answers
    pub issue_id: Option<String>,

    /// Current status
    pub status: ExecutionStatus,

    /// Caller input plus bound step outputs
    pub context: Context,

    /// Main and rollback step results, in execution order
    pub step_results: Vec<StepResult>,

    /// Invocation start
    pub started_at: DateTime<Utc>,

    /// Set once terminal
    pub completed_at: Option<DateTime<Utc>>,

    /// Top-level failure summary
    pub error: Option<String>,

    /// Number of leading results that belong to the main procedure
    #[serde(skip_serializing)]
    pub(crate) main_step_count: usize,
}

impl RunbookExecution {
    /// Start a new execution in the `running` state.
    pub fn start(
        runbook_id: impl Into<String>,
        issue_id: Option<String>,
        context: Context,
    ) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            runbook_id: runbook_id.into(),
            issue_id,
            status: ExecutionStatus::Running,
            context,
            step_results: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            main_step_count: 0,
        }
    }

    /// Move to a terminal state and stamp the completion time.
    pub(crate) fn finish(&mut self, status: ExecutionStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        if error.is_some() {
            self.error = error;
        }
        self.completed_at = Some(Utc::now());
    }

    /// Whether the execution has reached a final state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Sum of step durations.
    pub fn duration_ms(&self) -> u64 {
        self.step_results.iter().map(|r| r.duration_ms).sum()
    }

    /// Results of main-procedure steps.
    pub fn main_step_results(&self) -> &[StepResult] {
        &self.step_results[..self.main_step_count.min(self.step_results.len())]
    }

    /// Results of rollback steps.
    pub fn rollback_step_results(&self) -> &[StepResult] {
        &self.step_results[self.main_step_count.min(self.step_results.len())..]
    }

    /// Find a step result by step id (first match).
    pub fn step_result(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.iter().find(|r| r.step_id == step_id)
    }

    /// Export the record in its wire shape.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
