//! Runbook schema definitions.
//!
//! Defines the YAML structure for remediation runbook files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution context threaded through a run: caller input plus step outputs.
pub type Context = Map<String, Value>;

/// Step or precondition parameters. String leaves may hold `{{ path }}` placeholders.
pub type Params = Map<String, Value>;

/// A runbook definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Runbook {
    /// Unique identifier (catalog key)
    #[serde(default)]
    pub id: String,

    /// Human readable name
    #[serde(default)]
    pub name: String,

    /// Description of what this runbook remediates
    #[serde(default)]
    pub description: String,

    /// Trigger descriptors; `pattern_id` feeds the trigger index
    #[serde(default)]
    pub triggers: Vec<Trigger>,

    /// Guards evaluated in order before any step runs
    #[serde(default)]
    pub preconditions: Vec<Precondition>,

    /// Main procedure
    #[serde(default)]
    pub steps: Vec<RunbookStep>,

    /// Executed only when a main step fails
    #[serde(default)]
    pub rollback: Vec<RunbookStep>,

    /// Notifier configuration, passed through untouched
    #[serde(default)]
    pub notifications: Map<String, Value>,
}

/// A trigger descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trigger {
    /// Pattern this runbook answers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,

    /// Anything else the trigger layer cares about
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A guard evaluated before the main procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Precondition {
    /// Check name (e.g. `resource_exists`, `restart_count_below`)
    pub check: String,

    /// Check-specific fields such as `max_restarts`
    #[serde(flatten)]
    pub params: Params,
}

/// A step in the runbook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunbookStep {
    /// Step identifier, unique within its runbook
    pub id: String,

    /// Name of the action handler to invoke
    pub action: String,

    /// Description of this step
    #[serde(default)]
    pub description: String,

    /// Handler parameters
    #[serde(default)]
    pub params: Params,

    /// Context key the step output is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Advisory flag for an external approval workflow
    #[serde(default)]
    pub requires_approval: bool,

    /// Per-attempt deadline; falls back to the engine default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Additional attempts after the first failure
    #[serde(default)]
    pub retry_count: u32,
}

impl Runbook {
    /// Get the number of main steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Whether a rollback sequence is defined.
    pub fn has_rollback(&self) -> bool {
        !self.rollback.is_empty()
    }

    /// Pattern ids declared by this runbook's triggers.
    pub fn pattern_ids(&self) -> impl Iterator<Item = &str> {
        self.triggers.iter().filter_map(|t| t.pattern_id.as_deref()).filter(|p| !p.is_empty())
    }
}

impl Precondition {
    /// Create a precondition with no parameters.
    pub fn new(check: impl Into<String>) -> Self {
        Self { check: check.into(), params: Params::new() }
    }

    /// Add a parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl RunbookStep {
    /// Create a step invoking `action`.
    pub fn new(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self { id: id.into(), action: action.into(), ..Default::default() }
    }

    /// Add a parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Bind the step output to a context key.
    pub fn with_output(mut self, key: impl Into<String>) -> Self {
        self.output = Some(key.into());
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Set the retry count.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }
}
