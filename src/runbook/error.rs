//! Runbook engine error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::actions::ActionError;

/// Errors raised while loading a single runbook definition.
///
/// The loader logs these and moves on to the next file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Definition is not valid YAML/JSON for a runbook.
    #[error("Malformed runbook definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// File has no content.
    #[error("Runbook definition is empty")]
    Empty,

    /// Definition parsed but carries no usable `id`.
    #[error("Runbook definition has no id")]
    MissingId,
}

/// Why a single step did not succeed.
///
/// Always captured into `StepResult::error`; never returned from the executor.
#[derive(Debug, Error)]
pub enum StepError {
    /// No handler registered under the step's action name.
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Handler returned an error.
    #[error("{0}")]
    Action(ActionError),

    /// Handler exceeded the step's deadline.
    #[error("Step timed out after {0:?}")]
    Timeout(Duration),

    /// Handler panicked.
    #[error("Action handler panicked: {0}")]
    Panicked(String),
}

impl StepError {
    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownAction(_) => "unknown_action",
            Self::Action(ActionError::Blocked(_)) => "blocked",
            Self::Action(_) => "step_execution_error",
            Self::Timeout(_) => "timeout",
            Self::Panicked(_) => "step_execution_error",
        }
    }

    /// Whether another attempt could change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnknownAction(_) | Self::Action(ActionError::Blocked(_)))
    }
}

impl From<ActionError> for StepError {
    fn from(err: ActionError) -> Self {
        Self::Action(err)
    }
}

/// A precondition that was not satisfied.
#[derive(Debug, Error)]
#[error("Precondition '{check}' not met: {reason}")]
pub struct PreconditionError {
    /// Check name
    pub check: String,
    /// Why it failed
    pub reason: String,
}

impl PreconditionError {
    pub(crate) fn new(check: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { check: check.into(), reason: reason.into() }
    }
}
