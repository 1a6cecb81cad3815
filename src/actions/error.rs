//! Action handler error types.

use thiserror::Error;

use crate::cloud::CloudError;

/// Result type for action handlers.
pub type ActionResult<T> = Result<T, ActionError>;

/// Errors an action handler can report.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action ran and failed.
    #[error("{0}")]
    Failed(String),

    /// Parameters were missing or unusable.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The command security filter refused the operation.
    #[error("Blocked: {0}")]
    Blocked(String),
}

impl ActionError {
    /// Create a failure from any displayable error.
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<CloudError> for ActionError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::Blocked(reason) => Self::Blocked(reason),
            other => Self::Failed(other.to_string()),
        }
    }
}
