//! Runbook engine.
//!
//! Runbooks are YAML files that declare a remediation procedure: triggers,
//! preconditions, an ordered list of steps and an optional rollback sequence.
//! The [`RunbookExecutor`] runs them against an input context and records
//! every run as a [`RunbookExecution`].

mod error;
mod execution;
mod executor;
mod loader;
mod parser;
mod precondition;
mod schema;
mod store;
pub mod template;

pub use error::{LoadError, PreconditionError, StepError};
pub use execution::{ExecutionStatus, RunbookExecution, StepResult, StepStatus};
pub use executor::{
    ExecuteOptions, ExecutorSettings, RunbookExecutor, EXECUTION_CANCELLED, PRECONDITIONS_NOT_MET,
};
pub use loader::{Catalog, RunbookLoader};
pub use parser::{is_runbook_file, parse_runbook, parse_runbook_str, scan_runbook_dir};
pub use precondition::{PreconditionChecker, DEFAULT_MAX_RESTARTS};
pub use schema::{Context, Params, Precondition, Runbook, RunbookStep, Trigger};
pub use store::{ExecutionStats, ExecutionStore, DEFAULT_HISTORY_LIMIT};
