//! # Remediator
//!
//! Runbook execution engine for automated incident remediation.
//!
//! Runbooks are declarative YAML procedures: triggers tie them to detected
//! issue patterns, preconditions guard them, steps call named actions and an
//! optional rollback sequence undoes partial work when a step fails. Every
//! run produces a [`RunbookExecution`] record for audit and notification.
//!
//! ## Features
//!
//! - **Templated steps**: `{{ path.to.value }}` placeholders resolved against
//!   the execution context, including outputs of earlier steps
//! - **Pluggable actions**: built-in remediation actions backed by a
//!   [`CloudOperations`] implementation, plus custom handlers registered at runtime
//! - **Safe execution**: per-step timeouts, bounded retries, dry-run and
//!   cooperative cancellation
//!
//! ## Quick Start
//!
//! ```bash
//! # Validate the runbook directory
//! remediator validate runbooks/
//!
//! # Dry-run a runbook against an incident context
//! remediator run oom-kill --context '{"pod": "api-7f9c"}' --dry-run
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::redundant_clone)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::format_push_string)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::float_cmp)]

pub mod actions;
pub mod cloud;
pub mod core;
pub mod runbook;

pub use actions::{ActionError, ActionHandler, ActionRegistry};
pub use cloud::{CloudError, CloudOperations, ResourceRef};
pub use core::Config;
pub use runbook::{
    Context, ExecuteOptions, ExecutionStatus, ExecutionStore, Runbook, RunbookExecution,
    RunbookExecutor, RunbookLoader, RunbookStep, StepResult, StepStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "remediator";
