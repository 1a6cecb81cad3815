//! Runbook parser.
//!
//! Parses YAML (or JSON) runbook files into Runbook structs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{LoadError, Runbook};

/// File extensions recognised as runbook definitions.
const RUNBOOK_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Parse a runbook from a file.
pub fn parse_runbook(path: &Path) -> Result<Runbook, LoadError> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
    parse_runbook_str(&content)
}

/// Parse a runbook from a string.
pub fn parse_runbook_str(content: &str) -> Result<Runbook, LoadError> {
    if content.trim().is_empty() {
        return Err(LoadError::Empty);
    }

    let value: serde_yaml::Value = serde_yaml::from_str(content)?;
    if value.is_null() {
        return Err(LoadError::Empty);
    }

    let runbook: Runbook = serde_yaml::from_value(value)?;
    validate_runbook(&runbook)?;
    Ok(runbook)
}

/// Validate a runbook for common errors.
fn validate_runbook(runbook: &Runbook) -> Result<(), LoadError> {
    if runbook.id.trim().is_empty() {
        return Err(LoadError::MissingId);
    }

    if runbook.steps.is_empty() {
        tracing::warn!(runbook_id = runbook.id, "Runbook has no steps");
    }

    // Output binding is by step id, so duplicates make results ambiguous
    let mut seen = HashSet::new();
    for step in runbook.steps.iter().chain(&runbook.rollback) {
        if !seen.insert(step.id.as_str()) {
            tracing::warn!(runbook_id = runbook.id, step_id = step.id, "Duplicate step id");
        }
    }

    Ok(())
}

/// Whether `path` looks like a runbook definition file.
pub fn is_runbook_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| RUNBOOK_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Scan a directory for runbook files and parse each one.
///
/// Files are visited in path order. Parse failures are returned, not raised,
/// so one bad file never hides the others.
pub fn scan_runbook_dir(dir: &Path) -> std::io::Result<Vec<(PathBuf, Result<Runbook, LoadError>)>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_runbook_file(path))
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| {
            let parsed = parse_runbook(&path);
            (path, parsed)
        })
        .collect())
}
