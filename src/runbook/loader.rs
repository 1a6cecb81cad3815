//! Runbook catalog loading.
//!
//! The loader owns a point-in-time [`Catalog`] behind a lock. A reload builds a
//! complete new catalog off to the side and swaps it in, so readers see either
//! the old catalog or the new one, never a mix.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::parser::scan_runbook_dir;
use super::Runbook;

/// Immutable snapshot of loaded runbooks and the trigger index.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    /// Runbooks keyed by id
    runbooks: HashMap<String, Arc<Runbook>>,
    /// `pattern_id` -> runbook id
    patterns: HashMap<String, String>,
}

impl Catalog {
    /// Build a catalog from runbooks in load order.
    ///
    /// Later runbooks win both id and `pattern_id` collisions.
    pub fn from_runbooks(runbooks: impl IntoIterator<Item = Runbook>) -> Self {
        let mut catalog = Self::default();
        for runbook in runbooks {
            catalog.insert(runbook);
        }
        catalog
    }

    fn insert(&mut self, runbook: Runbook) {
        for pattern_id in runbook.pattern_ids() {
            if let Some(previous) = self.patterns.insert(pattern_id.to_string(), runbook.id.clone())
            {
                if previous != runbook.id {
                    tracing::warn!(
                        pattern_id,
                        previous = previous,
                        runbook_id = runbook.id,
                        "Trigger pattern already claimed, overriding with later runbook"
                    );
                }
            }
        }

        if self.runbooks.contains_key(&runbook.id) {
            tracing::warn!(runbook_id = runbook.id, "Duplicate runbook id, replacing earlier one");
        }
        self.runbooks.insert(runbook.id.clone(), Arc::new(runbook));
    }

    /// Get a runbook by id.
    pub fn get(&self, id: &str) -> Option<Arc<Runbook>> {
        self.runbooks.get(id).cloned()
    }

    /// Get the runbook registered for a trigger pattern.
    pub fn get_for_pattern(&self, pattern_id: &str) -> Option<Arc<Runbook>> {
        self.patterns.get(pattern_id).and_then(|id| self.get(id))
    }

    /// All runbooks, sorted by id.
    pub fn list(&self) -> Vec<Arc<Runbook>> {
        let mut runbooks: Vec<_> = self.runbooks.values().cloned().collect();
        runbooks.sort_by(|a, b| a.id.cmp(&b.id));
        runbooks
    }

    /// Number of runbooks.
    pub fn len(&self) -> usize {
        self.runbooks.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.runbooks.is_empty()
    }

    /// Number of indexed trigger patterns.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

/// Loads runbook definitions from a directory into a swappable catalog.
#[derive(Debug)]
pub struct RunbookLoader {
    /// Directory holding the definitions
    dir: PathBuf,
    /// Current catalog snapshot
    catalog: RwLock<Arc<Catalog>>,
}

impl RunbookLoader {
    /// Create a loader for `dir` with an empty catalog.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), catalog: RwLock::new(Arc::new(Catalog::default())) }
    }

    /// Create a loader pre-populated with in-memory runbooks.
    pub fn with_runbooks(
        dir: impl Into<PathBuf>,
        runbooks: impl IntoIterator<Item = Runbook>,
    ) -> Self {
        let loader = Self::new(dir);
        loader.swap(Catalog::from_runbooks(runbooks));
        loader
    }

    /// The definitions directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parse every definition in the directory and swap in the new catalog.
    ///
    /// Malformed, empty and id-less files are logged and skipped. A missing
    /// directory yields an empty catalog.
    pub fn load_all(&self) -> Vec<Arc<Runbook>> {
        let runbooks = self.read_dir();
        let mut seen = HashSet::new();
        let loaded: Vec<String> =
            runbooks.iter().filter(|r| seen.insert(r.id.clone())).map(|r| r.id.clone()).collect();

        let catalog = Catalog::from_runbooks(runbooks);
        let result = loaded.iter().filter_map(|id| catalog.get(id)).collect();

        tracing::info!(
            dir = ?self.dir,
            runbooks = catalog.len(),
            patterns = catalog.pattern_count(),
            "Loaded runbook catalog"
        );
        self.swap(catalog);

        result
    }

    /// Clear and reload from disk. Returns the number of runbooks now loaded.
    pub fn reload(&self) -> usize {
        self.load_all();
        self.catalog.read().len()
    }

    /// Add or replace a single runbook without touching the rest.
    pub fn insert(&self, runbook: Runbook) {
        let mut guard = self.catalog.write();
        let mut next = Catalog::clone(&guard);
        next.insert(runbook);
        *guard = Arc::new(next);
    }

    /// Get a runbook by id.
    pub fn get(&self, id: &str) -> Option<Arc<Runbook>> {
        self.catalog.read().get(id)
    }

    /// Get the runbook registered for a trigger pattern.
    pub fn get_for_pattern(&self, pattern_id: &str) -> Option<Arc<Runbook>> {
        self.catalog.read().get_for_pattern(pattern_id)
    }

    /// All runbooks, sorted by id.
    pub fn list(&self) -> Vec<Arc<Runbook>> {
        self.catalog.read().list()
    }

    /// Current catalog snapshot. Stays valid across later reloads.
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read())
    }

    fn swap(&self, catalog: Catalog) {
        *self.catalog.write() = Arc::new(catalog);
    }

    fn read_dir(&self) -> Vec<Runbook> {
        let scanned = match scan_runbook_dir(&self.dir) {
            Ok(scanned) => scanned,
            Err(e) => {
                tracing::warn!(dir = ?self.dir, error = %e, "Cannot read runbook directory");
                return Vec::new();
            }
        };

        scanned
            .into_iter()
            .filter_map(|(path, parsed)| match parsed {
                Ok(runbook) => {
                    tracing::debug!(path = ?path, runbook_id = runbook.id, "Loaded runbook");
                    Some(runbook)
                }
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Skipping invalid runbook");
                    None
                }
            })
            .collect()
    }
}
