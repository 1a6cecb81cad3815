//! In-memory execution history.
//!
//! Bounded: once `limit` records are held, saving a new one evicts the oldest.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::Serialize;

use super::{ExecutionStatus, RunbookExecution};

/// Default number of executions retained.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Counts of stored executions by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub rolled_back: usize,
    pub cancelled: usize,
}

#[derive(Debug, Default)]
struct StoreInner {
    /// Execution ids, oldest first
    order: VecDeque<String>,
    /// Records keyed by execution id
    records: HashMap<String, RunbookExecution>,
}

/// Thread-safe, bounded store of finished executions.
#[derive(Debug)]
pub struct ExecutionStore {
    inner: RwLock<StoreInner>,
    limit: usize,
}

impl Default for ExecutionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ExecutionStore {
    /// Create a store retaining at most `limit` executions (minimum 1).
    pub fn new(limit: usize) -> Self {
        Self { inner: RwLock::new(StoreInner::default()), limit: limit.max(1) }
    }

    /// Maximum number of executions retained.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Save an execution. Re-saving an id replaces the record in place.
    pub fn save(&self, execution: RunbookExecution) {
        let mut inner = self.inner.write();
        let id = execution.execution_id.clone();

        if inner.records.insert(id.clone(), execution).is_none() {
            inner.order.push_back(id);
        }

        while inner.order.len() > self.limit {
            if let Some(evicted) = inner.order.pop_front() {
                inner.records.remove(&evicted);
                tracing::trace!(execution_id = evicted, "Evicted execution from history");
            }
        }
    }

    /// Get an execution by id.
    pub fn get(&self, execution_id: &str) -> Option<RunbookExecution> {
        self.inner.read().records.get(execution_id).cloned()
    }

    /// Most recent executions, newest first.
    pub fn list(&self, limit: usize) -> Vec<RunbookExecution> {
        let inner = self.inner.read();
        inner.order.iter().rev().take(limit).filter_map(|id| inner.records.get(id)).cloned().collect()
    }

    /// Most recent executions of one runbook, newest first.
    pub fn list_for_runbook(&self, runbook_id: &str, limit: usize) -> Vec<RunbookExecution> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.records.get(id))
            .filter(|e| e.runbook_id == runbook_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Counts by status.
    pub fn stats(&self) -> ExecutionStats {
        let inner = self.inner.read();
        let mut stats = ExecutionStats { total: inner.records.len(), ..Default::default() };
        for execution in inner.records.values() {
            match execution.status {
                ExecutionStatus::Success => stats.success += 1,
                ExecutionStatus::Failed => stats.failed += 1,
                ExecutionStatus::RolledBack => stats.rolled_back += 1,
                ExecutionStatus::Cancelled => stats.cancelled += 1,
                ExecutionStatus::Pending | ExecutionStatus::Running => {}
            }
        }
        stats
    }

    /// Number of stored executions.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Drop all records.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.order.clear();
        inner.records.clear();
    }
}
