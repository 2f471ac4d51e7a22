//! In-memory sink with bounded retention

use crate::record::ExecutionRecord;
use parking_lot::Mutex;
use sqltree_core::{CallTreeNode, SinkResult, TraceSink};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const DEFAULT_CAPACITY: usize = 100;

/// Retains completed executions in memory, evicting the oldest past a
/// configured capacity. Useful for tests and in-process inspection tooling.
pub struct MemorySink {
    capacity: usize,
    executions: Mutex<VecDeque<ExecutionRecord>>,
    total_saved: AtomicU64,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            executions: Mutex::new(VecDeque::new()),
            total_saved: AtomicU64::new(0),
        }
    }

    /// Retained executions, oldest first
    pub fn executions(&self) -> Vec<ExecutionRecord> {
        self.executions.lock().iter().cloned().collect()
    }

    /// Number of executions currently retained
    pub fn len(&self) -> usize {
        self.executions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.lock().is_empty()
    }

    /// Total saves since creation, including evicted ones
    pub fn total_saved(&self) -> u64 {
        self.total_saved.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.executions.lock().clear();
    }
}

impl TraceSink for MemorySink {
    fn save(&self, execution_id: &str, roots: Vec<CallTreeNode>) -> SinkResult<()> {
        let record = ExecutionRecord::new(execution_id, roots);
        debug!(
            execution_id,
            statements = record.total_statements(),
            "retaining completed execution"
        );

        let mut executions = self.executions.lock();
        executions.push_back(record);
        while executions.len() > self.capacity {
            executions.pop_front();
        }

        self.total_saved.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
