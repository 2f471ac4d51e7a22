//! Serialized shape of one completed execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqltree_core::CallTreeNode;

/// One completed execution as handed to a sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Execution ID
    pub execution_id: String,

    /// When the record was written
    pub saved_at: DateTime<Utc>,

    /// Completed root nodes, each carrying its full subtree
    pub roots: Vec<CallTreeNode>,
}

impl ExecutionRecord {
    pub fn new(execution_id: impl Into<String>, roots: Vec<CallTreeNode>) -> Self {
        Self {
            execution_id: execution_id.into(),
            saved_at: Utc::now(),
            roots,
        }
    }

    /// Total statement count across all root subtrees
    pub fn total_statements(&self) -> usize {
        self.roots.iter().map(CallTreeNode::total_node_count).sum()
    }
}
