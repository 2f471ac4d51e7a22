//! Statement-level call tree node
//!
//! `CallTreeNode` is the per-statement record in a call tree: identity,
//! statement text, timing, slow/error status, and the cross-layer service
//! annotations stamped by the tracker at entry time.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind of data-access statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL, batch, or anything the instrumentation layer could not classify
    Other,
}

impl StatementKind {
    /// Classify a kind string supplied by the instrumentation layer
    pub fn parse(kind: &str) -> Self {
        match kind.trim().to_ascii_uppercase().as_str() {
            "SELECT" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Other,
        }
    }

    /// Whether this kind reads data rather than mutating it
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Select)
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,\s*").unwrap());
static COMPARISON: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*(!=|<>|>=|<=|=|>|<)\s*").unwrap());

/// Cosmetic whitespace normalization of a statement.
///
/// Collapses runs of whitespace, tidies comma spacing, and pads comparison
/// operators. No parsing: literals containing operators come out padded too,
/// which is acceptable for a diagnostic display copy.
pub fn normalize_statement(statement: &str) -> String {
    let trimmed = statement.trim();
    if trimmed.is_empty() {
        return trimmed.to_string();
    }
    let collapsed = WHITESPACE.replace_all(trimmed, " ");
    let commas = COMMA.replace_all(&collapsed, ", ");
    COMPARISON.replace_all(&commas, " $1 ").into_owned()
}

/// A single statement execution in the call tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTreeNode {
    /// Unique node ID
    pub node_id: String,

    /// Raw statement text as supplied by the instrumentation layer
    pub statement: String,

    /// Cosmetically normalized copy of the statement
    pub normalized: String,

    /// Statement kind
    pub kind: StatementKind,

    /// Call depth (>= 1); inherited from the enclosing service frame when
    /// one exists, otherwise the 1-based statement stack position
    pub depth: u32,

    /// Enclosing service name (None outside any service frame)
    pub service_name: Option<String>,

    /// Enclosing service method (None outside any service frame)
    pub method_name: Option<String>,

    /// Full service call path at entry time (None outside any service frame)
    pub call_path: Option<String>,

    /// When the statement started
    pub started_at: DateTime<Utc>,

    /// When the statement finished (None while in flight)
    pub ended_at: Option<DateTime<Utc>>,

    /// Execution duration in milliseconds, derived at exit
    pub duration_ms: Option<u64>,

    /// Whether the duration exceeded the slow threshold in effect at exit
    pub slow: bool,

    /// Rows affected by the statement
    pub affected_rows: i64,

    /// Error message, if the statement failed
    pub error_message: Option<String>,

    /// Bound parameter values attached by the instrumentation layer while
    /// the statement is in flight; stays empty when the execution's
    /// parameter-recording toggle is off
    pub parameters: Vec<serde_json::Value>,

    /// Child nodes in execution order; ownership runs parent to child
    pub children: Vec<CallTreeNode>,

    /// Parent node ID. A lookup key only, never an ownership edge.
    pub parent_id: Option<String>,
}

impl CallTreeNode {
    /// Create a node at entry time
    pub fn new(statement: impl Into<String>, kind: StatementKind, depth: u32) -> Self {
        let statement = statement.into();
        let normalized = normalize_statement(&statement);
        Self {
            node_id: ulid::Ulid::new().to_string(),
            statement,
            normalized,
            kind,
            depth,
            service_name: None,
            method_name: None,
            call_path: None,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            slow: false,
            affected_rows: 0,
            error_message: None,
            parameters: Vec::new(),
            children: Vec::new(),
            parent_id: None,
        }
    }

    /// Stamp exit-time fields. Called exactly once, by the tracker, when
    /// the node is popped from the statement stack.
    pub(crate) fn complete(
        &mut self,
        affected_rows: i64,
        error_message: Option<&str>,
        slow_threshold_ms: u64,
    ) {
        let ended_at = Utc::now();
        let duration_ms = (ended_at - self.started_at).num_milliseconds().max(0) as u64;
        self.ended_at = Some(ended_at);
        self.duration_ms = Some(duration_ms);
        self.affected_rows = affected_rows;
        self.error_message = error_message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        self.slow = duration_ms > slow_threshold_ms;
    }

    /// Whether exit has been recorded
    pub fn is_complete(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Total node count of this subtree, including self
    pub fn total_node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(CallTreeNode::total_node_count)
            .sum::<usize>()
    }

    /// Maximum depth reached in this subtree
    pub fn max_depth(&self) -> u32 {
        self.children
            .iter()
            .map(CallTreeNode::max_depth)
            .fold(self.depth, u32::max)
    }

    /// Number of slow statements in this subtree
    pub fn slow_count(&self) -> usize {
        let own = usize::from(self.slow);
        own + self
            .children
            .iter()
            .map(CallTreeNode::slow_count)
            .sum::<usize>()
    }

    /// Cumulative duration of this subtree in milliseconds
    pub fn total_duration_ms(&self) -> u64 {
        self.duration_ms.unwrap_or(0)
            + self
                .children
                .iter()
                .map(CallTreeNode::total_duration_ms)
                .sum::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_kind_parse() {
        assert_eq!(StatementKind::parse("select"), StatementKind::Select);
        assert_eq!(StatementKind::parse(" UPDATE "), StatementKind::Update);
        assert_eq!(StatementKind::parse("merge"), StatementKind::Other);
        assert!(StatementKind::Select.is_read());
        assert!(!StatementKind::Delete.is_read());
    }

    #[test]
    fn test_normalize_statement() {
        assert_eq!(
            normalize_statement("  SELECT id ,name\n FROM users WHERE id=1  "),
            "SELECT id, name FROM users WHERE id = 1"
        );
        assert_eq!(
            normalize_statement("UPDATE t SET a=1,b = 2 WHERE c>=3"),
            "UPDATE t SET a = 1, b = 2 WHERE c >= 3"
        );
        assert_eq!(normalize_statement("   "), "");
    }

    #[test]
    fn test_complete_stamps_once() {
        let mut node = CallTreeNode::new("SELECT 1", StatementKind::Select, 1);
        assert!(!node.is_complete());
        node.complete(3, Some("  "), 1000);
        assert!(node.is_complete());
        assert_eq!(node.affected_rows, 3);
        // Whitespace-only error messages are treated as no error
        assert_eq!(node.error_message, None);
        assert!(!node.slow);
    }

    #[test]
    fn test_subtree_aggregation() {
        let mut root = CallTreeNode::new("SELECT 1", StatementKind::Select, 1);
        root.duration_ms = Some(10);
        let mut child = CallTreeNode::new("SELECT 2", StatementKind::Select, 2);
        child.duration_ms = Some(5);
        child.slow = true;
        let mut grandchild = CallTreeNode::new("SELECT 3", StatementKind::Select, 3);
        grandchild.duration_ms = Some(1);
        child.children.push(grandchild);
        root.children.push(child);

        assert_eq!(root.total_node_count(), 3);
        assert_eq!(root.max_depth(), 3);
        assert_eq!(root.slow_count(), 1);
        assert_eq!(root.total_duration_ms(), 16);
    }
}
