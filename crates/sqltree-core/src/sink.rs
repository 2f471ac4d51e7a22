//! Persistence sink interface
//!
//! The engine never persists trees itself; a completed root-node list is
//! handed to a `TraceSink` exactly once per root-level execution, after the
//! tree is fully built. Sink failures are logged and absorbed by the
//! tracker so tracing can never break the instrumented call.

use crate::node::CallTreeNode;
use thiserror::Error;

/// Sink error type
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink error: {0}")]
    Other(String),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Destination for completed call trees
pub trait TraceSink: Send + Sync {
    /// Persist the root-node list of one completed execution. Invoked
    /// exactly once per root-level exit, never before the subtree under
    /// every root is complete.
    fn save(&self, execution_id: &str, roots: Vec<CallTreeNode>) -> SinkResult<()>;

    /// Flush any buffered output
    fn flush(&self) -> SinkResult<()> {
        Ok(())
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TraceSink for NoopSink {
    fn save(&self, _execution_id: &str, _roots: Vec<CallTreeNode>) -> SinkResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::StatementKind;

    #[test]
    fn test_noop_sink_accepts_everything() {
        let sink = NoopSink;
        let roots = vec![CallTreeNode::new("SELECT 1", StatementKind::Select, 1)];
        assert!(sink.save("exec", roots).is_ok());
        assert!(sink.flush().is_ok());
    }
}
