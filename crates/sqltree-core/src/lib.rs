//! sqltree core - call-correlation engine for diagnostic tracing
//!
//! Observes nested invocations across two instrumentation layers -
//! application-level service calls and data-access statement executions -
//! within a single logical execution, and assembles them into one
//! hierarchical call tree with timing, slow-execution flags, and error
//! status. A process-wide statistics aggregator accumulates counts and
//! timings across all executions.
//!
//! - **Models**: [`CallTreeNode`] (statement level) and [`ServiceFrame`]
//!   (service level)
//! - **Context**: [`ExecutionContext`], the isolated per-execution stacks
//!   and root list, owned by the caller and threaded through every hook
//! - **Trackers**: [`ServiceTracker`], [`StatementTracker`], and the
//!   [`CallTreeTracker`] facade the instrumentation layer calls
//! - **Statistics**: [`TraceStatistics`], process-wide atomic counters
//! - **Sink**: [`TraceSink`], the persistence collaborator receiving each
//!   completed tree exactly once

pub mod config;
pub mod context;
pub mod frame;
pub mod node;
pub mod sink;
pub mod stats;
pub mod tracker;

// Re-export commonly used types
pub use config::{ConfigError, ConfigResult, SharedConfig, TraceConfig, TraceSettings};
pub use context::{ExecutionContext, ExecutionSettings};
pub use frame::ServiceFrame;
pub use node::{normalize_statement, CallTreeNode, StatementKind};
pub use sink::{NoopSink, SinkError, SinkResult, TraceSink};
pub use stats::{create_statistics, SharedStatistics, StatisticsSnapshot, TraceStatistics};
pub use tracker::{
    CallTreeTracker, ServiceHandle, ServiceTracker, StatementHandle, StatementTracker,
};

/// Engine version
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
