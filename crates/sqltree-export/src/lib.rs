//! Persistence sinks for completed call trees
//!
//! Implementations of `sqltree_core::TraceSink`:
//!
//! - [`JsonlSink`]: one JSON line per completed execution
//! - [`MemorySink`]: bounded in-memory retention, for tests and tooling

pub mod jsonl;
pub mod memory;
pub mod record;

pub use jsonl::{JsonlSink, JsonlSinkConfig};
pub use memory::MemorySink;
pub use record::ExecutionRecord;
