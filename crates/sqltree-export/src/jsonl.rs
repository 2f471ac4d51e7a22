//! JSONL file sink

use crate::record::ExecutionRecord;
use parking_lot::Mutex;
use sqltree_core::{CallTreeNode, SinkResult, TraceSink};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// JSONL sink configuration
#[derive(Debug, Clone)]
pub struct JsonlSinkConfig {
    /// Output file path
    pub path: PathBuf,

    /// Whether to append to an existing file
    pub append: bool,

    /// Pretty print JSON (not recommended for large files)
    pub pretty: bool,

    /// Flush after each write
    pub flush_each: bool,
}

impl Default for JsonlSinkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/sqltree-executions.jsonl"),
            append: true,
            pretty: false,
            flush_each: true,
        }
    }
}

/// Writes one JSON line per completed execution
pub struct JsonlSink {
    config: JsonlSinkConfig,
    writer: Mutex<BufWriter<File>>,
    records_written: AtomicU64,
}

impl JsonlSink {
    pub fn new(config: JsonlSinkConfig) -> SinkResult<Self> {
        let file = if config.append {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.path)?
        } else {
            File::create(&config.path)?
        };
        info!("JSONL sink writing to: {:?}", config.path);
        Ok(Self {
            config,
            writer: Mutex::new(BufWriter::new(file)),
            records_written: AtomicU64::new(0),
        })
    }

    /// Number of execution records written so far
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }
}

impl TraceSink for JsonlSink {
    fn save(&self, execution_id: &str, roots: Vec<CallTreeNode>) -> SinkResult<()> {
        let record = ExecutionRecord::new(execution_id, roots);
        let json = if self.config.pretty {
            serde_json::to_string_pretty(&record)?
        } else {
            serde_json::to_string(&record)?
        };

        let mut writer = self.writer.lock();
        writeln!(writer, "{}", json)?;
        if self.config.flush_each {
            writer.flush()?;
        }

        self.records_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self) -> SinkResult<()> {
        self.writer.lock().flush()?;
        Ok(())
    }
}
