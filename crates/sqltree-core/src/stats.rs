//! Process-wide statement statistics
//!
//! `TraceStatistics` is the only state shared across concurrent executions.
//! Every mutator is a single atomic operation; there are no cross-counter
//! consistency guarantees beyond each counter's own monotonicity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Atomic counters aggregated across all executions
#[derive(Debug)]
pub struct TraceStatistics {
    /// Total statements entered
    total_statements: AtomicU64,
    /// Statements whose duration exceeded the slow threshold at exit
    slow_statements: AtomicU64,
    /// Statements that exited with a non-empty error message
    error_statements: AtomicU64,
    /// Cumulative statement execution time in milliseconds
    total_execution_time_ms: AtomicU64,
    /// Maximum call depth observed
    max_depth: AtomicU32,
    /// When the collector was created (or last reset)
    started_at: parking_lot::Mutex<DateTime<Utc>>,
}

impl Default for TraceStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceStatistics {
    pub fn new() -> Self {
        Self {
            total_statements: AtomicU64::new(0),
            slow_statements: AtomicU64::new(0),
            error_statements: AtomicU64::new(0),
            total_execution_time_ms: AtomicU64::new(0),
            max_depth: AtomicU32::new(0),
            started_at: parking_lot::Mutex::new(Utc::now()),
        }
    }

    pub fn increment_total(&self) {
        self.total_statements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_slow(&self) {
        self.slow_statements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors(&self) {
        self.error_statements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_execution_time_ms(&self, duration_ms: u64) {
        self.total_execution_time_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    /// Monotone max update
    pub fn update_max_depth(&self, depth: u32) {
        self.max_depth.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn total_statements(&self) -> u64 {
        self.total_statements.load(Ordering::Relaxed)
    }

    pub fn slow_statements(&self) -> u64 {
        self.slow_statements.load(Ordering::Relaxed)
    }

    pub fn error_statements(&self) -> u64 {
        self.error_statements.load(Ordering::Relaxed)
    }

    pub fn total_execution_time_ms(&self) -> u64 {
        self.total_execution_time_ms.load(Ordering::Relaxed)
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth.load(Ordering::Relaxed)
    }

    /// Mean statement duration in milliseconds; 0.0 when nothing has run
    pub fn average_execution_time_ms(&self) -> f64 {
        let total = self.total_statements();
        if total == 0 {
            return 0.0;
        }
        self.total_execution_time_ms() as f64 / total as f64
    }

    /// Zero all counters and restart the collection window
    pub fn reset(&self) {
        self.total_statements.store(0, Ordering::Relaxed);
        self.slow_statements.store(0, Ordering::Relaxed);
        self.error_statements.store(0, Ordering::Relaxed);
        self.total_execution_time_ms.store(0, Ordering::Relaxed);
        self.max_depth.store(0, Ordering::Relaxed);
        *self.started_at.lock() = Utc::now();
    }

    /// Independent point-in-time copy of all counters
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total_statements: self.total_statements(),
            slow_statements: self.slow_statements(),
            error_statements: self.error_statements(),
            total_execution_time_ms: self.total_execution_time_ms(),
            max_depth: self.max_depth(),
            average_execution_time_ms: self.average_execution_time_ms(),
            started_at: *self.started_at.lock(),
        }
    }

    /// Export counters as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "total_statements": self.total_statements(),
            "slow_statements": self.slow_statements(),
            "error_statements": self.error_statements(),
            "total_execution_time_ms": self.total_execution_time_ms(),
            "max_depth": self.max_depth(),
            "average_execution_time_ms": self.average_execution_time_ms(),
            "started_at": *self.started_at.lock(),
        })
    }
}

/// Serializable point-in-time view of the counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub total_statements: u64,
    pub slow_statements: u64,
    pub error_statements: u64,
    pub total_execution_time_ms: u64,
    pub max_depth: u32,
    pub average_execution_time_ms: f64,
    pub started_at: DateTime<Utc>,
}

/// Shared statistics instance
pub type SharedStatistics = Arc<TraceStatistics>;

/// Create a new shared statistics collector
pub fn create_statistics() -> SharedStatistics {
    Arc::new(TraceStatistics::new())
}
