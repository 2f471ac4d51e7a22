//! Tracing configuration
//!
//! Provides:
//! - `TraceSettings`: TOML-loadable settings with serde defaults
//! - `TraceConfig`: the process-wide runtime view, mutable at runtime via
//!   atomics (enable/disable, slow threshold)
//!
//! Tracing is active only when the process-wide flag and the execution's
//! own settings both say so; the slow threshold is read at statement exit
//! time, so changing it mid-flight reclassifies statements still running.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tracing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    /// Whether tracing is enabled
    pub enabled: bool,

    /// Slow-statement threshold in milliseconds
    pub slow_threshold_ms: u64,

    /// Maximum stack depth per execution; entries past it are dropped
    pub max_depth: u32,

    /// Whether to record statement parameters
    pub record_parameters: bool,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            slow_threshold_ms: 1000,
            max_depth: 50,
            record_parameters: true,
        }
    }
}

impl TraceSettings {
    /// Parse settings from a TOML string
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.slow_threshold_ms == 0 {
            return Err(ConfigError::ValidationError(
                "slow_threshold_ms must be positive".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-wide runtime configuration, shared by all trackers
#[derive(Debug)]
pub struct TraceConfig {
    enabled: AtomicBool,
    slow_threshold_ms: AtomicU64,
}

impl TraceConfig {
    pub fn new(settings: &TraceSettings) -> Self {
        Self {
            enabled: AtomicBool::new(settings.enabled),
            slow_threshold_ms: AtomicU64::new(settings.slow_threshold_ms),
        }
    }

    /// Whether tracing is enabled process-wide
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enable or disable tracing process-wide
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        info!(enabled, "trace enabled flag updated");
    }

    /// Slow-statement threshold in milliseconds
    pub fn slow_threshold_ms(&self) -> u64 {
        self.slow_threshold_ms.load(Ordering::Relaxed)
    }

    /// Update the slow-statement threshold
    pub fn set_slow_threshold_ms(&self, threshold_ms: u64) {
        self.slow_threshold_ms.store(threshold_ms, Ordering::Relaxed);
        info!(threshold_ms, "slow statement threshold updated");
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self::new(&TraceSettings::default())
    }
}

/// Shared configuration instance
pub type SharedConfig = Arc<TraceConfig>;
