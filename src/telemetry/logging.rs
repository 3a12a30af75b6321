//! Logging configuration and initialization.
//!
//! Supports JSON, pretty and compact formats with an optional output file.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON structured logging.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
    /// Single-line human-readable output.
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive (e.g. "info", "courier_core=trace").
    pub level: String,
    /// Log file. If None, logs go to stderr.
    pub output: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { format: LogFormat::Json, level: "info".to_string(), output: None }
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global tracing subscriber.
///
/// Call once at startup; later calls fail with [`LogError::AlreadyInitialized`].
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter =
        EnvFilter::try_new(&config.level).map_err(|e| LogError::InvalidFilter(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match (&config.output, config.format) {
        (Some(path), format) => {
            let file = std::fs::File::create(path).map_err(|e| LogError::FileOpen(e.to_string()))?;
            let writer = std::sync::Mutex::new(file);
            match format {
                LogFormat::Json => registry.with(fmt::layer().json().with_writer(writer)).try_init(),
                LogFormat::Pretty => {
                    registry.with(fmt::layer().pretty().with_ansi(false).with_writer(writer)).try_init()
                }
                LogFormat::Compact => {
                    registry.with(fmt::layer().compact().with_ansi(false).with_writer(writer)).try_init()
                }
            }
        }
        (None, LogFormat::Json) => registry.with(fmt::layer().json()).try_init(),
        (None, LogFormat::Pretty) => registry.with(fmt::layer().pretty()).try_init(),
        (None, LogFormat::Compact) => registry.with(fmt::layer().compact()).try_init(),
    };
    result.map_err(|_| LogError::AlreadyInitialized)
}
