//! Telemetry: structured logging, request spans and metrics.

mod logging;
pub mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::init_metrics;
pub use spans::{RequestSpan, SpanExt};
