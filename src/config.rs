//! Configuration loading from TOML.
//!
//! Every section and field is optional. Out-of-range values are clamped to
//! their floor instead of rejected.
//!
//! ```toml
//! [queue]
//! network_threads = 4          # floor: 1
//!
//! [cache]
//! directory = "/var/cache/app" # omitted: no response cache
//! max_bytes = 5242880          # floor: 1 KiB
//!
//! [retry]
//! initial_timeout_ms = 2500    # floor: 1
//! max_retries = 0
//! backoff_multiplier = 1.0     # range: 0.0 ..= 10.0
//!
//! [logging]
//! level = "info"
//! format = "json"              # json | pretty | compact
//! output = "/var/log/app.log"  # omitted: stderr
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cache::{Cache, DiskCache, NoCache, DEFAULT_DISK_USAGE_BYTES};
use crate::request::{
    DefaultRetryPolicy, RetryConfig, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_MAX_RETRIES,
    DEFAULT_TIMEOUT_MS,
};
use crate::scheduler::{RequestQueueConfig, DEFAULT_NETWORK_THREADS};
use crate::telemetry::LogConfig;

/// Smallest accepted cache size bound.
pub const MIN_CACHE_BYTES: u64 = 1024;

/// Largest accepted retry backoff multiplier.
pub const MAX_BACKOFF_MULTIPLIER: f32 = 10.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueSection {
    pub network_threads: usize,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self { network_threads: DEFAULT_NETWORK_THREADS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub directory: Option<PathBuf>,
    pub max_bytes: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { directory: None, max_bytes: DEFAULT_DISK_USAGE_BYTES }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub initial_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_multiplier: f32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            initial_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CourierConfig {
    pub queue: QueueSection,
    pub cache: CacheSection,
    pub retry: RetrySection,
    pub logging: LogConfig,
}

impl CourierConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        Ok(config.clamped())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&source)
    }

    /// Apply floors (and the multiplier ceiling) to every numeric setting.
    pub fn clamped(mut self) -> Self {
        self.queue.network_threads = self.queue.network_threads.max(1);
        self.cache.max_bytes = self.cache.max_bytes.max(MIN_CACHE_BYTES);
        self.retry.initial_timeout_ms = self.retry.initial_timeout_ms.max(1);
        // NaN -> 0.0
        self.retry.backoff_multiplier =
            self.retry.backoff_multiplier.max(0.0).min(MAX_BACKOFF_MULTIPLIER);
        self
    }

    pub fn queue_config(&self) -> RequestQueueConfig {
        RequestQueueConfig { network_threads: self.queue.network_threads, retry: self.retry_config() }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            initial_timeout: Duration::from_millis(self.retry.initial_timeout_ms),
            max_retries: self.retry.max_retries,
            backoff_multiplier: self.retry.backoff_multiplier,
        }
    }

    pub fn retry_policy(&self) -> DefaultRetryPolicy {
        DefaultRetryPolicy::from_config(&self.retry_config())
    }

    /// The configured store: a [`DiskCache`] when a directory is set,
    /// otherwise [`NoCache`].
    pub fn cache_store(&self) -> Arc<dyn Cache> {
        match &self.cache.directory {
            Some(dir) => Arc::new(DiskCache::new(dir.clone(), self.cache.max_bytes)),
            None => Arc::new(NoCache),
        }
    }
}
