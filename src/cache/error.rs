//! Cache store error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by cache store operations.
///
/// The store never surfaces these from `get`: an unreadable record is purged
/// and reported as a miss instead.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad record magic: {0:#010x}")]
    BadMagic(u32),

    #[error("corrupt cache record: {0}")]
    Corrupt(String),

    #[error("record holds key {found:?}, expected {expected:?}")]
    KeyMismatch { expected: String, found: String },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
