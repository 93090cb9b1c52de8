//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// Most cache operations are fail-safe: errors result in cache misses
/// rather than hard failures. This enum is used for internal error
/// propagation within the cache subsystem and for reporting skipped inserts.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A manifest is unreadable as a complete manifest.
    #[error("invalid cache manifest {path}: {reason}")]
    InvalidManifest {
        /// The manifest file path.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// An output cannot be stored under a logical file name.
    #[error("cannot cache output {path}: {reason}")]
    InvalidOutputName {
        /// The output file path.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
