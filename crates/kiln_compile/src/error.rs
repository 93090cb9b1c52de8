//! Error types for the orchestrator and the converter interface.

use std::path::PathBuf;

use kiln_jobs::JobsError;
use kiln_ledger::LedgerError;

/// Errors a compiler reports for a single file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// The file could not be converted.
    #[error("{reason}")]
    Failed {
        /// Human-readable cause.
        reason: String,
    },

    /// The converter ran out of memory. Retried once single-threaded when the
    /// file was converted in parallel.
    #[error("out of memory")]
    OutOfMemory,
}

impl ProcessError {
    /// Shorthand for [`ProcessError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Infrastructure errors the caller of the orchestrator must handle.
///
/// Per-file failures are never reported here; they end up in the
/// [`CompileReport`](crate::CompileReport).
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] JobsError),

    /// Writing the ledger, the output list, or the deleted-files list failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Writing the run summary failed.
    #[error("failed to write run summary {path}: {source}")]
    Summary {
        /// The summary file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The run summary could not be encoded.
    #[error("failed to encode run summary: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_error_display() {
        assert_eq!(ProcessError::failed("bad header").to_string(), "bad header");
        assert_eq!(ProcessError::OutOfMemory.to_string(), "out of memory");
    }

    #[test]
    fn pool_error_converts() {
        let err: CompileError = JobsError::NoThreads.into();
        assert!(matches!(err, CompileError::Pool(_)));
        assert!(err.to_string().starts_with("failed to start worker pool"));
    }

    #[test]
    fn summary_error_names_path() {
        let err = CompileError::Summary {
            path: PathBuf::from("/out/summary.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/out/summary.json"));
    }
}
