//! Error types for ledger persistence.

use std::path::PathBuf;

/// Errors that can occur while reading or writing ledger files.
///
/// Callers treat a failed read of the prior ledger as an empty ledger; only
/// writes are expected to surface to the user.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// An I/O error occurred while reading or writing a ledger file.
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl LedgerError {
    /// Returns `true` if the error is a missing file.
    pub fn is_not_found(&self) -> bool {
        match self {
            LedgerError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
        }
    }
}
