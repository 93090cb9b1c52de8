//! Per-file execution and classification.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

use serde::Serialize;

use crate::converter::{Compiler, ConvertContext};
use crate::error::ProcessError;
use crate::record::FileRecord;

/// Why a file ended up in the failed bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    /// The compiler reported an error.
    Error(String),
    /// The compiler panicked.
    Panic(String),
    /// Out of memory with no retry left.
    OutOfMemory,
    /// No job picked the file up.
    NotProcessed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(reason) => f.write_str(reason),
            Self::Panic(message) => write!(f, "converter panicked: {message}"),
            Self::OutOfMemory => f.write_str("out of memory"),
            Self::NotProcessed => f.write_str("file was never processed"),
        }
    }
}

/// Classification of one conversion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Converted; the produced files.
    Converted(Vec<PathBuf>),
    /// Terminal failure for this attempt.
    Failed(FailureReason),
    /// Out of memory; may be retried single-threaded.
    OutOfMemory,
}

/// Runs `compiler` on one file. Panics are caught here and reported as
/// [`FailureReason::Panic`].
pub fn run_one(compiler: &mut dyn Compiler, record: &FileRecord, threads: usize) -> FileOutcome {
    let mut ctx = ConvertContext::new(record, threads);
    let result = catch_unwind(AssertUnwindSafe(|| compiler.process(&mut ctx)));
    match result {
        Ok(Ok(())) => FileOutcome::Converted(ctx.into_outputs()),
        Ok(Err(ProcessError::Failed { reason })) => {
            FileOutcome::Failed(FailureReason::Error(reason))
        }
        Ok(Err(ProcessError::OutOfMemory)) => FileOutcome::OutOfMemory,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            FileOutcome::Failed(FailureReason::Panic(message))
        }
    }
}
