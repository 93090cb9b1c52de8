//! Compilation orchestrator.
//!
//! Source files are grouped by the converter that handles their extension.
//! Each group is restored from the content cache where possible, and the rest
//! is drained through the work-stealing pool by one compiler instance per
//! job. Successful conversions are recorded in the dependency ledger and
//! stored in the cache; files that ran out of memory under parallel
//! conversion get a single-threaded retry.

#![warn(missing_docs)]

pub mod batch;
pub mod converter;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod record;
pub mod registry;
pub mod report;

pub use batch::{Batch, BatchProgress, BatchResults};
pub use converter::{Compiler, ConvertContext, Converter};
pub use error::{CompileError, ProcessError};
pub use orchestrator::{Orchestrator, Progress};
pub use outcome::{run_one, FailureReason, FileOutcome};
pub use record::FileRecord;
pub use registry::ConverterRegistry;
pub use report::{CleanupSummary, CompileReport, ConvertedFile, FailedFile, GroupReport, RunSummary};
