//! Persistent input→output dependency ledger.
//!
//! The ledger records which output files every source file produced. It is
//! persisted across runs as plain `input=output` lines and drives incremental
//! cleanup: outputs whose input vanished, or that were explicitly invalidated,
//! are deleted at the end of a run.

#![warn(missing_docs)]

pub mod cleanup;
pub mod entry;
pub mod error;
pub mod ledger;

pub use cleanup::{CleanupOptions, CleanupReport};
pub use entry::{DependencyEntry, LedgerPath};
pub use error::LedgerError;
pub use ledger::Ledger;
