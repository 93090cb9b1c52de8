//! Cross-run content-addressable cache for converter outputs.
//!
//! This crate lets the orchestrator skip running a converter on a source file
//! whose bytes, and whose toolchain, are unchanged since an earlier run. Each
//! cached entry is a plain-text manifest naming the outputs plus byte-identical
//! payload copies stored next to it. The cache only ever affects speed: every
//! failure degrades to a miss or a skipped insert.

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod key;
pub mod manifest;

pub use cache::{CacheStats, ContentCache};
pub use error::CacheError;
pub use key::{CacheKey, CacheSeed};
pub use manifest::{CacheManifest, MANIFEST_MARKER};
