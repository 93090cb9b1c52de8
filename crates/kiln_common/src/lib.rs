//! Shared foundational types used across the Kiln asset compiler.
//!
//! This crate provides content digests for change detection, the pipelined
//! file digest used to key the cache, and the path normalization shared by
//! the cache and the dependency ledger.

#![warn(missing_docs)]

pub mod digest;
pub mod hash;
pub mod path;

pub use digest::{digest_file, digest_file_with, digest_reader, PipelineOptions};
pub use hash::{ContentHash, Digest};
pub use path::{normalize_path, path_key, sanitize_file_name};
