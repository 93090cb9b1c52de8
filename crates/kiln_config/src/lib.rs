//! Parsing and validation of `kiln.toml` build configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`KilnConfig`] plus [`ResolvedPaths`] anchoring every configured file
//! location at the project root.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use resolve::{resolve_paths, ResolvedPaths};
pub use types::*;
