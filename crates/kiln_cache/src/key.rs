//! Cache seeds and per-file cache keys.

use std::fmt;
use std::path::{Path, PathBuf};

use kiln_common::{digest_file, sanitize_file_name, ContentHash, Digest};

use crate::error::CacheError;

/// Cache layout version. Increment on breaking changes to the manifest or
/// payload naming; it is folded into every seed.
const CACHE_FORMAT_VERSION: u32 = 1;

/// Identity of the toolchain that produced cached outputs.
///
/// The seed digests the toolchain binary and every loaded converter module.
/// Its hex form names the cache subfolder, so any toolchain change starts a
/// fresh, empty cache instead of serving outputs of an older converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheSeed(ContentHash);

impl CacheSeed {
    /// Builds a seed from in-memory identity blocks (e.g. version strings).
    pub fn from_bytes(parts: &[&[u8]]) -> Self {
        let mut digest = Digest::new();
        digest.update(&CACHE_FORMAT_VERSION.to_le_bytes());
        for part in parts {
            digest.update(&(part.len() as u64).to_le_bytes());
            digest.update(part);
        }
        Self(digest.finish())
    }

    /// Builds a seed from the bytes of the toolchain binary and plugin modules.
    ///
    /// Order matters: the same files listed in a different order give a
    /// different seed.
    pub fn from_files(paths: &[PathBuf]) -> Result<Self, CacheError> {
        Self::from_toolchain(paths, &[])
    }

    /// Builds a seed from toolchain files plus in-memory identity blocks,
    /// such as the registered converter names.
    pub fn from_toolchain(paths: &[PathBuf], parts: &[&[u8]]) -> Result<Self, CacheError> {
        let mut digest = Digest::new();
        digest.update(&CACHE_FORMAT_VERSION.to_le_bytes());
        for path in paths {
            let hash = digest_file(path).map_err(|e| CacheError::io(path, e))?;
            digest.update(hash.as_bytes());
        }
        for part in parts {
            digest.update(&(part.len() as u64).to_le_bytes());
            digest.update(part);
        }
        Ok(Self(digest.finish()))
    }

    /// Name of the cache subfolder owned by this seed.
    pub fn folder_name(&self) -> String {
        self.0.to_hex()
    }
}

/// Key of one cached source file: `<file name>-<hex digest of its bytes>`.
///
/// Characters unsafe in file names are replaced with `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds a key from a source file name and the digest of its bytes.
    pub fn new(source_name: &str, hash: &ContentHash) -> Self {
        Self(sanitize_file_name(&format!("{source_name}-{hash}")))
    }

    /// Reads and digests `source` and builds its key.
    pub fn for_file(source: &Path) -> Result<Self, CacheError> {
        let hash = digest_file(source).map_err(|e| CacheError::io(source, e))?;
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(&name, &hash))
    }

    /// Wraps a key string produced earlier by [`CacheKey::as_str`].
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the manifest: `<key>.txt`.
    pub fn manifest_file_name(&self) -> String {
        format!("{}.txt", self.0)
    }

    /// File name of the payload copy of output `name`: `<key>-<name>`.
    pub fn payload_file_name(&self, name: &str) -> String {
        format!("{}-{name}", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
