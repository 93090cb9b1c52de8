//! High-level cache operations: restore and insert.
//!
//! The `ContentCache` type owns one seed folder of the cache. It restores the
//! outputs of a previously converted source into a target directory, and
//! stores freshly produced outputs for later runs. Restores are all-or-nothing
//! and inserts write the manifest last.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

use crate::error::CacheError;
use crate::key::{CacheKey, CacheSeed};
use crate::manifest::CacheManifest;

/// Snapshot of cache activity during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Restores that reproduced every output.
    pub hits: usize,
    /// Restores that found nothing usable.
    pub misses: usize,
    /// Keys stored by [`ContentCache::insert`].
    pub inserts: usize,
}

/// Content-addressable store of converter outputs.
///
/// Layout: `<cache_dir>/<seed>/<key>.txt` for manifests and
/// `<cache_dir>/<seed>/<key>-<name>` for payloads. All reads are fail-safe.
#[derive(Debug)]
pub struct ContentCache {
    /// Seed folder holding manifests and payloads.
    root: PathBuf,

    hits: AtomicUsize,
    misses: AtomicUsize,
    inserts: AtomicUsize,
}

impl ContentCache {
    /// Opens the cache rooted at `<cache_dir>/<seed>`.
    ///
    /// No I/O happens here; folders are created on the first insert.
    pub fn open(cache_dir: &Path, seed: &CacheSeed) -> Self {
        Self {
            root: cache_dir.join(seed.folder_name()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
        }
    }

    /// The seed folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the manifest for `key`.
    pub fn manifest_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.manifest_file_name())
    }

    /// Path of the payload copy of output `name` under `key`.
    pub fn payload_path(&self, key: &CacheKey, name: &str) -> PathBuf {
        self.root.join(key.payload_file_name(name))
    }

    /// Restores every output cached under `key` into `dest_dir`.
    ///
    /// Returns the restored file paths, or `None` on a miss: no complete
    /// manifest, a missing payload, or any copy failure. Files copied before a
    /// failure are removed again, so a miss never leaves partial output.
    pub fn restore(&self, key: &CacheKey, dest_dir: &Path) -> Option<Vec<PathBuf>> {
        match self.try_restore(key, dest_dir) {
            Some(files) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, files = files.len(), "cache hit");
                Some(files)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "cache miss");
                None
            }
        }
    }

    fn try_restore(&self, key: &CacheKey, dest_dir: &Path) -> Option<Vec<PathBuf>> {
        let manifest = CacheManifest::load(&self.manifest_path(key))?;

        let transfers: Vec<(PathBuf, PathBuf)> = manifest
            .names()
            .iter()
            .map(|name| (self.payload_path(key, name), dest_dir.join(name)))
            .collect();

        if let Some((missing, _)) = transfers.iter().find(|(payload, _)| !payload.is_file()) {
            tracing::debug!(payload = %missing.display(), "cache payload missing");
            return None;
        }

        std::fs::create_dir_all(dest_dir).ok()?;

        let mut restored = Vec::with_capacity(transfers.len());
        for (payload, dest) in transfers {
            if let Err(e) = std::fs::copy(&payload, &dest) {
                tracing::debug!(payload = %payload.display(), error = %e, "cache restore failed");
                for copied in &restored {
                    let _ = std::fs::remove_file(copied);
                }
                return None;
            }
            restored.push(dest);
        }
        Some(restored)
    }

    /// Stores `outputs` under `key`.
    ///
    /// Each output is copied to its payload path first; the manifest is
    /// written last, so an interrupted insert never yields a manifest that
    /// points at missing payloads. An empty output list is not cached.
    /// Only file names are kept, so [`restore`](Self::restore) puts every
    /// output directly in its destination directory; outputs written to
    /// subdirectories should not be inserted.
    /// Returns the number of payloads stored.
    pub fn insert(&self, key: &CacheKey, outputs: &[PathBuf]) -> Result<usize, CacheError> {
        if outputs.is_empty() {
            return Ok(0);
        }

        let names = logical_names(outputs)?;

        std::fs::create_dir_all(&self.root).map_err(|e| CacheError::io(&self.root, e))?;

        for (output, name) in outputs.iter().zip(&names) {
            let payload = self.payload_path(key, name);
            std::fs::copy(output, &payload).map_err(|e| CacheError::io(output, e))?;
        }

        CacheManifest::new(names).save(&self.manifest_path(key))?;
        self.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(outputs.len())
    }

    /// Returns `true` if a complete manifest exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        CacheManifest::load(&self.manifest_path(key)).is_some()
    }

    /// Returns the activity counters accumulated so far.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
        }
    }
}

/// Maps outputs to their logical (file) names, rejecting unusable or
/// colliding names.
fn logical_names(outputs: &[PathBuf]) -> Result<Vec<String>, CacheError> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(outputs.len());
    for output in outputs {
        let invalid = |reason: &str| CacheError::InvalidOutputName {
            path: output.clone(),
            reason: reason.to_string(),
        };
        let name = output
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| invalid("no UTF-8 file name"))?;
        if name.contains(['\n', '\r']) || name == crate::manifest::MANIFEST_MARKER {
            return Err(invalid("file name cannot be listed in a manifest"));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(invalid("duplicate file name"));
        }
        names.push(name.to_string());
    }
    Ok(names)
}
