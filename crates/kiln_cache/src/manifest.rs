//! Plain-text manifests listing the outputs cached under one key.
//!
//! A manifest is stored as `<key>.txt` in the cache folder: one logical output
//! file name per line, terminated by [`MANIFEST_MARKER`]. The marker is written
//! last, so a manifest without it was interrupted and must not be trusted.

use std::path::Path;

use crate::error::CacheError;

/// Fixed integrity marker ending every complete manifest.
pub const MANIFEST_MARKER: &str = "#kiln-cache-manifest-complete";

/// Logical output names cached under one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheManifest {
    names: Vec<String>,
}

impl CacheManifest {
    /// Creates a manifest for the given output file names.
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// The logical output file names, in insertion order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Formats the manifest text, marker line included.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for name in &self.names {
            text.push_str(name);
            text.push('\n');
        }
        text.push_str(MANIFEST_MARKER);
        text.push('\n');
        text
    }

    /// Parses manifest text. `path` is only used in error messages.
    ///
    /// The last non-blank line must be the marker, and the marker must not
    /// appear anywhere else.
    pub fn parse(text: &str, path: &Path) -> Result<Self, CacheError> {
        let invalid = |reason: &str| CacheError::InvalidManifest {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let mut lines: Vec<&str> = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .collect();

        match lines.pop() {
            Some(MANIFEST_MARKER) => {}
            _ => return Err(invalid("missing integrity marker")),
        }
        if lines.iter().any(|l| *l == MANIFEST_MARKER) {
            return Err(invalid("integrity marker before end of manifest"));
        }
        if let Some(name) = lines.iter().find(|l| !is_plain_file_name(l)) {
            return Err(invalid(&format!("{name:?} is not a plain file name")));
        }

        Ok(Self {
            names: lines.into_iter().map(str::to_string).collect(),
        })
    }

    /// Loads the manifest at `path`, returning `None` if the file doesn't
    /// exist, can't be read, or is incomplete.
    ///
    /// This is fail-safe: any error results in `None` (cache miss).
    pub fn load(path: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(path).ok()?;
        match Self::parse(&text, path) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::debug!(error = %e, "discarding cache manifest");
                None
            }
        }
    }

    /// Writes the manifest to `path`.
    ///
    /// The text goes to a sibling temporary file which is then renamed over
    /// `path`, so readers never observe a half-written manifest.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = std::path::PathBuf::from(temp);

        std::fs::write(&temp, self.to_text()).map_err(|e| CacheError::io(&temp, e))?;
        std::fs::rename(&temp, path).map_err(|e| {
            let _ = std::fs::remove_file(&temp);
            CacheError::io(path, e)
        })
    }
}

/// Manifest names are joined onto the restore directory, so they must not
/// carry separators or parent references.
fn is_plain_file_name(name: &str) -> bool {
    name != "." && name != ".." && !name.contains(['/', '\\'])
}
