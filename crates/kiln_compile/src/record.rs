//! Source file records.

use std::path::PathBuf;

use serde::Serialize;

/// One source file scheduled for conversion.
///
/// Outputs land under `target_root` at the same relative directory as the
/// source has under `source_root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Root of the source tree.
    pub source_root: PathBuf,
    /// Path of the source below `source_root`, file name included.
    pub relative_path: PathBuf,
    /// Root of the output tree.
    pub target_root: PathBuf,
    /// Cache key of the source contents, set once computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl FileRecord {
    /// Creates a record with no digest.
    pub fn new(
        source_root: impl Into<PathBuf>,
        relative_path: impl Into<PathBuf>,
        target_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            relative_path: relative_path.into(),
            target_root: target_root.into(),
            digest: None,
        }
    }

    /// Full path of the source file.
    pub fn source_path(&self) -> PathBuf {
        self.source_root.join(&self.relative_path)
    }

    /// Directory the outputs of this file go to.
    pub fn target_dir(&self) -> PathBuf {
        match self.relative_path.parent() {
            Some(parent) => self.target_root.join(parent),
            None => self.target_root.clone(),
        }
    }

    /// File name of the source, lossily converted.
    pub fn file_name(&self) -> String {
        self.relative_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_relative_layout() {
        let record = FileRecord::new("/src", "textures/rock.tif", "/out");
        assert_eq!(record.source_path(), PathBuf::from("/src/textures/rock.tif"));
        assert_eq!(record.target_dir(), PathBuf::from("/out/textures"));
        assert_eq!(record.file_name(), "rock.tif");
        assert!(record.digest.is_none());
    }

    #[test]
    fn top_level_file_targets_root() {
        let record = FileRecord::new("/src", "rock.tif", "/out");
        assert_eq!(record.target_dir(), PathBuf::from("/out"));
    }
}
