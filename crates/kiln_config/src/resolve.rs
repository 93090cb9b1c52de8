//! Path resolution: anchoring configured file locations at the project root.

use crate::types::KilnConfig;
use std::path::{Path, PathBuf};

/// Every file location named by a [`KilnConfig`], resolved against a root.
///
/// Absolute paths in the configuration are kept as written; relative paths
/// are joined onto the project root. Disabled features resolve to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// Cache folder (before the seed subfolder), `None` when caching is off.
    pub cache_dir: Option<PathBuf>,
    /// Files digested into the cache seed.
    pub seed_files: Vec<PathBuf>,
    /// Persisted dependency ledger.
    pub ledger_file: Option<PathBuf>,
    /// Output-only manifest.
    pub output_only_file: Option<PathBuf>,
    /// Deleted-files list written by cleanup.
    pub deleted_list_file: Option<PathBuf>,
    /// JSON run summary.
    pub summary_file: Option<PathBuf>,
}

/// Resolves all configured paths against `root`.
pub fn resolve_paths(config: &KilnConfig, root: &Path) -> ResolvedPaths {
    let anchor = |p: &str| root.join(p);
    ResolvedPaths {
        cache_dir: config.cache.enabled.then(|| anchor(&config.cache.dir)),
        seed_files: config.cache.seed_files.iter().map(|p| anchor(p)).collect(),
        ledger_file: config.ledger.file.as_deref().map(anchor),
        output_only_file: config.ledger.output_only_file.as_deref().map(anchor),
        deleted_list_file: config.ledger.deleted_list_file.as_deref().map(anchor),
        summary_file: config.report.summary_file.as_deref().map(anchor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    #[test]
    fn relative_paths_join_root() {
        let config = load_config_from_str(
            r#"
[ledger]
file = "deps.txt"
"#,
        )
        .unwrap();
        let paths = resolve_paths(&config, Path::new("/project"));
        assert_eq!(paths.ledger_file, Some(PathBuf::from("/project/deps.txt")));
        assert_eq!(paths.cache_dir, Some(PathBuf::from("/project/.kiln-cache")));
        assert!(paths.output_only_file.is_none());
    }

    #[test]
    fn absolute_paths_are_kept() {
        let config = load_config_from_str(
            r#"
[cache]
dir = "/var/cache/kiln"
"#,
        )
        .unwrap();
        let paths = resolve_paths(&config, Path::new("/project"));
        assert_eq!(paths.cache_dir, Some(PathBuf::from("/var/cache/kiln")));
    }

    #[test]
    fn disabled_cache_resolves_to_none() {
        let config = load_config_from_str("[cache]\nenabled = false").unwrap();
        let paths = resolve_paths(&config, Path::new("/project"));
        assert!(paths.cache_dir.is_none());
    }
}
