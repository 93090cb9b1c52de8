//! Configuration types deserialized from `kiln.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

/// Default bounded wait between progress reports, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default cache folder, relative to the project root.
pub const DEFAULT_CACHE_DIR: &str = ".kiln-cache";

/// The top-level configuration parsed from `kiln.toml`.
///
/// Every section is optional; an empty file yields a usable configuration
/// with caching enabled and no ledger persistence.
#[derive(Debug, Default, Deserialize)]
pub struct KilnConfig {
    /// Thread pool and progress settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Content-addressable cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Dependency ledger persistence and cleanup settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// End-of-run report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// Build settings controlling parallelism.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Maximum worker threads; `0` sizes the pool from the CPU count.
    pub threads: usize,
    /// Bounded wait between progress callbacks while a converter group drains.
    pub poll_interval_ms: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl BuildConfig {
    /// Returns the configured thread count, resolving `0` to the number of
    /// available CPUs (at least one).
    pub fn effective_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Content-addressable cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether cacheable converters consult and fill the cache.
    pub enabled: bool,
    /// Cache folder; the toolchain seed is appended as a subfolder.
    pub dir: String,
    /// Files whose bytes identify the toolchain (binary, plugin modules).
    ///
    /// Accepts either a single string or a list of strings. Any change to
    /// one of them moves the cache to a fresh seed folder.
    #[serde(deserialize_with = "deserialize_string_or_vec")]
    pub seed_files: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: DEFAULT_CACHE_DIR.to_string(),
            seed_files: Vec::new(),
        }
    }
}

/// Dependency ledger configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Persisted `input=output` ledger. Required for cleanup.
    pub file: Option<String>,
    /// Output-only manifest listing every file this run produced.
    pub output_only_file: Option<String>,
    /// List of files deleted by cleanup.
    pub deleted_list_file: Option<String>,
    /// Whether stale outputs are removed at the end of the run.
    pub cleanup: bool,
    /// Report stale outputs without deleting them.
    pub dry_run: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            file: None,
            output_only_file: None,
            deleted_list_file: None,
            cleanup: true,
            dry_run: false,
        }
    }
}

/// End-of-run report configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportConfig {
    /// Where to write the JSON run summary, if anywhere.
    #[serde(default)]
    pub summary_file: Option<String>,
}

/// Deserializes a field that can be either a single string or a list of strings.
///
/// Allows TOML config to accept both `seed_files = "kiln"` (string) and
/// `seed_files = ["kiln", "plugins/tif.so"]` (array of strings).
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: KilnConfig = toml::from_str("").unwrap();
        assert_eq!(config.build.threads, 0);
        assert_eq!(config.build.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.dir, DEFAULT_CACHE_DIR);
        assert!(config.ledger.cleanup);
        assert!(config.ledger.file.is_none());
        assert!(config.report.summary_file.is_none());
    }

    #[test]
    fn seed_files_accepts_string() {
        let config: KilnConfig = toml::from_str("[cache]\nseed_files = \"bin/kiln\"").unwrap();
        assert_eq!(config.cache.seed_files, vec!["bin/kiln"]);
    }

    #[test]
    fn seed_files_accepts_list() {
        let config: KilnConfig =
            toml::from_str("[cache]\nseed_files = [\"bin/kiln\", \"plugins/tif.so\"]").unwrap();
        assert_eq!(config.cache.seed_files.len(), 2);
    }

    #[test]
    fn explicit_threads_win() {
        let build = BuildConfig {
            threads: 3,
            ..BuildConfig::default()
        };
        assert_eq!(build.effective_threads(), 3);
    }

    #[test]
    fn auto_threads_is_positive() {
        assert!(BuildConfig::default().effective_threads() >= 1);
    }
}
