//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::KilnConfig;
use std::path::Path;

/// Name of the configuration file looked up in the project directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates a `kiln.toml` configuration from a project directory.
///
/// Reads `<project_dir>/kiln.toml`, parses it, and validates it.
pub fn load_config(project_dir: &Path) -> Result<KilnConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<KilnConfig, ConfigError> {
    let config: KilnConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configuration values are consistent.
fn validate_config(config: &KilnConfig) -> Result<(), ConfigError> {
    if config.build.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "build.poll_interval_ms must be positive".to_string(),
        ));
    }
    if config.cache.enabled && config.cache.dir.trim().is_empty() {
        return Err(ConfigError::MissingField("cache.dir".to_string()));
    }
    if config.ledger.dry_run && !config.ledger.cleanup {
        return Err(ConfigError::ValidationError(
            "ledger.dry_run requires ledger.cleanup".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml = r#"
[build]
threads = 8
poll_interval_ms = 250

[cache]
enabled = true
dir = "cache"
seed_files = ["bin/kiln", "plugins/texture.so"]

[ledger]
file = "deps.txt"
output_only_file = "outputs.txt"
deleted_list_file = "deleted.txt"
cleanup = true

[report]
summary_file = "summary.json"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.build.threads, 8);
        assert_eq!(config.build.poll_interval_ms, 250);
        assert_eq!(config.cache.dir, "cache");
        assert_eq!(config.cache.seed_files.len(), 2);
        assert_eq!(config.ledger.file.as_deref(), Some("deps.txt"));
        assert_eq!(config.ledger.output_only_file.as_deref(), Some("outputs.txt"));
        assert_eq!(config.ledger.deleted_list_file.as_deref(), Some("deleted.txt"));
        assert_eq!(config.report.summary_file.as_deref(), Some("summary.json"));
    }

    #[test]
    fn zero_poll_interval_errors() {
        let err = load_config_from_str("[build]\npoll_interval_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn empty_cache_dir_errors_when_enabled() {
        let err = load_config_from_str("[cache]\ndir = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn empty_cache_dir_allowed_when_disabled() {
        let config = load_config_from_str("[cache]\nenabled = false\ndir = \"\"").unwrap();
        assert!(!config.cache.enabled);
    }

    #[test]
    fn dry_run_without_cleanup_errors() {
        let err = load_config_from_str("[ledger]\ncleanup = false\ndry_run = true").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn wrong_type_errors() {
        let err = load_config_from_str("[build]\nthreads = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[build]\nthreads = 2\n").unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.build.threads, 2);
    }

    #[test]
    fn io_error_from_nonexistent_dir() {
        let err = load_config(Path::new("/nonexistent/dir")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
