//! Cache configuration loaded from `kiln.toml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Name of the configuration file looked up in a directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Fixed subdirectory of the cache root that holds the index and entries.
pub const CACHE_DIR_NAME: &str = "shadercache";

/// Settings for a program binary cache.
///
/// ```toml
/// cache_root = "/home/user/.cache/mygame"
/// version_preamble = "#version 330"
/// enabled = true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Platform-defined cache root. The cache itself lives in
    /// [`CACHE_DIR_NAME`] beneath it.
    pub cache_root: PathBuf,

    /// Shading-language version line forced on every stage by the platform,
    /// replacing whatever version directive the source declares.
    #[serde(default)]
    pub version_preamble: Option<String>,

    /// When `false` the cache behaves as if binaries were unsupported.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl CacheConfig {
    /// Creates an enabled configuration rooted at `cache_root` with no
    /// forced version preamble.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            version_preamble: None,
            enabled: true,
        }
    }

    /// Returns the directory holding the index file and shard directories.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_root.join(CACHE_DIR_NAME)
    }
}

/// Loads and validates `<dir>/kiln.toml`.
pub fn load_config(dir: &Path) -> Result<CacheConfig, ConfigError> {
    let content = std::fs::read_to_string(dir.join(CONFIG_FILE))?;
    load_config_from_str(&content)
}

/// Parses and validates a configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<CacheConfig, ConfigError> {
    let config: CacheConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.cache_root.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("cache_root".to_string()));
    }
    if let Some(preamble) = &config.version_preamble {
        if !preamble.trim_start().starts_with("#version") {
            return Err(ConfigError::ValidationError(format!(
                "version_preamble must be a #version directive, got '{preamble}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let config = load_config_from_str(r#"cache_root = "/tmp/game""#).unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/tmp/game"));
        assert!(config.version_preamble.is_none());
        assert!(config.enabled);
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/game/shadercache"));
    }

    #[test]
    fn parse_full_config() {
        let toml = r##"
cache_root = "/tmp/game"
version_preamble = "#version 330"
enabled = false
"##;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.version_preamble.as_deref(), Some("#version 330"));
        assert!(!config.enabled);
    }

    #[test]
    fn missing_root_is_parse_error() {
        let err = load_config_from_str("enabled = true").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn empty_root_rejected() {
        let err = load_config_from_str(r#"cache_root = """#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(ref f) if f == "cache_root"));
    }

    #[test]
    fn bad_preamble_rejected() {
        let toml = r#"
cache_root = "/tmp/game"
version_preamble = "precision highp float;"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"cache_root = "cache""#).unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.cache_root, PathBuf::from("cache"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_config(dir.path()),
            Err(ConfigError::IoError(_))
        ));
    }
}
