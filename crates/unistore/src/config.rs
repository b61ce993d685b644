//! Store configuration
//!
//! Options can be set in code through [`StoreBuilder`](crate::StoreBuilder)
//! or loaded from a TOML file:
//!
//! ```toml
//! label = "session"
//! automatically_skip_repeats = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Options of a [`Store`](crate::Store)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Add an implicit skip-repeats to subscriptions whose selected value is
    /// comparable and that have no explicit skip/only operator
    #[serde(default = "default_automatically_skip_repeats")]
    pub automatically_skip_repeats: bool,

    /// Name used in log output, helpful with several stores
    #[serde(default = "default_label")]
    pub label: String,
}

fn default_automatically_skip_repeats() -> bool {
    true
}

fn default_label() -> String {
    "store".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            automatically_skip_repeats: default_automatically_skip_repeats(),
            label: default_label(),
        }
    }
}

impl StoreConfig {
    /// Parse a config from TOML; missing fields use their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded store config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert!(config.automatically_skip_repeats);
        assert_eq!(config.label, "store");
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config = StoreConfig::from_toml_str(
            r#"
            automatically_skip_repeats = false
        "#,
        )
        .unwrap();
        assert!(!config.automatically_skip_repeats);
        // label should use default
        assert_eq!(config.label, "store");
    }

    #[test]
    fn test_config_rejects_wrong_types() {
        let result = StoreConfig::from_toml_str(r#"automatically_skip_repeats = "yes""#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("unistore-config-{}.toml", std::process::id()));
        std::fs::write(&path, "label = \"session\"\n").unwrap();

        let config = StoreConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.label, "session");
        assert!(config.automatically_skip_repeats);
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("unistore-config-does-not-exist.toml");
        match StoreConfig::load(&path) {
            Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected io error, got {:?}", other),
        }
    }
}
