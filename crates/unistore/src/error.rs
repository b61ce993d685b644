//! Error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading a [`StoreConfig`](crate::StoreConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has fields of the wrong type.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
