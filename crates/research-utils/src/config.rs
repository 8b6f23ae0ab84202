//! Configuration file loading helpers

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading a configuration document
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON for the target type
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read and deserialize a JSON configuration file
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("Loaded config file {}", path.display());
    read_json_str(&content)
}

/// Deserialize a JSON configuration document held in memory
pub fn read_json_str<T: DeserializeOwned>(content: &str) -> Result<T, ConfigError> {
    Ok(serde_json::from_str(content)?)
}
