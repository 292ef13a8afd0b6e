//! Configuration loader for Flowork.
//!
//! Reads `flowork.toml` and deserializes it into [`FloworkConfig`]. The
//! lenient loader falls back to defaults when the file is missing or
//! malformed; the strict loader is used when the user named the file
//! explicitly.

use std::path::Path;

use thiserror::Error;

use flowork_types::config::FloworkConfig;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "flowork.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Load configuration from `path`, falling back to defaults.
///
/// - If the file does not exist, returns [`FloworkConfig::default()`].
/// - If the file exists but cannot be read or parsed, logs a warning and
///   returns the default.
pub async fn load_config(path: &Path) -> FloworkConfig {
    match load_config_strict(path).await {
        Ok(config) => config,
        Err(ConfigError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            FloworkConfig::default()
        }
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            FloworkConfig::default()
        }
    }
}

/// Load configuration from `path`, failing if it is missing or invalid.
pub async fn load_config_strict(path: &Path) -> Result<FloworkConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

    toml::from_str::<FloworkConfig>(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
