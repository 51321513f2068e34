//! Service configuration
//!
//! A JSON config file merged with environment overrides on top of built-in
//! defaults. Only the options the core consumes live here: the rendition
//! vocabulary, the two store locations, the per-call timeout and the log
//! level.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::pathmap::PathMapper;

/// Environment variable naming the config file.
pub const CONFIG_FILE_ENV: &str = "ICONVAULT_CONFIG_FILE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultConfig {
    /// Allowed iconfile formats.
    pub allowed_formats: Vec<String>,
    /// Allowed iconfile sizes.
    pub allowed_sizes: Vec<String>,
    /// Directory of the version-controlled tree.
    pub tree_location: PathBuf,
    /// Path of the catalog database.
    pub catalog_location: PathBuf,
    /// Bound on each individual store call, in seconds.
    pub store_timeout_secs: u64,
    /// Log level filter directive.
    pub log_level: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        let home = Self::default_home();
        Self {
            allowed_formats: vec!["svg".into(), "png".into()],
            allowed_sizes: vec![
                "18px".into(),
                "24px".into(),
                "36px".into(),
                "48px".into(),
                "54px".into(),
            ],
            tree_location: home.join("tree"),
            catalog_location: home.join("catalog.db"),
            store_timeout_secs: 30,
            log_level: "info".into(),
        }
    }
}

impl VaultConfig {
    /// Default data directory under the user home.
    pub fn default_home() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".iconvault")
    }

    /// The config file path: `$ICONVAULT_CONFIG_FILE` or the default home.
    pub fn config_file_path() -> PathBuf {
        match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::default_home().join("config.json"),
        }
    }

    /// Load from a file, falling back to defaults when the file is absent;
    /// environment overrides are applied either way.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            info!("loading configuration from {}", path.display());
            let content =
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| ConfigError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            debug!("no config file at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save to a file, creating parent directories as needed.
    pub async fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tokio::fs::write(path, content).await.map_err(io_err)
    }

    /// Environment variables override file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(formats) = std::env::var("ICONVAULT_ALLOWED_FORMATS") {
            self.allowed_formats = split_csv(&formats);
        }
        if let Ok(sizes) = std::env::var("ICONVAULT_ALLOWED_SIZES") {
            self.allowed_sizes = split_csv(&sizes);
        }
        if let Ok(tree) = std::env::var("ICONVAULT_TREE_LOCATION") {
            self.tree_location = PathBuf::from(tree);
        }
        if let Ok(catalog) = std::env::var("ICONVAULT_CATALOG_LOCATION") {
            self.catalog_location = PathBuf::from(catalog);
        }
        if let Ok(timeout) = std::env::var("ICONVAULT_STORE_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                self.store_timeout_secs = secs;
            }
        }
        if let Ok(level) = std::env::var("ICONVAULT_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Path mapper over the configured vocabulary.
    pub fn path_mapper(&self) -> PathMapper {
        PathMapper::new(
            self.allowed_formats.iter().cloned(),
            self.allowed_sizes.iter().cloned(),
        )
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
