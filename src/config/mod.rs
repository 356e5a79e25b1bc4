//! Configuration management for Stratum

pub mod schema;

pub use schema::Config;

use crate::error::{StratumError, StratumResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// File name for project-local configuration
const LOCAL_CONFIG_NAME: &str = ".stratum.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stratum")
            .join("config.toml")
    }

    /// Get the state directory path.
    ///
    /// `STRATUM_STATE_DIR` overrides the platform default (useful in CI).
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("STRATUM_STATE_DIR") {
            return PathBuf::from(dir);
        }
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stratum")
    }

    /// Get the staged layer artifacts directory
    pub fn layers_dir() -> PathBuf {
        Self::state_dir().join("layers")
    }

    /// Get the build contexts directory
    pub fn builds_dir() -> PathBuf {
        Self::state_dir().join("builds")
    }

    /// Get the cache records file path
    pub fn records_path() -> PathBuf {
        Self::state_dir().join("records.jsonl")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> StratumResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> StratumResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StratumError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| StratumError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load configuration with optional project-local overrides.
    ///
    /// The local file is deep-merged over the global one: local keys win,
    /// untouched sections keep their global (or default) values.
    pub async fn load_merged(&self, local: Option<&Path>) -> StratumResult<Config> {
        let mut merged = self.read_toml_value(&self.config_path).await?;

        if let Some(local_path) = local {
            let overlay = self.read_toml_value(local_path).await?;
            merge_toml(&mut merged, overlay);
        }

        merged
            .try_into()
            .map_err(|e: toml::de::Error| StratumError::ConfigInvalid {
                path: local.unwrap_or(&self.config_path).to_path_buf(),
                reason: e.to_string(),
            })
    }

    async fn read_toml_value(&self, path: &Path) -> StratumResult<toml::Value> {
        if !path.exists() {
            return Ok(toml::Value::Table(toml::map::Map::new()));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StratumError::io(format!("reading config from {}", path.display()), e))?;

        content
            .parse()
            .map_err(|e: toml::de::Error| StratumError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Find a project-local config by walking up from `start`
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        let mut dir = Some(start);
        while let Some(current) = dir {
            let candidate = current.join(LOCAL_CONFIG_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            dir = current.parent();
        }
        None
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> StratumResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            StratumError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> StratumResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StratumError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure all state directories exist
    pub async fn ensure_state_dirs() -> StratumResult<()> {
        let dirs = [Self::state_dir(), Self::layers_dir(), Self::builds_dir()];

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                StratumError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep-merge `overlay` into `base`: tables merge recursively, everything
/// else is replaced by the overlay value.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => merge_toml(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}
