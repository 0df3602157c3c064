//! Storage configuration at ~/.config/syncstore/config.toml

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ::config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::profile::BackendProfile;

/// What to do when the store returns fewer results than operations submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCountPolicy {
    /// Log a warning and keep going with the results that were returned.
    #[default]
    Warn,
    /// Fail the commit with `LocalStorageError::ResultCountMismatch`.
    Strict,
}

fn is_default_policy(p: &ResultCountPolicy) -> bool {
    *p == ResultCountPolicy::default()
}

/// Override for one named backend profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOverride {
    /// `0` disables yield points.
    pub max_operations_per_yield_point: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, ProfileOverride>,

    #[serde(default, skip_serializing_if = "is_default_policy")]
    pub result_count: ResultCountPolicy,
}

impl StorageConfig {
    pub fn config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::Config("Could not determine config directory".into()))?
            .join("syncstore");

        Ok(config_dir.join("config.toml"))
    }

    /// Loads the config from the default location, writing a commented
    /// default file first if there is none.
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    /// Loads the config from `path`. `~` is expanded; a missing file yields
    /// the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = expand_path(path.as_ref());

        Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .build()
            .map_err(|e| ConfigError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Config(e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = expand_path(path.as_ref());

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Config(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> ConfigResult<()> {
        let contents = "\
# syncstore configuration

# What to do when the store returns fewer results than operations
# submitted (\"warn\" or \"strict\"):
# result_count = \"warn\"

# Override the yield point limit of a backend (0 = no yield points):
# [profiles.contacts]
# max_operations_per_yield_point = 499
";

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Resolves a backend profile by name, applying any configured override.
    ///
    /// Names without a built-in profile are accepted when they are configured.
    pub fn profile(&self, name: &str) -> ConfigResult<BackendProfile> {
        match self.profiles.get(name) {
            Some(o) => Ok(BackendProfile::with_yield_point_every(
                o.max_operations_per_yield_point,
            )),
            None => BackendProfile::from_name(name),
        }
    }
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
