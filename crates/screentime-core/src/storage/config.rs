//! TOML-based configuration.
//!
//! Stored at `<data_dir>/config.toml`. Both execution domains read the same
//! file so they agree on the container name and event naming.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::{ConfigError, Result};

/// Where the shared container lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Namespace shared by the foreground and background processes.
    #[serde(default = "default_container")]
    pub container: String,
    /// Database file name inside the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

/// Threshold registration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Prefix for synthetic threshold event names (`<prefix>.<index>`).
    #[serde(default = "default_event_prefix")]
    pub event_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// How often the foreground checks for a day-boundary crossing.
    #[serde(default = "default_day_check_interval")]
    pub day_check_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockConfig {
    #[serde(default = "default_break_minutes")]
    pub default_break_minutes: u32,
    #[serde(default = "default_max_break_minutes")]
    pub max_break_minutes: u32,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub unlock: UnlockConfig,
}

fn default_container() -> String {
    "group.screentime.shared".into()
}
fn default_database_file() -> String {
    "shared.db".into()
}
fn default_event_prefix() -> String {
    "limit".into()
}
fn default_day_check_interval() -> u64 {
    60
}
fn default_break_minutes() -> u32 {
    15
}
fn default_max_break_minutes() -> u32 {
    240
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            container: default_container(),
            database_file: default_database_file(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            event_prefix: default_event_prefix(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            day_check_interval_secs: default_day_check_interval(),
        }
    }
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            default_break_minutes: default_break_minutes(),
            max_break_minutes: default_max_break_minutes(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let (parent_path, leaf) = match key.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, key),
        };
        if leaf.is_empty() {
            return Err(unknown());
        }

        let mut parent = root;
        if let Some(path) = parent_path {
            for part in path.split('.') {
                parent = parent.get_mut(part).ok_or_else(unknown)?;
            }
        }
        let obj = parent.as_object_mut().ok_or_else(unknown)?;
        let existing = obj.get(leaf).ok_or_else(unknown)?;

        let new_value = match existing {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                value
                    .parse::<bool>()
                    .map_err(|e| invalid(e.to_string()))?,
            ),
            serde_json::Value::Number(_) => {
                let n = value
                    .parse::<u64>()
                    .map_err(|_| invalid(format!("cannot parse '{value}' as a whole number")))?;
                serde_json::Value::Number(n.into())
            }
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                return Err(invalid("cannot set a whole section".into()));
            }
            _ => serde_json::Value::String(value.into()),
        };

        obj.insert(leaf.to_string(), new_value);
        Ok(())
    }

    /// `<data_dir>/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// default config cannot be written.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
                .into()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    /// Load, returning defaults on any error. Never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default configuration");
            Self::default()
        })
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key, in memory only.
    ///
    /// # Errors
    /// Returns an error if the key is unknown or the value has the wrong type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.container.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "storage.container".into(),
                message: "must not be empty".into(),
            });
        }
        if self.monitor.event_prefix.is_empty() || self.monitor.event_prefix.contains('.') {
            return Err(ConfigError::InvalidValue {
                key: "monitor.event_prefix".into(),
                message: "must be non-empty and contain no '.'".into(),
            });
        }
        if self.controller.day_check_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "controller.day_check_interval_secs".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.unlock.default_break_minutes > self.unlock.max_break_minutes {
            return Err(ConfigError::InvalidValue {
                key: "unlock.default_break_minutes".into(),
                message: "exceeds unlock.max_break_minutes".into(),
            });
        }
        Ok(())
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(data_dir()?.join(&self.storage.database_file))
    }
}
