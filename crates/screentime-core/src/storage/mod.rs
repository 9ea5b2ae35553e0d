//! Shared State Store: the only channel between the foreground controller
//! and the background monitor.
//!
//! There is no locking across processes; last writer wins per key. Every
//! component re-reads and recomputes rather than trusting cached state.

mod config;
pub mod database;
pub mod keys;
pub mod migrations;
pub mod records;
mod state;

pub use config::{Config, ControllerConfig, MonitorConfig, StorageConfig, UnlockConfig};
pub use database::SqliteStore;
pub use state::{DailyState, SharedState};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::{ConfigError, Result};

/// Raw key/value access to the shared container.
pub trait SharedStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Keys starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-process store. Clones share the same map, which is how tests stand up
/// a foreground and a background side on one container.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map().remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .map()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Returns the data directory, creating it if needed.
///
/// `SCREENTIME_DATA_DIR` overrides the location outright. Otherwise this is
/// `~/.config/screentime[-dev]/`, with `SCREENTIME_ENV=dev` selecting the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("SCREENTIME_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("SCREENTIME_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("screentime-dev")
            } else {
                base_dir.join("screentime")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
