//! **Settings persistence**: a synchronous key → JSON-string store.
//!
//! Implement [`SettingsStore`] over whatever the host offers (browser storage, a config
//! service, ...). [`MemorySettings`] and [`FileSettings`] cover tests and desktop use.
//! Typed access goes through [`load_json`]/[`save_json`]; malformed stored JSON reads as
//! absent and never surfaces as an error.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String) -> CoreResult<()>;

    fn remove(&self, key: &str) -> CoreResult<()>;
}

/// Read and decode `key`. Missing or malformed values yield `None`.
pub fn load_json<T: DeserializeOwned>(store: &dyn SettingsStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "ignoring malformed stored setting");
            None
        }
    }
}

pub fn save_json<T: Serialize + ?Sized>(store: &dyn SettingsStore, key: &str, value: &T) -> CoreResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, raw)
}

/// In-process settings, lost on exit.
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> CoreResult<()> {
        self.values().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        self.values().remove(key);
        Ok(())
    }
}

/// Settings kept in a single JSON object file. The whole file is rewritten on every `set`.
pub struct FileSettings {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileSettings {
    /// Open `path`, starting empty if the file is missing or unreadable as a JSON object.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "settings file is malformed, starting empty");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, content).map_err(|e| {
            CoreError::Settings(format!("failed to write {}: {}", self.path.display(), e))
        })
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> CoreResult<()> {
        let mut values = self.values();
        values.insert(key.to_string(), value);
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        let mut values = self.values();
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}
