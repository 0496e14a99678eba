//! Core configuration, loaded from the environment or a TOML file.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | VOCALIS_ERROR_LOG_CAPACITY | 100 | Classified errors kept in the in-memory log. |
//! | VOCALIS_MAX_VISIBLE_TOASTS | 5 | Toasts shown at once. |
//! | VOCALIS_TOAST_RATE_LIMIT_MS | 500 | Window in which an identical toast is dropped. |
//! | VOCALIS_SETTINGS_PATH | vocalis_settings.json | File used by `FileSettings`. |

use crate::error::CoreResult;
use crate::notify::{DEFAULT_MAX_VISIBLE, DEFAULT_RATE_LIMIT};
use crate::store::DEFAULT_ERROR_LOG_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_error_log_capacity() -> usize {
    DEFAULT_ERROR_LOG_CAPACITY
}

fn default_max_visible_toasts() -> usize {
    DEFAULT_MAX_VISIBLE
}

fn default_toast_rate_limit_ms() -> u64 {
    DEFAULT_RATE_LIMIT.as_millis() as u64
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("vocalis_settings.json")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_error_log_capacity")]
    pub error_log_capacity: usize,
    #[serde(default = "default_max_visible_toasts")]
    pub max_visible_toasts: usize,
    #[serde(default = "default_toast_rate_limit_ms")]
    pub toast_rate_limit_ms: u64,
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            error_log_capacity: default_error_log_capacity(),
            max_visible_toasts: default_max_visible_toasts(),
            toast_rate_limit_ms: default_toast_rate_limit_ms(),
            settings_path: default_settings_path(),
        }
    }
}

impl CoreConfig {
    /// Load from environment. Unset or invalid values fall back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            error_log_capacity: env_parse("VOCALIS_ERROR_LOG_CAPACITY", defaults.error_log_capacity)
                .max(1),
            max_visible_toasts: env_parse("VOCALIS_MAX_VISIBLE_TOASTS", defaults.max_visible_toasts)
                .max(1),
            toast_rate_limit_ms: env_parse("VOCALIS_TOAST_RATE_LIMIT_MS", defaults.toast_rate_limit_ms),
            settings_path: env_opt_string("VOCALIS_SETTINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.settings_path),
        }
    }

    /// Load from a TOML file; missing keys take their defaults.
    pub fn load_from_path(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_path(&self, path: &Path) -> CoreResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn toast_rate_limit(&self) -> Duration {
        Duration::from_millis(self.toast_rate_limit_ms)
    }
}

/// Parse `name` from the environment, falling back to `default` when unset or invalid.
pub fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

/// `true`/`false` from the environment; anything else keeps `default`.
pub fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Trimmed, non-empty string from the environment.
pub fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
