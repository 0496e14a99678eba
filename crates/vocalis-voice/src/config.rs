//! Voice configuration, loaded from the environment or a TOML file.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | VOCALIS_TRANSCRIBE_URL | http://localhost:3000 | Base URL of the `/api/transcribe` backend. |
//! | VOCALIS_HTTP_TIMEOUT_MS | 30000 | Request timeout for the HTTP backends. |
//! | VOCALIS_LOCAL_ASR_TIMEOUT_MS | 15000 | Time the local recognizer gets before the remote fallback. |
//! | VOCALIS_RECORDING_TIMEOUT_MS | 30000 | Hard ceiling for a recording session, from start. |
//! | VOCALIS_TTS_ENABLED | true | Speak replies at all. |
//! | VOCALIS_TTS_MAX_RETRIES | 2 | Retries per synthesis request. |
//! | VOCALIS_TTS_RETRY_BASE_MS | 500 | First backoff delay; doubles per retry. |
//! | VOCALIS_TTS_CACHE_LIMIT_BYTES | 8388608 | Cached audio kept before cleanup evicts. |
//! | VOCALIS_TTS_CLEANUP_INTERVAL_MS | 30000 | Minimum time between cache cleanups. |
//! | TTS_API_URL | https://api.openai.com/v1 | OpenAI-compatible speech endpoint. |
//! | TTS_API_KEY | (none) | Bearer key for the speech endpoint. |
//! | TTS_MODEL | tts-1 | Speech model. |
//! | TTS_VOICE | alloy | Default voice. |

use crate::error::VoiceResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vocalis_core::config::{env_bool, env_opt_string, env_parse};

/// Timeouts for the hybrid recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsrSettings {
    /// How long the local recognizer may take after stop before the remote path runs
    /// (default: 15s)
    pub local_timeout: Duration,

    /// Absolute ceiling from session start (default: 30s)
    pub hard_timeout: Duration,
}

impl Default for AsrSettings {
    fn default() -> Self {
        Self {
            local_timeout: Duration::from_secs(15),
            hard_timeout: Duration::from_secs(30),
        }
    }
}

/// Behavior of the synthesis queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtsSettings {
    pub enabled: bool,

    /// Retries after the first failed attempt (default: 2)
    pub max_retries: u32,

    /// Delay before the first retry; retry n waits `retry_base * 2^(n-1)` (default: 500ms)
    pub retry_base: Duration,

    /// Cached audio above this is evicted, oldest first (default: 8 MiB)
    pub cache_limit_bytes: usize,

    /// Cleanup runs at most once per interval (default: 30s)
    pub cleanup_interval: Duration,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 2,
            retry_base: Duration::from_millis(500),
            cache_limit_bytes: 8 * 1024 * 1024,
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub transcribe_url: String,
    pub http_timeout_ms: u64,
    pub local_asr_timeout_ms: u64,
    pub recording_timeout_ms: u64,
    pub tts_enabled: bool,
    pub tts_max_retries: u32,
    pub tts_retry_base_ms: u64,
    pub tts_cache_limit_bytes: usize,
    pub tts_cleanup_interval_ms: u64,
    pub tts_api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_api_key: Option<String>,
    pub tts_model: String,
    pub tts_voice: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        let asr = AsrSettings::default();
        let tts = TtsSettings::default();
        Self {
            transcribe_url: "http://localhost:3000".to_string(),
            http_timeout_ms: 30_000,
            local_asr_timeout_ms: asr.local_timeout.as_millis() as u64,
            recording_timeout_ms: asr.hard_timeout.as_millis() as u64,
            tts_enabled: tts.enabled,
            tts_max_retries: tts.max_retries,
            tts_retry_base_ms: tts.retry_base.as_millis() as u64,
            tts_cache_limit_bytes: tts.cache_limit_bytes,
            tts_cleanup_interval_ms: tts.cleanup_interval.as_millis() as u64,
            tts_api_url: "https://api.openai.com/v1".to_string(),
            tts_api_key: None,
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
        }
    }
}

impl VoiceConfig {
    /// Load from environment. Unset or invalid values fall back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            transcribe_url: env_opt_string("VOCALIS_TRANSCRIBE_URL").unwrap_or(d.transcribe_url),
            http_timeout_ms: env_parse("VOCALIS_HTTP_TIMEOUT_MS", d.http_timeout_ms),
            local_asr_timeout_ms: env_parse("VOCALIS_LOCAL_ASR_TIMEOUT_MS", d.local_asr_timeout_ms),
            recording_timeout_ms: env_parse("VOCALIS_RECORDING_TIMEOUT_MS", d.recording_timeout_ms),
            tts_enabled: env_bool("VOCALIS_TTS_ENABLED", d.tts_enabled),
            tts_max_retries: env_parse("VOCALIS_TTS_MAX_RETRIES", d.tts_max_retries),
            tts_retry_base_ms: env_parse("VOCALIS_TTS_RETRY_BASE_MS", d.tts_retry_base_ms),
            tts_cache_limit_bytes: env_parse("VOCALIS_TTS_CACHE_LIMIT_BYTES", d.tts_cache_limit_bytes),
            tts_cleanup_interval_ms: env_parse(
                "VOCALIS_TTS_CLEANUP_INTERVAL_MS",
                d.tts_cleanup_interval_ms,
            ),
            tts_api_url: env_opt_string("TTS_API_URL").unwrap_or(d.tts_api_url),
            tts_api_key: env_opt_string("TTS_API_KEY"),
            tts_model: env_opt_string("TTS_MODEL").unwrap_or(d.tts_model),
            tts_voice: env_opt_string("TTS_VOICE").unwrap_or(d.tts_voice),
        }
    }

    /// Load from a TOML file; missing keys take their defaults.
    pub fn load_from_path(path: &Path) -> VoiceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn asr_settings(&self) -> AsrSettings {
        AsrSettings {
            local_timeout: Duration::from_millis(self.local_asr_timeout_ms),
            hard_timeout: Duration::from_millis(self.recording_timeout_ms),
        }
    }

    pub fn tts_settings(&self) -> TtsSettings {
        TtsSettings {
            enabled: self.tts_enabled,
            max_retries: self.tts_max_retries,
            retry_base: Duration::from_millis(self.tts_retry_base_ms),
            cache_limit_bytes: self.tts_cache_limit_bytes,
            cleanup_interval: Duration::from_millis(self.tts_cleanup_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_settings_defaults() {
        let config = VoiceConfig::default();
        assert_eq!(config.asr_settings(), AsrSettings::default());
        assert_eq!(config.tts_settings(), TtsSettings::default());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: VoiceConfig = toml::from_str(
            r#"
            transcribe_url = "https://voice.example.com"
            tts_max_retries = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.transcribe_url, "https://voice.example.com");
        assert_eq!(config.tts_settings().max_retries, 4);
        assert_eq!(config.asr_settings().hard_timeout, Duration::from_secs(30));
        assert!(config.tts_api_key.is_none());
    }
}
