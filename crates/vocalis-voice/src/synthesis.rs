//! **Speech synthesis engines**: the contract the TTS queue drives, plus an HTTP engine for
//! OpenAI-compatible `/audio/speech` endpoints.

use crate::config::VoiceConfig;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Per-request voice settings. Unset fields use the engine's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechOptions {
    pub voice: Option<String>,
    /// Playback speed, 1.0 = normal.
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,
}

impl SpeechOptions {
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: Option<String>,
}

/// Audio produced for one utterance. Engines that play directly may return it empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl SpeechAudio {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A text-to-speech engine. The queue never calls `speak` concurrently.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn is_available(&self) -> bool;

    async fn speak(&self, text: &str, options: &SpeechOptions) -> VoiceResult<SpeechAudio>;

    fn stop(&self);

    fn pause(&self);

    fn resume(&self);

    async fn voices(&self) -> VoiceResult<Vec<VoiceInfo>>;
}

const OPENAI_VOICES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// OpenAI-compatible TTS (OpenAI, OpenRouter, local servers speaking the same API).
///
/// Returns the synthesized bytes; playback belongs to the host, so `stop`/`pause`/`resume`
/// only log.
#[derive(Debug, Clone)]
pub struct HttpSpeechEngine {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    pub default_voice: String,
    client: reqwest::Client,
}

impl HttpSpeechEngine {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Config(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            default_voice: "alloy".to_string(),
            client,
        })
    }

    /// Build from config. Fails when no API key is configured.
    pub fn from_config(config: &VoiceConfig) -> VoiceResult<Self> {
        let api_key = config
            .tts_api_key
            .clone()
            .ok_or_else(|| VoiceError::Config("TTS requires TTS_API_KEY".to_string()))?;
        Ok(Self::new(
            config.tts_api_url.clone(),
            api_key,
            config.tts_model.clone(),
            config.http_timeout(),
        )?
        .with_voice(config.tts_voice.clone()))
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.default_voice = voice.into();
        self
    }

    fn request_body(&self, text: &str, options: &SpeechOptions) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": options.voice.as_deref().unwrap_or(&self.default_voice),
        });
        if let Some(rate) = options.rate {
            body["speed"] = serde_json::json!(rate.clamp(0.25, 4.0));
        }
        body
    }
}

#[async_trait]
impl SpeechEngine for HttpSpeechEngine {
    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn speak(&self, text: &str, options: &SpeechOptions) -> VoiceResult<SpeechAudio> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SpeechAudio::default());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(text, options))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::TtsStatus { status, body });
        }
        let mime_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let bytes = res.bytes().await?;
        Ok(SpeechAudio::new(bytes.to_vec(), mime_type))
    }

    fn stop(&self) {
        debug!("HttpSpeechEngine: stop (playback is owned by the host)");
    }

    fn pause(&self) {
        debug!("HttpSpeechEngine: pause (playback is owned by the host)");
    }

    fn resume(&self) {
        debug!("HttpSpeechEngine: resume (playback is owned by the host)");
    }

    async fn voices(&self) -> VoiceResult<Vec<VoiceInfo>> {
        Ok(OPENAI_VOICES
            .iter()
            .map(|v| VoiceInfo {
                id: v.to_string(),
                name: v.to_string(),
                language: None,
            })
            .collect())
    }
}
