//! **Remote transcription**: the high-accuracy fallback path of the hybrid recognizer.
//!
//! `HttpTranscriber` posts the captured audio to `{base_url}/api/transcribe` as a multipart
//! field named `audio` and reads `{ "transcript": ... }` back. Failures come back as
//! `{ "error": ... }` with a non-2xx status; the status decides how the failure is classified.

use crate::config::VoiceConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::recognizer::CapturedAudio;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Server-side speech-to-text.
#[async_trait]
pub trait RemoteTranscriber: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    /// Transcribe one recording. Empty audio yields an empty transcript.
    async fn transcribe(&self, audio: CapturedAudio) -> VoiceResult<String>;
}

#[derive(Debug, Default, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the `/api/transcribe` endpoint.
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    /// Base URL without trailing slash (e.g. http://localhost:3000).
    pub base_url: String,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Config(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn from_config(config: &VoiceConfig) -> VoiceResult<Self> {
        Self::new(config.transcribe_url.clone(), config.http_timeout())
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/transcribe", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl RemoteTranscriber for HttpTranscriber {
    async fn transcribe(&self, audio: CapturedAudio) -> VoiceResult<String> {
        if audio.is_empty() {
            return Ok(String::new());
        }
        let url = self.endpoint();
        debug!(url = %url, bytes = audio.len(), "uploading audio for transcription");

        let part = reqwest::multipart::Part::bytes(audio.bytes)
            .file_name(audio.file_name)
            .mime_str(&audio.mime_type)
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("audio", part);
        let res = self.client.post(&url).multipart(form).send().await?;

        let status = res.status();
        let body = res.text().await?;
        let parsed: TranscribeResponse = serde_json::from_str(&body).unwrap_or_default();

        if !status.is_success() {
            return Err(VoiceError::SttStatus {
                status: status.as_u16(),
                body: parsed.error.unwrap_or(body),
            });
        }
        match parsed.transcript {
            Some(text) => Ok(text.trim().to_string()),
            None => Err(VoiceError::Stt(
                parsed
                    .error
                    .unwrap_or_else(|| "response carried no transcript".to_string()),
            )),
        }
    }
}
