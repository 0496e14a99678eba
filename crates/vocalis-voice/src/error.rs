//! Error types for the Vocalis voice pipelines

use thiserror::Error;
use vocalis_core::{kind_for_http_status, ErrorKind, RawError, Severity, Subsystem};

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur in speech recognition or synthesis
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoiceError {
    #[error("A recording session is already active")]
    AlreadyRecording,

    #[error("No speech recognition backend is available")]
    NoAsrAvailable,

    #[error("No active recording session")]
    NoActiveSession,

    #[error("Recording timed out before a transcript was produced")]
    RecordingTimeout,

    #[error("Recording cancelled")]
    Cancelled,

    #[error("Microphone error: {0}")]
    Microphone(String),

    #[error("Speech recognition error: {0}")]
    Recognition(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("STT API error {status}: {body}")]
    SttStatus { status: u16, body: String },

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("TTS API error {status}: {body}")]
    TtsStatus { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl VoiceError {
    /// Structured error for the core pipeline. The kind is explicit, so keyword matching is
    /// skipped.
    pub fn to_raw(&self) -> RawError {
        let (kind, subsystem) = match self {
            VoiceError::AlreadyRecording
            | VoiceError::NoActiveSession
            | VoiceError::Cancelled
            | VoiceError::NoAsrAvailable
            | VoiceError::RecordingTimeout
            | VoiceError::Microphone(_)
            | VoiceError::Recognition(_)
            | VoiceError::Stt(_) => (ErrorKind::AsrError, Subsystem::Asr),
            VoiceError::SttStatus { status, .. } => {
                (kind_for_http_status(*status, ErrorKind::AsrError), Subsystem::Asr)
            }
            VoiceError::Tts(_) => (ErrorKind::TtsError, Subsystem::Tts),
            VoiceError::TtsStatus { status, .. } => {
                (kind_for_http_status(*status, ErrorKind::TtsError), Subsystem::Tts)
            }
            VoiceError::Network(_) => (ErrorKind::ConnectionError, Subsystem::Connection),
            VoiceError::Config(_) => (ErrorKind::SystemError, Subsystem::System),
        };
        let raw = RawError::typed(kind, self.to_string()).with_subsystem(subsystem);
        match self {
            // Nothing left to fall back to.
            VoiceError::NoAsrAvailable => raw.with_severity(Severity::High),
            VoiceError::AlreadyRecording | VoiceError::NoActiveSession | VoiceError::Cancelled => {
                raw.with_severity(Severity::Low)
            }
            _ => raw,
        }
    }
}

impl From<reqwest::Error> for VoiceError {
    fn from(err: reqwest::Error) -> Self {
        VoiceError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for VoiceError {
    fn from(err: toml::de::Error) -> Self {
        VoiceError::Config(err.to_string())
    }
}

impl From<std::io::Error> for VoiceError {
    fn from(err: std::io::Error) -> Self {
        VoiceError::Config(err.to_string())
    }
}
