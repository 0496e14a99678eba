//! # Vocalis Voice - Fault-Tolerant Speech In and Out
//!
//! Two independent pipelines that survive unreliable speech engines and networks, both
//! reporting their failures into the [`vocalis_core::ErrorEngine`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      HybridAsr (speech in)                    │
//! │  ┌──────────────────┐  first result  ┌───────────────────┐   │
//! │  │ LocalRecognizer  │ ─────────────→ │    Transcript     │   │
//! │  └──────────────────┘                └───────────────────┘   │
//! │  ┌──────────────────┐  error/timeout ┌───────────────────┐   │
//! │  │  AudioRecorder   │ ─────────────→ │ RemoteTranscriber │   │
//! │  └──────────────────┘                └───────────────────┘   │
//! ├──────────────────────────────────────────────────────────────┤
//! │                      TtsQueue (speech out)                    │
//! │  high → normal → low ─► SpeechEngine ─► retry w/ backoff      │
//! │                                     └─► text-only fallback    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod arbitrator;
pub mod audio_cache;
pub mod config;
pub mod error;
pub mod recognizer;
pub mod synthesis;
pub mod transcribe;
pub mod tts_queue;

pub use arbitrator::{AsrBackends, AsrStatus, HybridAsr, Transcript, TranscriptSource};
pub use audio_cache::AudioCache;
pub use config::{AsrSettings, TtsSettings, VoiceConfig};
pub use error::{VoiceError, VoiceResult};
pub use recognizer::{AudioRecorder, CapturedAudio, LocalRecognizer, RecognizerEvent, RecognizerSink};
pub use synthesis::{HttpSpeechEngine, SpeechAudio, SpeechEngine, SpeechOptions, VoiceInfo};
pub use transcribe::{HttpTranscriber, RemoteTranscriber};
pub use tts_queue::{
    FallbackReason, SpeechPriority, SynthesisOutcome, SynthesisTicket, TtsQueue, TtsStats,
};
