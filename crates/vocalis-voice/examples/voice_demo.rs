//! Voice demo: one recording session and one spoken reply, with every failure routed through
//! the error engine.
//!
//! There is no audio device here. The "microphone" records a second of a 440 Hz tone and the
//! "local recognizer" always gives up, so the remote path at `VOCALIS_TRANSCRIBE_URL` does the
//! work. Set `TTS_API_KEY` in `.env` to hear the reply; without it the reply degrades to text.
//!
//! ```text
//! cargo run -p vocalis-voice --example voice_demo
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vocalis_core::{CoreConfig, ErrorEngine, FileSettings, ToastEvent};
use vocalis_voice::{
    AsrBackends, AudioRecorder, CapturedAudio, HttpSpeechEngine, HttpTranscriber, HybridAsr,
    LocalRecognizer, RecognizerSink, SpeechEngine, SpeechOptions, SpeechPriority,
    SynthesisOutcome, TtsQueue, VoiceConfig, VoiceResult,
};

const SAMPLE_RATE: u32 = 16_000;

struct ToneMicrophone;

#[async_trait]
impl AudioRecorder for ToneMicrophone {
    fn is_available(&self) -> bool {
        true
    }

    async fn start(&self) -> VoiceResult<()> {
        info!("🎙️ microphone open");
        Ok(())
    }

    async fn stop(&self) -> VoiceResult<CapturedAudio> {
        let samples: Vec<f32> = (0..SAMPLE_RATE)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                0.2 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
            })
            .collect();
        Ok(CapturedAudio::from_pcm(&samples, SAMPLE_RATE))
    }

    fn release(&self) {
        info!("🎙️ microphone released");
    }
}

/// Stands in for an on-device engine that could not make sense of the audio.
struct GiveUpRecognizer {
    sink: std::sync::Mutex<Option<RecognizerSink>>,
}

#[async_trait]
impl LocalRecognizer for GiveUpRecognizer {
    fn is_available(&self) -> bool {
        true
    }

    async fn start(&self, sink: RecognizerSink) -> VoiceResult<()> {
        if let Ok(mut slot) = self.sink.lock() {
            *slot = Some(sink);
        }
        Ok(())
    }

    async fn stop(&self) {
        let sink = self.sink.lock().ok().and_then(|mut slot| slot.take());
        if let Some(sink) = sink {
            sink.on_error("no-speech");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let core_config = CoreConfig::from_env();
    let voice_config = VoiceConfig::from_env();

    let settings = Arc::new(FileSettings::open(&core_config.settings_path));
    let errors = ErrorEngine::create(&core_config, settings);
    let _toasts = errors.notifier().subscribe(|event| match event {
        ToastEvent::Shown(toast) => {
            info!("🔔 [{}] {}: {}", toast.toast_type.as_str(), toast.title, toast.message)
        }
        ToastEvent::Dismissed(id) => info!("🔕 toast {} dismissed", id),
    });

    // Speech in
    let backends = AsrBackends {
        local: Some(Arc::new(GiveUpRecognizer {
            sink: std::sync::Mutex::new(None),
        })),
        recorder: Some(Arc::new(ToneMicrophone)),
        remote: Some(Arc::new(HttpTranscriber::from_config(&voice_config)?)),
    };
    let asr = HybridAsr::new(backends, errors.clone(), voice_config.asr_settings());

    asr.start_recording().await?;
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    let heard = match asr.stop_recording().await {
        Ok(transcript) => {
            info!(source = ?transcript.source, "heard: {:?}", transcript.text);
            transcript.text
        }
        Err(e) => {
            warn!("recognition failed: {}", e);
            String::from("I could not hear you.")
        }
    };

    // Speech out
    let engine: Option<Arc<dyn SpeechEngine>> = match HttpSpeechEngine::from_config(&voice_config) {
        Ok(engine) => Some(Arc::new(engine)),
        Err(e) => {
            info!("TTS disabled: {}", e);
            None
        }
    };
    let tts = TtsQueue::new(engine, errors.clone(), voice_config.tts_settings());
    let reply = format!("You said: {}", heard);
    match tts
        .synthesize(reply, SpeechOptions::default(), SpeechPriority::High)
        .await
    {
        SynthesisOutcome::Spoken { audio, attempts } => {
            info!(bytes = audio.len(), attempts, "🔊 reply synthesized")
        }
        SynthesisOutcome::TextOnly { text, reason } => info!(?reason, "💬 {}", text),
    }

    let metrics = errors.store().metrics();
    info!(total = metrics.total_errors, "errors this run: {:?}", metrics.errors_by_kind);
    errors.dispose();
    Ok(())
}
