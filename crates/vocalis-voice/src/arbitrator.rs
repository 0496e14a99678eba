//! **Hybrid ASR**: one recording session, two recognizers, first answer wins.
//!
//! ```text
//!  start ─► Recording ──stop──► Resolving ──► Idle
//!              │                   │
//!              │        local result ─────────────► Transcript (Local)
//!              │        local error / local timeout ─► remote(audio) ─► Transcript (Remote)
//!              └─ hard ceiling (watchdog) ─────────────────────────────► RecordingTimeout
//! ```
//!
//! Every session gets a generation number. Resolution only applies while the session that
//! started it is still current, so late callbacks from an earlier session are ignored.
//! Both timeouts are absolute from session start. The microphone is released exactly once per
//! acquired session, whichever path resolves it.

use crate::config::AsrSettings;
use crate::error::{VoiceError, VoiceResult};
use crate::recognizer::{AudioRecorder, LocalRecognizer, RecognizerEvent, RecognizerSink};
use crate::transcribe::RemoteTranscriber;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vocalis_core::{ErrorContext, ErrorEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsrStatus {
    Idle,
    Recording,
    Resolving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptSource {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    pub source: TranscriptSource,
    /// Time from `stop_recording` to the transcript.
    pub latency: Duration,
}

/// The backends a [`HybridAsr`] can race. Any of them may be missing.
#[derive(Clone, Default)]
pub struct AsrBackends {
    pub local: Option<Arc<dyn LocalRecognizer>>,
    pub recorder: Option<Arc<dyn AudioRecorder>>,
    pub remote: Option<Arc<dyn RemoteTranscriber>>,
}

impl AsrBackends {
    fn local_usable(&self) -> bool {
        self.local.as_ref().is_some_and(|l| l.is_available())
    }

    /// The remote path needs both a microphone and a transcriber.
    fn remote_usable(&self) -> bool {
        self.recorder.as_ref().is_some_and(|r| r.is_available())
            && self.remote.as_ref().is_some_and(|r| r.is_available())
    }
}

struct RecordingSession {
    generation: u64,
    started_at: Instant,
    local_started: bool,
    mic_acquired: bool,
    stopping: bool,
    fallback_attempted: bool,
    events: Option<mpsc::UnboundedReceiver<RecognizerEvent>>,
}

#[derive(Default)]
struct AsrState {
    generation: u64,
    session: Option<RecordingSession>,
}

struct AsrInner {
    backends: AsrBackends,
    errors: Arc<ErrorEngine>,
    settings: AsrSettings,
    state: Mutex<AsrState>,
    status: watch::Sender<AsrStatus>,
}

impl AsrInner {
    fn state(&self) -> MutexGuard<'_, AsrState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state()
            .session
            .as_ref()
            .is_some_and(|s| s.generation == generation)
    }

    /// End session `generation` if it is still current. Returns false when something else
    /// already ended it.
    fn finish(&self, generation: u64, abort_local: bool) -> bool {
        let session = {
            let mut state = self.state();
            match &state.session {
                Some(s) if s.generation == generation => state.session.take(),
                _ => None,
            }
        };
        let Some(session) = session else {
            return false;
        };
        self.status.send_replace(AsrStatus::Idle);
        if abort_local && session.local_started {
            if let Some(local) = &self.backends.local {
                local.abort();
            }
        }
        if session.mic_acquired {
            if let Some(recorder) = &self.backends.recorder {
                recorder.release();
            }
        }
        debug!(
            generation,
            fallback = session.fallback_attempted,
            "recording session closed"
        );
        true
    }

    fn record(&self, error: &VoiceError, generation: u64) {
        let mut context = ErrorContext::new();
        context.insert("session".into(), serde_json::json!(generation));
        self.errors.record(&error.to_raw(), context);
    }

    async fn report(&self, error: &VoiceError, generation: u64) {
        let mut context = ErrorContext::new();
        context.insert("session".into(), serde_json::json!(generation));
        self.errors.report(&error.to_raw(), context).await;
    }
}

/// Races a local recognizer against remote transcription. Cheap to clone; clones share one
/// session slot.
#[derive(Clone)]
pub struct HybridAsr {
    inner: Arc<AsrInner>,
}

impl HybridAsr {
    pub fn new(backends: AsrBackends, errors: Arc<ErrorEngine>, settings: AsrSettings) -> Self {
        info!(
            local = backends.local_usable(),
            remote = backends.remote_usable(),
            "🎤 hybrid ASR ready"
        );
        let (status, _) = watch::channel(AsrStatus::Idle);
        Self {
            inner: Arc::new(AsrInner {
                backends,
                errors,
                settings,
                state: Mutex::new(AsrState::default()),
                status,
            }),
        }
    }

    /// True when at least one recognition path can run.
    pub fn is_available(&self) -> bool {
        self.inner.backends.local_usable() || self.inner.backends.remote_usable()
    }

    pub fn status(&self) -> AsrStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AsrStatus> {
        self.inner.status.subscribe()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.state().session.is_some()
    }

    /// Open a session: start the local recognizer and the microphone.
    pub async fn start_recording(&self) -> VoiceResult<()> {
        let inner = &self.inner;
        // Busy recognizers may report themselves unavailable, so the session check comes first.
        let opened = {
            let mut state = inner.state();
            if state.session.is_some() {
                return Err(VoiceError::AlreadyRecording);
            }
            let local_usable = inner.backends.local_usable();
            let remote_usable = inner.backends.remote_usable();
            if local_usable || remote_usable {
                state.generation += 1;
                let generation = state.generation;
                let (sink, events) = RecognizerSink::new(generation);
                let started_at = Instant::now();
                state.session = Some(RecordingSession {
                    generation,
                    started_at,
                    local_started: false,
                    mic_acquired: false,
                    stopping: false,
                    fallback_attempted: false,
                    events: Some(events),
                });
                Some((generation, sink, started_at, local_usable, remote_usable))
            } else {
                None
            }
        };
        let Some((generation, sink, started_at, local_usable, remote_usable)) = opened else {
            let err = VoiceError::NoAsrAvailable;
            inner.report(&err, 0).await;
            return Err(err);
        };
        inner.status.send_replace(AsrStatus::Recording);

        let mut local_started = false;
        if let (true, Some(local)) = (local_usable, &inner.backends.local) {
            match local.start(sink).await {
                Ok(()) => local_started = true,
                Err(e) => {
                    warn!(error = %e, "local recognizer failed to start");
                    inner.record(&e, generation);
                }
            }
        }

        let mut mic_acquired = false;
        let mut mic_error = None;
        if let (true, Some(recorder)) = (remote_usable, &inner.backends.recorder) {
            match recorder.start().await {
                Ok(()) => mic_acquired = true,
                Err(e) => {
                    warn!(error = %e, "microphone capture failed to start");
                    inner.report(&e, generation).await;
                    mic_error = Some(e);
                }
            }
        }

        // Commit what started, unless the session was cancelled meanwhile.
        let committed = {
            let mut state = inner.state();
            match state.session.as_mut() {
                Some(s) if s.generation == generation => {
                    s.local_started = local_started;
                    s.mic_acquired = mic_acquired;
                    true
                }
                _ => false,
            }
        };
        if !committed {
            if local_started {
                if let Some(local) = &inner.backends.local {
                    local.abort();
                }
            }
            if mic_acquired {
                if let Some(recorder) = &inner.backends.recorder {
                    recorder.release();
                }
            }
            return Err(VoiceError::Cancelled);
        }

        if !local_started && !mic_acquired {
            inner.finish(generation, false);
            return Err(mic_error.unwrap_or(VoiceError::NoAsrAvailable));
        }

        self.spawn_watchdog(generation, started_at + inner.settings.hard_timeout);
        info!(generation, local = local_started, mic = mic_acquired, "recording started");
        Ok(())
    }

    /// Close the session and wait for the first transcript.
    pub async fn stop_recording(&self) -> VoiceResult<Transcript> {
        let inner = &self.inner;
        let stopped_at = Instant::now();
        let (generation, started_at, events, local_started, mic_acquired) = {
            let mut state = inner.state();
            let Some(session) = state.session.as_mut().filter(|s| !s.stopping) else {
                return Err(VoiceError::NoActiveSession);
            };
            session.stopping = true;
            (
                session.generation,
                session.started_at,
                session.events.take(),
                session.local_started,
                session.mic_acquired,
            )
        };
        inner.status.send_replace(AsrStatus::Resolving);

        let deadline = started_at + inner.settings.hard_timeout;
        let resolved = tokio::time::timeout_at(
            deadline,
            self.resolve(generation, started_at, events, local_started, mic_acquired),
        )
        .await;

        let (result, abort_local) = match resolved {
            Ok(Ok(text_and_source)) => {
                let abort = text_and_source.1 == TranscriptSource::Remote;
                (Ok(text_and_source), abort)
            }
            Ok(Err(e)) => (Err(e), true),
            Err(_) => (Err(VoiceError::RecordingTimeout), true),
        };

        if !inner.finish(generation, abort_local) {
            return Err(VoiceError::Cancelled);
        }

        match result {
            Ok((text, source)) => {
                let latency = stopped_at.elapsed();
                info!(
                    source = ?source,
                    latency_ms = latency.as_millis() as u64,
                    "transcript ready"
                );
                Ok(Transcript {
                    text,
                    source,
                    latency,
                })
            }
            Err(e) => {
                inner.report(&e, generation).await;
                Err(e)
            }
        }
    }

    /// Abandon the active session without transcribing.
    pub fn cancel_recording(&self) -> VoiceResult<()> {
        let generation = self
            .inner
            .state()
            .session
            .as_ref()
            .map(|s| s.generation)
            .ok_or(VoiceError::NoActiveSession)?;
        self.inner.finish(generation, true);
        info!(generation, "recording cancelled");
        Ok(())
    }

    async fn resolve(
        &self,
        generation: u64,
        started_at: Instant,
        events: Option<mpsc::UnboundedReceiver<RecognizerEvent>>,
        local_started: bool,
        mic_acquired: bool,
    ) -> VoiceResult<(String, TranscriptSource)> {
        let inner = &self.inner;

        if local_started {
            if let Some(local) = &inner.backends.local {
                local.stop().await;
            }
        }
        // Stop capture now so the recording ends where the user stopped.
        let captured = match (mic_acquired, &inner.backends.recorder) {
            (true, Some(recorder)) => Some(recorder.stop().await),
            _ => None,
        };

        let mut local_failure = None;
        if let (true, Some(mut events)) = (local_started, events) {
            let local_deadline = started_at + inner.settings.local_timeout;
            let failure = match tokio::time::timeout_at(local_deadline, events.recv()).await {
                Ok(Some(RecognizerEvent::Result(text))) if !text.trim().is_empty() => {
                    return Ok((text.trim().to_string(), TranscriptSource::Local));
                }
                Ok(Some(RecognizerEvent::Result(_))) => {
                    VoiceError::Recognition("no speech recognized".to_string())
                }
                Ok(Some(RecognizerEvent::Error(message))) => VoiceError::Recognition(message),
                Ok(None) => VoiceError::Recognition("recognizer ended without a result".to_string()),
                Err(_) => VoiceError::Recognition("local recognizer timed out".to_string()),
            };
            warn!(generation, error = %failure, "local recognition failed, trying remote");
            inner.record(&failure, generation);
            local_failure = Some(failure);
        }

        if !inner.is_current(generation) {
            return Err(VoiceError::Cancelled);
        }
        let (Some(captured), Some(remote)) = (captured, &inner.backends.remote) else {
            return Err(local_failure.unwrap_or(VoiceError::NoAsrAvailable));
        };
        let audio = captured?;
        if let Some(session) = inner.state().session.as_mut() {
            session.fallback_attempted = true;
        }
        debug!(generation, bytes = audio.len(), "sending audio to remote transcription");
        let text = remote.transcribe(audio).await?;
        Ok((text, TranscriptSource::Remote))
    }

    fn spawn_watchdog(&self, generation: u64, deadline: Instant) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(generation, "no async runtime, recording has no watchdog");
            return;
        };
        let inner: Weak<AsrInner> = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(inner) = inner.upgrade() else { return };
            // A stop in progress enforces the same deadline itself.
            let idle_session = inner
                .state()
                .session
                .as_ref()
                .is_some_and(|s| s.generation == generation && !s.stopping);
            if idle_session && inner.finish(generation, true) {
                warn!(generation, "recording expired without stop");
                inner.report(&VoiceError::RecordingTimeout, generation).await;
            }
        });
    }
}
