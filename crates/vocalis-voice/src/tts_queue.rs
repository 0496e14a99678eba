//! **TTS queue**: priority-ordered speech synthesis with retry and text fallback.
//!
//! Queue layout is three buckets, high → normal → low, each FIFO:
//! - a new high request goes after the highs already waiting;
//! - a new normal request goes before the first low;
//! - a new low request goes last;
//! - a failed request is retried from the head of its own bucket, not before its backoff
//!   (`retry_base * 2^(n-1)`) has elapsed.
//!
//! One drain task speaks one request at a time. A request that fails `max_retries + 1` times
//! resolves as text-only and the queue moves on.

use crate::audio_cache::AudioCache;
use crate::config::TtsSettings;
use crate::error::VoiceError;
use crate::synthesis::{SpeechAudio, SpeechEngine, SpeechOptions, VoiceInfo};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vocalis_core::{ErrorContext, ErrorEngine};

const EMA_ALPHA: f64 = 0.2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechPriority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// TTS disabled or no usable engine.
    Unavailable,
    RetriesExhausted,
    /// Removed by `clear`/`stop` before it was spoken.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    Spoken { audio: SpeechAudio, attempts: u32 },
    /// Show `text` instead of speaking it.
    TextOnly { text: String, reason: FallbackReason },
}

impl SynthesisOutcome {
    pub fn is_spoken(&self) -> bool {
        matches!(self, SynthesisOutcome::Spoken { .. })
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            SynthesisOutcome::TextOnly { reason, .. } => Some(*reason),
            SynthesisOutcome::Spoken { .. } => None,
        }
    }
}

/// Observability counters. Averages are exponential moving averages (α = 0.2).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub fallbacks: u64,
    pub avg_response_ms: f64,
    pub success_rate: f64,
}

impl Default for TtsStats {
    fn default() -> Self {
        Self {
            attempts: 0,
            successes: 0,
            failures: 0,
            fallbacks: 0,
            avg_response_ms: 0.0,
            success_rate: 1.0,
        }
    }
}

impl TtsStats {
    fn observe(&mut self, elapsed: Duration, success: bool) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.avg_response_ms = if self.attempts == 0 {
            ms
        } else {
            EMA_ALPHA * ms + (1.0 - EMA_ALPHA) * self.avg_response_ms
        };
        let hit = if success { 1.0 } else { 0.0 };
        self.success_rate = EMA_ALPHA * hit + (1.0 - EMA_ALPHA) * self.success_rate;
        self.attempts += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
    }
}

/// Resolves with the outcome of one `enqueue` call.
pub struct SynthesisTicket {
    text: String,
    rx: oneshot::Receiver<SynthesisOutcome>,
}

impl Future for SynthesisTicket {
    type Output = SynthesisOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Queue dropped with the request still in it.
            Poll::Ready(Err(_)) => Poll::Ready(SynthesisOutcome::TextOnly {
                text: self.text.clone(),
                reason: FallbackReason::Cancelled,
            }),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct SynthesisRequest {
    text: String,
    options: SpeechOptions,
    priority: SpeechPriority,
    enqueued_at: Instant,
    retry_count: u32,
    not_before: Option<Instant>,
    reply: oneshot::Sender<SynthesisOutcome>,
}

impl SynthesisRequest {
    fn resolve(self, outcome: SynthesisOutcome) {
        let _ = self.reply.send(outcome);
    }

    fn fall_back(self, reason: FallbackReason) {
        let text = self.text.clone();
        self.resolve(SynthesisOutcome::TextOnly { text, reason });
    }
}

/// Pending requests, sorted high → normal → low.
#[derive(Default)]
struct RequestQueue {
    items: VecDeque<SynthesisRequest>,
}

impl RequestQueue {
    /// Index of the first item of `priority` or lower.
    fn bucket_start(&self, priority: SpeechPriority) -> usize {
        self.items
            .iter()
            .position(|r| r.priority <= priority)
            .unwrap_or(self.items.len())
    }

    /// Index just past the last item of `priority` or higher.
    fn bucket_end(&self, priority: SpeechPriority) -> usize {
        self.items
            .iter()
            .position(|r| r.priority < priority)
            .unwrap_or(self.items.len())
    }

    fn push(&mut self, request: SynthesisRequest) {
        let at = self.bucket_end(request.priority);
        self.items.insert(at, request);
    }

    fn push_retry(&mut self, request: SynthesisRequest) {
        let at = self.bucket_start(request.priority);
        self.items.insert(at, request);
    }
}

struct QueueState {
    queue: RequestQueue,
    processing: bool,
    enabled: bool,
    /// Bumped whenever the engine is told to stop, so the request in flight is not retried.
    interrupts: u64,
    stats: TtsStats,
    cache: AudioCache,
}

struct QueueInner {
    engine: Option<Arc<dyn SpeechEngine>>,
    errors: Arc<ErrorEngine>,
    settings: TtsSettings,
    state: Mutex<QueueState>,
}

impl QueueInner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn usable(&self, state: &QueueState) -> bool {
        state.enabled && self.engine.as_ref().is_some_and(|e| e.is_available())
    }
}

/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct TtsQueue {
    inner: Arc<QueueInner>,
}

impl TtsQueue {
    pub fn new(
        engine: Option<Arc<dyn SpeechEngine>>,
        errors: Arc<ErrorEngine>,
        settings: TtsSettings,
    ) -> Self {
        info!(
            engine = engine.is_some(),
            enabled = settings.enabled,
            max_retries = settings.max_retries,
            "🔊 TTS queue ready"
        );
        Self {
            inner: Arc::new(QueueInner {
                engine,
                errors,
                settings,
                state: Mutex::new(QueueState {
                    queue: RequestQueue::default(),
                    processing: false,
                    enabled: settings.enabled,
                    interrupts: 0,
                    stats: TtsStats::default(),
                    cache: AudioCache::new(settings.cache_limit_bytes, settings.cleanup_interval),
                }),
            }),
        }
    }

    /// Speak `text` and wait for the outcome.
    pub async fn synthesize(
        &self,
        text: impl Into<String>,
        options: SpeechOptions,
        priority: SpeechPriority,
    ) -> SynthesisOutcome {
        self.enqueue(text, options, priority).await
    }

    /// Queue `text` without waiting. The request is in the queue when this returns.
    pub fn enqueue(
        &self,
        text: impl Into<String>,
        options: SpeechOptions,
        priority: SpeechPriority,
    ) -> SynthesisTicket {
        let text = text.into();
        let (reply, rx) = oneshot::channel();
        let ticket = SynthesisTicket {
            text: text.clone(),
            rx,
        };
        let request = SynthesisRequest {
            text,
            options,
            priority,
            enqueued_at: Instant::now(),
            retry_count: 0,
            not_before: None,
            reply,
        };

        let mut state = self.inner.state();
        if !self.inner.usable(&state) {
            debug!("TTS unavailable, delivering as text");
            drop(state);
            request.fall_back(FallbackReason::Unavailable);
            return ticket;
        }
        state.queue.push(request);
        if !state.processing {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    state.processing = true;
                    handle.spawn(drain(self.inner.clone()));
                }
                Err(_) => warn!("no async runtime, TTS request waits for the next enqueue"),
            }
        }
        ticket
    }

    /// Drop every pending request; each resolves as `TextOnly { Cancelled }`.
    pub fn clear(&self) -> usize {
        let pending: Vec<SynthesisRequest> = self.inner.state().queue.items.drain(..).collect();
        let count = pending.len();
        for request in pending {
            request.fall_back(FallbackReason::Cancelled);
        }
        if count > 0 {
            debug!(count, "cleared pending TTS requests");
        }
        count
    }

    /// Silence the engine and drop everything queued.
    pub fn stop(&self) {
        self.inner.state().interrupts += 1;
        self.clear();
        if let Some(engine) = &self.inner.engine {
            engine.stop();
        }
    }

    pub fn pause(&self) {
        if let Some(engine) = &self.inner.engine {
            engine.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(engine) = &self.inner.engine {
            engine.resume();
        }
    }

    pub async fn voices(&self) -> Vec<VoiceInfo> {
        let Some(engine) = &self.inner.engine else {
            return Vec::new();
        };
        match engine.voices().await {
            Ok(voices) => voices,
            Err(e) => {
                self.inner.errors.record(&e.to_raw(), ErrorContext::new());
                Vec::new()
            }
        }
    }

    /// Turning TTS off delivers everything still queued as text.
    pub fn set_enabled(&self, enabled: bool) {
        let pending: Vec<SynthesisRequest> = {
            let mut state = self.inner.state();
            state.enabled = enabled;
            if enabled {
                return;
            }
            state.interrupts += 1;
            state.queue.items.drain(..).collect()
        };
        for request in pending {
            request.fall_back(FallbackReason::Unavailable);
        }
        if let Some(engine) = &self.inner.engine {
            engine.stop();
        }
    }

    pub fn is_available(&self) -> bool {
        let state = self.inner.state();
        self.inner.usable(&state)
    }

    pub fn stats(&self) -> TtsStats {
        self.inner.state().stats.clone()
    }

    /// Requests waiting to be spoken, excluding the one in flight.
    pub fn pending(&self) -> usize {
        self.inner.state().queue.items.len()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state().processing
    }

    pub fn cached_audio(&self, text: &str) -> Option<SpeechAudio> {
        self.inner.state().cache.get(text).cloned()
    }
}

enum Next {
    Speak(SynthesisRequest, u64),
    Flush(Vec<SynthesisRequest>),
    Wait(Instant),
    Done,
}

async fn drain(inner: Arc<QueueInner>) {
    let Some(engine) = inner.engine.clone() else {
        inner.state().processing = false;
        return;
    };
    loop {
        let next = {
            let mut state = inner.state();
            let now = Instant::now();
            if !state.enabled {
                state.processing = false;
                Next::Flush(state.queue.items.drain(..).collect())
            } else {
                match state.queue.items.front().map(|r| r.not_before) {
                    Some(Some(at)) if at > now => Next::Wait(at),
                    Some(_) => match state.queue.items.pop_front() {
                        Some(request) => Next::Speak(request, state.interrupts),
                        None => {
                            state.processing = false;
                            Next::Done
                        }
                    },
                    None => {
                        state.processing = false;
                        Next::Done
                    }
                }
            }
        };

        let (mut request, interrupts) = match next {
            Next::Done => return,
            Next::Flush(pending) => {
                for request in pending {
                    request.fall_back(FallbackReason::Unavailable);
                }
                return;
            }
            Next::Wait(at) => {
                tokio::time::sleep_until(at).await;
                continue;
            }
            Next::Speak(request, interrupts) => (request, interrupts),
        };

        let started = Instant::now();
        let result = engine.speak(&request.text, &request.options).await;
        let elapsed = started.elapsed();

        match result {
            Ok(audio) => {
                {
                    let mut state = inner.state();
                    state.stats.observe(elapsed, true);
                    state.cache.insert(&request.text, audio.clone());
                    state.cache.maybe_cleanup();
                }
                debug!(
                    priority = ?request.priority,
                    waited_ms = request.enqueued_at.elapsed().as_millis() as u64,
                    "utterance spoken"
                );
                let attempts = request.retry_count + 1;
                request.resolve(SynthesisOutcome::Spoken { audio, attempts });
            }
            Err(e) => {
                let interrupted = {
                    let mut state = inner.state();
                    state.stats.observe(elapsed, false);
                    (state.interrupts != interrupts).then_some(state.enabled)
                };
                if let Some(enabled) = interrupted {
                    debug!(error = %e, "TTS attempt interrupted, not retrying");
                    request.fall_back(if enabled {
                        FallbackReason::Cancelled
                    } else {
                        FallbackReason::Unavailable
                    });
                    continue;
                }
                let context = attempt_context(&request, &e);
                if request.retry_count < inner.settings.max_retries {
                    request.retry_count += 1;
                    let delay = backoff(inner.settings.retry_base, request.retry_count);
                    warn!(
                        attempt = request.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "TTS attempt failed, retrying"
                    );
                    inner.errors.record(&e.to_raw(), context);
                    request.not_before = Some(Instant::now() + delay);
                    inner.state().queue.push_retry(request);
                } else {
                    warn!(error = %e, "TTS retries exhausted, falling back to text");
                    inner.state().stats.fallbacks += 1;
                    inner.errors.report(&e.to_raw(), context).await;
                    request.fall_back(FallbackReason::RetriesExhausted);
                }
            }
        }
    }
}

/// Delay before retry `n` (1-based).
fn backoff(base: Duration, n: u32) -> Duration {
    base.saturating_mul(1u32 << n.saturating_sub(1).min(16))
}

fn attempt_context(request: &SynthesisRequest, error: &VoiceError) -> ErrorContext {
    let mut context = ErrorContext::new();
    context.insert("attempt".into(), serde_json::json!(request.retry_count + 1));
    context.insert("priority".into(), serde_json::json!(request.priority));
    context.insert("textLength".into(), serde_json::json!(request.text.chars().count()));
    context.insert("error".into(), serde_json::json!(error.to_string()));
    context
}
