//! Integration tests for the hybrid recognizer and the TTS queue, driven by scripted engines
//! on a paused clock.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vocalis_core::{CoreConfig, ErrorEngine, ErrorKind, MemorySettings};
use vocalis_voice::{
    AsrBackends, AsrSettings, AsrStatus, AudioRecorder, CapturedAudio, FallbackReason, HybridAsr,
    LocalRecognizer, RecognizerSink, RemoteTranscriber, SpeechAudio, SpeechEngine,
    SpeechOptions, SpeechPriority, SynthesisOutcome, SynthesisTicket, TranscriptSource, TtsQueue,
    TtsSettings, VoiceError, VoiceInfo, VoiceResult,
};

fn error_engine() -> Arc<ErrorEngine> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    ErrorEngine::create(&CoreConfig::default(), Arc::new(MemorySettings::new()))
}

// ---------------------------------------------------------------------------
// Scripted recognition backends
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum OnStop {
    Respond(&'static str),
    Fail(&'static str),
    Silent,
}

struct ScriptedLocal {
    fail_start: bool,
    busy_while_listening: bool,
    on_stop: OnStop,
    sinks: Mutex<Vec<RecognizerSink>>,
    aborts: AtomicUsize,
}

impl ScriptedLocal {
    fn new(on_stop: OnStop) -> Arc<Self> {
        Arc::new(Self {
            fail_start: false,
            busy_while_listening: false,
            on_stop,
            sinks: Mutex::new(Vec::new()),
            aborts: AtomicUsize::new(0),
        })
    }

    fn failing_start() -> Arc<Self> {
        Arc::new(Self {
            fail_start: true,
            busy_while_listening: false,
            on_stop: OnStop::Silent,
            sinks: Mutex::new(Vec::new()),
            aborts: AtomicUsize::new(0),
        })
    }

    /// Reports itself unavailable once it has been started, like a browser engine in use.
    fn busy_while_listening(on_stop: OnStop) -> Arc<Self> {
        Arc::new(Self {
            fail_start: false,
            busy_while_listening: true,
            on_stop,
            sinks: Mutex::new(Vec::new()),
            aborts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LocalRecognizer for ScriptedLocal {
    fn is_available(&self) -> bool {
        !self.busy_while_listening || self.sinks.lock().unwrap().is_empty()
    }

    async fn start(&self, sink: RecognizerSink) -> VoiceResult<()> {
        if self.fail_start {
            return Err(VoiceError::Recognition("engine busy".into()));
        }
        self.sinks.lock().unwrap().push(sink);
        Ok(())
    }

    async fn stop(&self) {
        let sink = self.sinks.lock().unwrap().last().cloned();
        let Some(sink) = sink else { return };
        match &self.on_stop {
            OnStop::Respond(text) => sink.on_result(*text),
            OnStop::Fail(message) => sink.on_error(*message),
            OnStop::Silent => {}
        }
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CountingRecorder {
    fail_start: bool,
    starts: AtomicUsize,
    releases: AtomicUsize,
}

#[async_trait]
impl AudioRecorder for CountingRecorder {
    fn is_available(&self) -> bool {
        true
    }

    async fn start(&self) -> VoiceResult<()> {
        if self.fail_start {
            return Err(VoiceError::Microphone("permission denied".into()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> VoiceResult<CapturedAudio> {
        Ok(CapturedAudio::from_pcm(&[0.1; 160], 16_000))
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

enum RemoteReply {
    Text(&'static str),
    Fail(u16),
    Hang,
}

struct ScriptedRemote {
    reply: RemoteReply,
    calls: AtomicUsize,
}

impl ScriptedRemote {
    fn new(reply: RemoteReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RemoteTranscriber for ScriptedRemote {
    async fn transcribe(&self, audio: CapturedAudio) -> VoiceResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!audio.is_empty());
        match self.reply {
            RemoteReply::Text(text) => Ok(text.to_string()),
            RemoteReply::Fail(status) => Err(VoiceError::SttStatus {
                status,
                body: "transcription backend unavailable".into(),
            }),
            RemoteReply::Hang => futures::future::pending().await,
        }
    }
}

struct Rig {
    asr: HybridAsr,
    errors: Arc<ErrorEngine>,
    local: Arc<ScriptedLocal>,
    recorder: Arc<CountingRecorder>,
    remote: Arc<ScriptedRemote>,
}

fn rig_with(local: Arc<ScriptedLocal>, recorder: CountingRecorder, remote: RemoteReply) -> Rig {
    let errors = error_engine();
    let recorder = Arc::new(recorder);
    let remote = ScriptedRemote::new(remote);
    let backends = AsrBackends {
        local: Some(local.clone()),
        recorder: Some(recorder.clone()),
        remote: Some(remote.clone()),
    };
    Rig {
        asr: HybridAsr::new(backends, errors.clone(), AsrSettings::default()),
        errors,
        local,
        recorder,
        remote,
    }
}

fn rig(on_stop: OnStop, remote: RemoteReply) -> Rig {
    rig_with(ScriptedLocal::new(on_stop), CountingRecorder::default(), remote)
}

// ---------------------------------------------------------------------------
// Hybrid ASR
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn local_result_wins_and_remote_is_never_called() {
    let rig = rig(OnStop::Respond("hello there"), RemoteReply::Text("remote"));
    rig.asr.start_recording().await.unwrap();
    assert_eq!(rig.asr.status(), AsrStatus::Recording);

    let transcript = rig.asr.stop_recording().await.unwrap();
    assert_eq!(transcript.text, "hello there");
    assert_eq!(transcript.source, TranscriptSource::Local);
    assert_eq!(rig.remote.calls.load(Ordering::SeqCst), 0);
    assert_eq!(rig.recorder.releases.load(Ordering::SeqCst), 1);
    assert_eq!(rig.local.aborts.load(Ordering::SeqCst), 0);
    assert_eq!(rig.asr.status(), AsrStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn local_error_falls_back_to_remote_exactly_once() {
    let rig = rig(OnStop::Fail("no-speech"), RemoteReply::Text("from the server"));
    rig.asr.start_recording().await.unwrap();

    let transcript = rig.asr.stop_recording().await.unwrap();
    assert_eq!(transcript.text, "from the server");
    assert_eq!(transcript.source, TranscriptSource::Remote);
    assert_eq!(rig.remote.calls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.recorder.releases.load(Ordering::SeqCst), 1);

    // The local failure is logged but not surfaced.
    assert_eq!(rig.errors.store().metrics().count_for(ErrorKind::AsrError), 1);
    assert!(rig.errors.notifier().visible().is_empty());
}

#[tokio::test(start_paused = true)]
async fn silent_local_recognizer_gets_fifteen_seconds_from_start() {
    let rig = rig(OnStop::Silent, RemoteReply::Text("late but accurate"));
    rig.asr.start_recording().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let transcript = rig.asr.stop_recording().await.unwrap();
    assert_eq!(transcript.source, TranscriptSource::Remote);
    assert!(transcript.latency >= Duration::from_secs(13));
    assert!(transcript.latency < Duration::from_secs(14));
    assert_eq!(rig.remote.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_while_a_session_is_active() {
    let rig = rig(OnStop::Silent, RemoteReply::Hang);
    rig.asr.start_recording().await.unwrap();
    assert_eq!(rig.asr.start_recording().await, Err(VoiceError::AlreadyRecording));
    assert_eq!(rig.asr.start_recording().await, Err(VoiceError::AlreadyRecording));

    rig.asr.cancel_recording().unwrap();
    assert_eq!(rig.asr.cancel_recording(), Err(VoiceError::NoActiveSession));
    assert_eq!(rig.recorder.releases.load(Ordering::SeqCst), 1);
    assert_eq!(rig.local.aborts.load(Ordering::SeqCst), 1);
    assert_eq!(rig.asr.status(), AsrStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn busy_local_recognizer_still_reports_already_recording() {
    let errors = error_engine();
    let local = ScriptedLocal::busy_while_listening(OnStop::Respond("only once"));
    let backends = AsrBackends {
        local: Some(local.clone()),
        ..Default::default()
    };
    let asr = HybridAsr::new(backends, errors.clone(), AsrSettings::default());
    asr.start_recording().await.unwrap();
    assert!(!local.is_available());

    assert_eq!(asr.start_recording().await, Err(VoiceError::AlreadyRecording));
    assert!(errors.notifier().visible().is_empty());
    assert_eq!(errors.store().metrics().total_errors, 0);
    assert_eq!(asr.stop_recording().await.unwrap().text, "only once");
}

#[tokio::test(start_paused = true)]
async fn remote_failure_resolves_the_session_with_a_reported_error() {
    let rig = rig(OnStop::Fail("no-speech"), RemoteReply::Fail(503));
    rig.asr.start_recording().await.unwrap();

    let err = rig.asr.stop_recording().await.unwrap_err();
    assert!(matches!(err, VoiceError::SttStatus { status: 503, .. }));
    assert_eq!(rig.remote.calls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.recorder.releases.load(Ordering::SeqCst), 1);
    assert_eq!(rig.asr.status(), AsrStatus::Idle);
    assert!(!rig.asr.is_recording());

    // The local miss is only recorded; the failed fallback is surfaced.
    let metrics = rig.errors.store().metrics();
    assert_eq!(metrics.count_for(ErrorKind::AsrError), 1);
    assert_eq!(metrics.count_for(ErrorKind::ConnectionError), 1);
    assert_eq!(rig.errors.notifier().visible().len(), 1);

    // The next session starts cleanly.
    rig.asr.start_recording().await.unwrap();
    assert_eq!(rig.recorder.starts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn hard_ceiling_resolves_when_both_paths_hang() {
    let rig = rig(OnStop::Silent, RemoteReply::Hang);
    let started = tokio::time::Instant::now();
    rig.asr.start_recording().await.unwrap();

    let err = rig.asr.stop_recording().await.unwrap_err();
    assert_eq!(err, VoiceError::RecordingTimeout);
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(started.elapsed() < Duration::from_secs(31));
    assert_eq!(rig.remote.calls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.recorder.releases.load(Ordering::SeqCst), 1);
    assert_eq!(rig.asr.status(), AsrStatus::Idle);

    // Exhaustion is surfaced to the user.
    assert_eq!(rig.errors.notifier().visible().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn watchdog_expires_a_session_that_is_never_stopped() {
    let rig = rig(OnStop::Respond("unused"), RemoteReply::Text("unused"));
    let mut status = rig.asr.subscribe_status();
    rig.asr.start_recording().await.unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(*status.borrow_and_update(), AsrStatus::Idle);
    assert!(!rig.asr.is_recording());
    assert_eq!(rig.recorder.releases.load(Ordering::SeqCst), 1);
    assert_eq!(rig.asr.stop_recording().await, Err(VoiceError::NoActiveSession));
    // The expiry is surfaced like a timeout reached through stop.
    assert_eq!(rig.errors.store().list(Some(ErrorKind::AsrError)).len(), 1);
    assert_eq!(rig.errors.notifier().visible().len(), 1);

    // A fresh session still works.
    rig.asr.start_recording().await.unwrap();
    assert_eq!(rig.asr.stop_recording().await.unwrap().text, "unused");
    assert_eq!(rig.recorder.releases.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_callbacks_cannot_resolve_a_new_session() {
    let rig = rig(OnStop::Respond("fresh"), RemoteReply::Text("remote"));
    rig.asr.start_recording().await.unwrap();
    rig.asr.cancel_recording().unwrap();
    let stale = rig.local.sinks.lock().unwrap()[0].clone();

    rig.asr.start_recording().await.unwrap();
    assert!(!stale.is_live());
    stale.on_result("stale");

    let transcript = rig.asr.stop_recording().await.unwrap();
    assert_eq!(transcript.text, "fresh");
    assert_eq!(transcript.source, TranscriptSource::Local);
}

#[tokio::test(start_paused = true)]
async fn microphone_failure_is_reported_but_local_recognition_continues() {
    let rig = rig_with(
        ScriptedLocal::new(OnStop::Respond("typed by voice")),
        CountingRecorder {
            fail_start: true,
            ..Default::default()
        },
        RemoteReply::Text("remote"),
    );
    rig.asr.start_recording().await.unwrap();
    assert_eq!(rig.errors.notifier().visible().len(), 1);

    let transcript = rig.asr.stop_recording().await.unwrap();
    assert_eq!(transcript.source, TranscriptSource::Local);
    // Never acquired, never released.
    assert_eq!(rig.recorder.releases.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn start_fails_when_neither_path_starts() {
    let rig = rig_with(
        ScriptedLocal::failing_start(),
        CountingRecorder {
            fail_start: true,
            ..Default::default()
        },
        RemoteReply::Text("remote"),
    );
    let err = rig.asr.start_recording().await.unwrap_err();
    assert!(matches!(err, VoiceError::Microphone(_)));
    assert!(!rig.asr.is_recording());
    assert_eq!(rig.asr.status(), AsrStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn no_backends_means_no_asr() {
    let errors = error_engine();
    let asr = HybridAsr::new(AsrBackends::default(), errors.clone(), AsrSettings::default());
    assert!(!asr.is_available());
    assert_eq!(asr.start_recording().await, Err(VoiceError::NoAsrAvailable));
    assert_eq!(asr.stop_recording().await, Err(VoiceError::NoActiveSession));
    assert_eq!(errors.notifier().visible().len(), 1);
}

// ---------------------------------------------------------------------------
// TTS queue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScriptedSpeech {
    unavailable: bool,
    delay: Duration,
    always_fail: HashSet<&'static str>,
    fail_first: AtomicUsize,
    spoken: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

#[async_trait]
impl SpeechEngine for ScriptedSpeech {
    fn is_available(&self) -> bool {
        !self.unavailable
    }

    async fn speak(&self, text: &str, _options: &SpeechOptions) -> VoiceResult<SpeechAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let fail_now = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail_now || self.always_fail.contains(text) {
            return Err(VoiceError::Tts("engine error".into()));
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(SpeechAudio::new(text.as_bytes().to_vec(), "audio/mpeg"))
    }

    fn stop(&self) {}

    fn pause(&self) {}

    fn resume(&self) {}

    async fn voices(&self) -> VoiceResult<Vec<VoiceInfo>> {
        Ok(vec![VoiceInfo {
            id: "test".into(),
            name: "Test".into(),
            language: Some("en".into()),
        }])
    }
}

fn queue_with(engine: Arc<ScriptedSpeech>) -> (TtsQueue, Arc<ErrorEngine>) {
    let errors = error_engine();
    let queue = TtsQueue::new(Some(engine), errors.clone(), TtsSettings::default());
    (queue, errors)
}

#[tokio::test(start_paused = true)]
async fn drains_high_then_normal_then_low() {
    let engine = Arc::new(ScriptedSpeech::default());
    let (queue, _) = queue_with(engine.clone());

    let low = queue.enqueue("low", SpeechOptions::default(), SpeechPriority::Low);
    let high = queue.enqueue("high", SpeechOptions::default(), SpeechPriority::High);
    let normal = queue.enqueue("normal", SpeechOptions::default(), SpeechPriority::Normal);

    assert!(low.await.is_spoken());
    assert!(high.await.is_spoken());
    assert!(normal.await.is_spoken());
    assert_eq!(*engine.spoken.lock().unwrap(), vec!["high", "normal", "low"]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_request_falls_back_once_and_queue_moves_on() {
    let engine = Arc::new(ScriptedSpeech {
        always_fail: HashSet::from(["broken"]),
        ..Default::default()
    });
    let (queue, errors) = queue_with(engine.clone());

    let broken = queue.enqueue("broken", SpeechOptions::default(), SpeechPriority::Normal);
    let fine = queue.enqueue("fine", SpeechOptions::default(), SpeechPriority::Normal);

    assert_eq!(
        broken.await,
        SynthesisOutcome::TextOnly {
            text: "broken".into(),
            reason: FallbackReason::RetriesExhausted,
        }
    );
    match fine.await {
        SynthesisOutcome::Spoken { attempts, .. } => assert_eq!(attempts, 1),
        other => panic!("expected speech, got {other:?}"),
    }

    // One first attempt plus two retries.
    assert_eq!(engine.calls.load(Ordering::SeqCst), 4);
    let stats = queue.stats();
    assert_eq!((stats.failures, stats.fallbacks, stats.successes), (3, 1, 1));
    assert_eq!(errors.store().metrics().count_for(ErrorKind::TtsError), 3);
    assert_eq!(errors.notifier().visible().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn retries_back_off_exponentially() {
    let engine = Arc::new(ScriptedSpeech {
        fail_first: AtomicUsize::new(2),
        ..Default::default()
    });
    let (queue, _) = queue_with(engine.clone());
    let started = tokio::time::Instant::now();

    let outcome = queue
        .synthesize("eventually", SpeechOptions::default(), SpeechPriority::High)
        .await;
    match outcome {
        SynthesisOutcome::Spoken { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected speech, got {other:?}"),
    }
    // 500 ms + 1000 ms of backoff.
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert!(started.elapsed() < Duration::from_millis(1600));
    assert!(queue.cached_audio("eventually").is_some());
}

#[tokio::test(start_paused = true)]
async fn disabled_or_missing_engine_falls_back_immediately() {
    let engine = Arc::new(ScriptedSpeech::default());
    let (queue, _) = queue_with(engine.clone());
    queue.set_enabled(false);
    let outcome = queue
        .synthesize("quiet", SpeechOptions::default(), SpeechPriority::High)
        .await;
    assert_eq!(outcome.fallback_reason(), Some(FallbackReason::Unavailable));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert_eq!(queue.pending(), 0);

    let unavailable = Arc::new(ScriptedSpeech {
        unavailable: true,
        ..Default::default()
    });
    let (queue, _) = queue_with(unavailable);
    assert!(!queue.is_available());
    let outcome = queue
        .synthesize("quiet", SpeechOptions::default(), SpeechPriority::Low)
        .await;
    assert_eq!(outcome.fallback_reason(), Some(FallbackReason::Unavailable));

    let queue = TtsQueue::new(None, error_engine(), TtsSettings::default());
    assert!(queue.voices().await.is_empty());
    let outcome = queue
        .synthesize("nobody home", SpeechOptions::default(), SpeechPriority::Normal)
        .await;
    assert_eq!(outcome.fallback_reason(), Some(FallbackReason::Unavailable));
}

#[tokio::test(start_paused = true)]
async fn clear_cancels_waiting_requests_but_not_the_one_in_flight() {
    let engine = Arc::new(ScriptedSpeech {
        delay: Duration::from_secs(1),
        ..Default::default()
    });
    let (queue, _) = queue_with(engine.clone());

    let first = queue.enqueue("first", SpeechOptions::default(), SpeechPriority::Normal);
    let second = queue.enqueue("second", SpeechOptions::default(), SpeechPriority::Normal);
    let third = queue.enqueue("third", SpeechOptions::default(), SpeechPriority::Low);
    tokio::task::yield_now().await;
    assert!(queue.is_processing());
    assert_eq!(queue.pending(), 2);

    assert_eq!(queue.clear(), 2);
    assert_eq!(second.await.fallback_reason(), Some(FallbackReason::Cancelled));
    assert_eq!(third.await.fallback_reason(), Some(FallbackReason::Cancelled));
    assert!(first.await.is_spoken());
    assert_eq!(*engine.spoken.lock().unwrap(), vec!["first"]);
    assert_eq!(queue.voices().await.len(), 1);
}

/// Speaks until told to stop, then reports the cut-off as a failure.
#[derive(Default)]
struct InterruptibleSpeech {
    calls: AtomicUsize,
    stopped: tokio::sync::Notify,
}

#[async_trait]
impl SpeechEngine for InterruptibleSpeech {
    fn is_available(&self) -> bool {
        true
    }

    async fn speak(&self, _text: &str, _options: &SpeechOptions) -> VoiceResult<SpeechAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.stopped.notified().await;
        Err(VoiceError::Tts("playback interrupted".into()))
    }

    fn stop(&self) {
        self.stopped.notify_one();
    }

    fn pause(&self) {}

    fn resume(&self) {}

    async fn voices(&self) -> VoiceResult<Vec<VoiceInfo>> {
        Ok(Vec::new())
    }
}

type Speaking = (TtsQueue, Arc<InterruptibleSpeech>, Arc<ErrorEngine>, SynthesisTicket);

/// A queue whose engine is mid-way through "cut off".
async fn speaking_queue() -> Speaking {
    let engine = Arc::new(InterruptibleSpeech::default());
    let errors = error_engine();
    let queue = TtsQueue::new(Some(engine.clone()), errors.clone(), TtsSettings::default());
    let ticket = queue.enqueue("cut off", SpeechOptions::default(), SpeechPriority::Normal);
    while engine.calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    (queue, engine, errors, ticket)
}

#[tokio::test(start_paused = true)]
async fn disabling_mid_utterance_delivers_text_instead_of_retrying() {
    let (queue, engine, errors, ticket) = speaking_queue().await;
    let waiting = queue.enqueue("next", SpeechOptions::default(), SpeechPriority::Low);

    queue.set_enabled(false);
    assert_eq!(
        ticket.await,
        SynthesisOutcome::TextOnly {
            text: "cut off".into(),
            reason: FallbackReason::Unavailable,
        }
    );
    assert_eq!(waiting.await.fallback_reason(), Some(FallbackReason::Unavailable));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    assert!(!queue.is_processing());
    assert!(errors.notifier().visible().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stopping_mid_utterance_cancels_it() {
    let (queue, engine, errors, ticket) = speaking_queue().await;

    queue.stop();
    assert_eq!(ticket.await.fallback_reason(), Some(FallbackReason::Cancelled));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    assert_eq!(queue.stats().fallbacks, 0);
    assert_eq!(errors.store().metrics().total_errors, 0);
}
