//! **Recognition contracts**: what the hybrid recognizer needs from the host.
//!
//! - [`LocalRecognizer`]: fast, on-device recognition that reports through a
//!   [`RecognizerSink`].
//! - [`AudioRecorder`]: raw microphone capture for the remote fallback.
//!
//! The remote side lives in [`crate::transcribe`].

use crate::error::VoiceResult;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Something a local recognizer reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    Result(String),
    Error(String),
}

/// Callback handle given to a [`LocalRecognizer`] for one recording session.
///
/// Each sink is tied to the session that created it. Reports made after that session ended
/// go nowhere, so a slow recognizer cannot resolve a later session.
#[derive(Debug, Clone)]
pub struct RecognizerSink {
    generation: u64,
    tx: mpsc::UnboundedSender<RecognizerEvent>,
}

impl RecognizerSink {
    pub(crate) fn new(generation: u64) -> (Self, mpsc::UnboundedReceiver<RecognizerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { generation, tx }, rx)
    }

    /// Final transcript for the session.
    pub fn on_result(&self, text: impl Into<String>) {
        let _ = self.tx.send(RecognizerEvent::Result(text.into()));
    }

    pub fn on_error(&self, message: impl Into<String>) {
        let _ = self.tx.send(RecognizerEvent::Error(message.into()));
    }

    /// Session this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False once the session that created this sink has resolved.
    pub fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// On-device speech recognition (low latency, lower accuracy).
#[async_trait]
pub trait LocalRecognizer: Send + Sync {
    fn is_available(&self) -> bool;

    /// Begin listening. Results and errors arrive through `sink`.
    async fn start(&self, sink: RecognizerSink) -> VoiceResult<()>;

    /// Stop listening and deliver the final result through the sink.
    async fn stop(&self);

    /// Stop without delivering anything.
    fn abort(&self) {}
}

/// Raw microphone capture.
#[async_trait]
pub trait AudioRecorder: Send + Sync {
    fn is_available(&self) -> bool;

    /// Acquire the microphone and begin capturing.
    async fn start(&self) -> VoiceResult<()>;

    /// Stop capturing and hand back everything recorded since `start`.
    async fn stop(&self) -> VoiceResult<CapturedAudio>;

    /// Give the microphone back. Called exactly once per acquired session.
    fn release(&self);
}

/// Encoded audio ready for upload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapturedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl CapturedAudio {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    /// Encode mono f32 PCM as 16-bit WAV.
    pub fn from_pcm(samples: &[f32], sample_rate: u32) -> Self {
        Self::new(pcm_f32_to_wav(samples, sample_rate), "audio/wav", "audio.wav")
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

const WAV_HEADER_LEN: usize = 44;

fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    if samples.is_empty() {
        return Vec::new();
    }
    let data_len = (samples.len() * 2) as u32; // 16-bit = 2 bytes per sample

    let mut buf = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(WAV_HEADER_LEN as u32 - 8 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes());
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let i = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&i.to_le_bytes());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_describes_samples() {
        let audio = CapturedAudio::from_pcm(&[0.0, 1.0, -1.0, 2.0], 16_000);
        assert_eq!(audio.len(), 44 + 8);
        assert_eq!(&audio.bytes[0..4], b"RIFF");
        assert_eq!(&audio.bytes[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes(audio.bytes[24..28].try_into().unwrap()), 16_000);
        assert_eq!(u32::from_le_bytes(audio.bytes[40..44].try_into().unwrap()), 8);
        // Out-of-range samples clamp.
        assert_eq!(i16::from_le_bytes([audio.bytes[50], audio.bytes[51]]), 32767);
        assert_eq!(audio.mime_type, "audio/wav");
    }

    #[test]
    fn no_samples_no_bytes() {
        assert!(CapturedAudio::from_pcm(&[], 16_000).is_empty());
    }

    #[tokio::test]
    async fn sink_dies_with_its_session() {
        let (sink, rx) = RecognizerSink::new(7);
        assert_eq!(sink.generation(), 7);
        assert!(sink.is_live());
        drop(rx);
        assert!(!sink.is_live());
        sink.on_result("late");
    }
}
