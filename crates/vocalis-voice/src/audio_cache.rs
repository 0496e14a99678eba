//! Cache of synthesized audio, keyed by utterance text.
//!
//! Cleanup is throttled: [`AudioCache::maybe_cleanup`] does work at most once per interval and
//! then evicts oldest entries until the total is back under the byte limit.

use crate::synthesis::SpeechAudio;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;
use vocalis_core::Throttle;

#[derive(Debug)]
struct CachedAudio {
    text: String,
    audio: SpeechAudio,
}

#[derive(Debug)]
pub struct AudioCache {
    limit_bytes: usize,
    total_bytes: usize,
    // Oldest first.
    entries: VecDeque<CachedAudio>,
    cleanup: Throttle,
}

impl AudioCache {
    pub fn new(limit_bytes: usize, cleanup_interval: Duration) -> Self {
        Self {
            limit_bytes,
            total_bytes: 0,
            entries: VecDeque::new(),
            cleanup: Throttle::new(cleanup_interval),
        }
    }

    /// Store `audio` for `text`, replacing an older copy. Empty audio is not cached.
    pub fn insert(&mut self, text: &str, audio: SpeechAudio) {
        if audio.is_empty() {
            return;
        }
        self.remove(text);
        self.total_bytes += audio.len();
        self.entries.push_back(CachedAudio {
            text: text.to_string(),
            audio,
        });
    }

    pub fn get(&self, text: &str) -> Option<&SpeechAudio> {
        self.entries.iter().find(|e| e.text == text).map(|e| &e.audio)
    }

    fn remove(&mut self, text: &str) {
        if let Some(pos) = self.entries.iter().position(|e| e.text == text) {
            if let Some(old) = self.entries.remove(pos) {
                self.total_bytes -= old.audio.len();
            }
        }
    }

    /// Throttled [`AudioCache::cleanup_now`]. Returns the number of evicted entries.
    pub fn maybe_cleanup(&mut self) -> usize {
        if !self.cleanup.try_acquire() {
            return 0;
        }
        self.cleanup_now()
    }

    /// Evict oldest entries until the total fits the limit.
    pub fn cleanup_now(&mut self) -> usize {
        let mut evicted = 0;
        while self.total_bytes > self.limit_bytes {
            let Some(old) = self.entries.pop_front() else { break };
            self.total_bytes -= old.audio.len();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, total_bytes = self.total_bytes, "evicted cached audio");
        }
        evicted
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
