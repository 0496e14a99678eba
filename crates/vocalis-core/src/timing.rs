//! Throttling helpers driven by `tokio::time::Instant`, so paused-clock tests control them.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Allows one call per `interval`.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// True (and the window restarts) when at least `interval` has passed since the last
    /// accepted call. The first call is always accepted.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// A [`Throttle`] per key.
#[derive(Debug, Clone)]
pub struct KeyedThrottle {
    interval: Duration,
    last: HashMap<String, Instant>,
}

impl KeyedThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: HashMap::new(),
        }
    }

    pub fn try_acquire(&mut self, key: &str) -> bool {
        let now = Instant::now();
        // Forget keys whose window closed so the map stays small.
        let interval = self.interval;
        self.last
            .retain(|_, at| now.saturating_duration_since(*at) < interval);
        if self.last.contains_key(key) {
            return false;
        }
        self.last.insert(key.to_string(), now);
        true
    }
}
