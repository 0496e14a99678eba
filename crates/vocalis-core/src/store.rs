//! Error & metrics store: a bounded log of classified errors plus lifetime counters.
//!
//! Clearing the log leaves the counters untouched; only [`ErrorStore::reset_metrics`] zeroes them.

use crate::taxonomy::{ClassifiedError, ErrorKind, Severity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 100;

/// Aggregate counters since creation or the last reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_errors: u64,
    pub errors_by_kind: BTreeMap<ErrorKind, u64>,
    pub errors_by_severity: BTreeMap<Severity, u64>,
}

impl Metrics {
    pub fn count_for(&self, kind: ErrorKind) -> u64 {
        self.errors_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

#[derive(Default)]
struct StoreState {
    log: VecDeque<ClassifiedError>,
    metrics: Metrics,
}

pub struct ErrorStore {
    capacity: usize,
    state: Mutex<StoreState>,
}

impl ErrorStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(StoreState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        // Every critical section leaves the state consistent, so a poisoned lock is usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an error and bump the counters, evicting the oldest entry beyond capacity.
    pub fn record(&self, error: ClassifiedError) {
        let mut state = self.state();
        state.metrics.total_errors += 1;
        *state.metrics.errors_by_kind.entry(error.kind()).or_insert(0) += 1;
        *state
            .metrics
            .errors_by_severity
            .entry(error.severity())
            .or_insert(0) += 1;

        state.log.push_back(error);
        while state.log.len() > self.capacity {
            state.log.pop_front();
        }
    }

    /// Logged errors in submission order, optionally only one kind.
    pub fn list(&self, kind: Option<ErrorKind>) -> Vec<ClassifiedError> {
        self.state()
            .log
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind() == k))
            .cloned()
            .collect()
    }

    /// Most recent logged error.
    pub fn last(&self) -> Option<ClassifiedError> {
        self.state().log.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.state().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().log.is_empty()
    }

    /// Remove logged errors (all, or one kind). Metrics are not touched.
    pub fn clear(&self, kind: Option<ErrorKind>) {
        let mut state = self.state();
        match kind {
            Some(k) => state.log.retain(|e| e.kind() != k),
            None => state.log.clear(),
        }
    }

    pub fn metrics(&self) -> Metrics {
        self.state().metrics.clone()
    }

    pub fn reset_metrics(&self) {
        self.state().metrics = Metrics::default();
    }
}

impl Default for ErrorStore {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LOG_CAPACITY)
    }
}
