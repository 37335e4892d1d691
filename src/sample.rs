//! Per-interval action counters.

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One time bucket of breaker activity.
///
/// Counters are atomic so that any number of callers can record into the
/// current sample without coordination. Latencies need a lock for the append.
#[derive(Debug, Default)]
pub struct Sample {
    in_flight: AtomicI64,
    total_actions: AtomicU64,
    total_failures: AtomicU64,
    latencies: Mutex<SmallVec<[Duration; 32]>>,
}

impl Sample {
    /// Creates an empty sample.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of an action and returns the start timestamp.
    pub fn start(&self) -> Instant {
        self.total_actions.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        Instant::now()
    }

    /// Marks a successful completion and returns the end timestamp.
    pub fn success(&self, _start: Instant) -> Instant {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        Instant::now()
    }

    /// Marks a failed completion and returns the end timestamp.
    pub fn failure(&self, _start: Instant) -> Instant {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        Instant::now()
    }

    /// Records the latency of a successful action.
    ///
    /// Failed actions never reach this, so they stay out of latency statistics.
    pub fn record_latency(&self, start: Instant, end: Instant) {
        self.push_latency(end.saturating_duration_since(start));
    }

    pub(crate) fn push_latency(&self, latency: Duration) {
        self.latencies.lock().push(latency);
    }

    /// Number of actions currently running against this sample.
    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of actions started against this sample.
    pub fn total_actions(&self) -> u64 {
        self.total_actions.load(Ordering::Relaxed)
    }

    /// Number of actions that failed against this sample.
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Sum and count of recorded latencies, taken under a single lock.
    pub(crate) fn latency_totals(&self) -> (u128, u128) {
        let latencies = self.latencies.lock();
        let sum = latencies.iter().map(Duration::as_nanos).sum();

        (sum, latencies.len() as u128)
    }
}
