//! Breaker state published by the refresh loop.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Phase of the breaker as last observed by its refresh loop.
///
/// This is derived bookkeeping for observers. Gating itself only ever looks at
/// the cached [`StateSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The window has not filled up yet; nothing is rejected.
    WarmingUp = 0,

    /// The last refresh found every metric within its limit.
    Accepting = 1,

    /// The last refresh found a breached limit and recomputation is paused.
    Breaking = 2,
}

impl State {
    /// Lowercase label for logs and metric sinks.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::WarmingUp => "warming-up",
            State::Accepting => "accepting",
            State::Breaking => "breaking",
        }
    }
}

impl From<u8> for State {
    fn from(value: u8) -> Self {
        match value {
            1 => State::Accepting,
            2 => State::Breaking,
            _ => State::WarmingUp,
        }
    }
}

/// Holds the current [`State`] and when it was entered.
pub(crate) struct StateManager {
    state: AtomicU8,
    last_transition: parking_lot::Mutex<Instant>,
}

impl StateManager {
    /// Creates a new state manager in the warm-up phase.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(State::WarmingUp as u8),
            last_transition: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Gets the current state.
    pub fn current(&self) -> State {
        State::from(self.state.load(Ordering::Acquire))
    }

    /// Duration since the last state transition.
    pub fn time_in_state(&self) -> Duration {
        self.last_transition.lock().elapsed()
    }

    /// Moves to `to`, returning the previous state if it changed.
    pub fn transition_to(&self, to: State) -> Option<State> {
        let previous = State::from(self.state.swap(to as u8, Ordering::AcqRel));
        if previous == to {
            return None;
        }

        *self.last_transition.lock() = Instant::now();
        Some(previous)
    }
}

/// Metrics the gate is evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    /// In-flight actions of the current sample.
    pub concurrency: i64,

    /// Failed actions across the window, in percent.
    pub error_rate: i64,

    /// Latency degradation of the current sample against history, in percent.
    pub performance_loss: i64,
}

/// Single-writer, many-reader storage for the cached [`StateSnapshot`].
///
/// Fields are stored independently; a reader racing the writer may observe a
/// mix of two refreshes, which the gate tolerates.
#[derive(Debug, Default)]
pub(crate) struct SnapshotCell {
    concurrency: AtomicI64,
    error_rate: AtomicI64,
    performance_loss: AtomicI64,
}

impl SnapshotCell {
    pub fn load(&self) -> StateSnapshot {
        StateSnapshot {
            concurrency: self.concurrency.load(Ordering::Relaxed),
            error_rate: self.error_rate.load(Ordering::Relaxed),
            performance_loss: self.performance_loss.load(Ordering::Relaxed),
        }
    }

    pub fn store(&self, snapshot: StateSnapshot) {
        self.concurrency.store(snapshot.concurrency, Ordering::Relaxed);
        self.error_rate.store(snapshot.error_rate, Ordering::Relaxed);
        self.performance_loss.store(snapshot.performance_loss, Ordering::Relaxed);
    }
}
