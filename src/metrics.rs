//! Metric sinks receiving breaker events.

use std::time::Duration;

use crate::error::Rejection;
use crate::state::{State, StateSnapshot};

/// Trait for metrics sinks that can receive circuit breaker events.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a freshly computed snapshot.
    fn record_snapshot(&self, snapshot: &StateSnapshot);

    /// Records a state transition event.
    fn record_state_transition(&self, from: State, to: State);

    /// Records an action refused by the gate.
    fn record_rejection(&self, rejection: Rejection);

    /// Records a completed action.
    fn record_action(&self, success: bool, duration: Duration);
}

/// A null metrics sink that discards all events.
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_snapshot(&self, _snapshot: &StateSnapshot) {}
    fn record_state_transition(&self, _from: State, _to: State) {}
    fn record_rejection(&self, _rejection: Rejection) {}
    fn record_action(&self, _success: bool, _duration: Duration) {}
}
