//! Count-based sliding window of samples and the metrics computed over it.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::sample::Sample;

/// A fixed-capacity sequence of [`Sample`]s, newest last.
///
/// The window slides by count, not by time: each [`cycle`](Window::cycle)
/// appends one sample and drops the oldest once capacity is exceeded. Time
/// only enters through the cadence at which the breaker cycles it.
#[derive(Debug)]
pub struct Window {
    samples: VecDeque<Arc<Sample>>,
    capacity: usize,
}

impl Window {
    /// Creates an empty window retaining at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::new(),
            capacity,
        }
    }

    /// Appends a fresh sample, dropping the oldest past capacity.
    pub fn cycle(&mut self) {
        self.samples.push_back(Arc::new(Sample::new()));

        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// The sample new actions are recorded against.
    pub fn current(&self) -> Option<Arc<Sample>> {
        self.samples.back().cloned()
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the window holds no samples yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of retained samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the window has filled up and its metrics are meaningful.
    pub fn is_warm(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &Arc<Sample>> {
        self.samples.iter()
    }

    /// In-flight actions of the current sample.
    pub fn concurrency(&self) -> i64 {
        self.samples.back().map_or(0, |s| s.in_flight())
    }

    /// Percentage of failed actions across every retained sample.
    ///
    /// Returns `0` when the window saw no actions at all.
    pub fn error_rate(&self) -> i64 {
        let (actions, failures) = self
            .samples
            .iter()
            .fold((0u64, 0u64), |(actions, failures), s| {
                (actions + s.total_actions(), failures + s.total_failures())
            });

        if actions == 0 {
            return 0;
        }

        (failures.saturating_mul(100) / actions) as i64
    }

    /// Percentage by which the current sample's mean latency exceeds the mean
    /// latency of the rest of the window.
    ///
    /// Negative when the current sample is faster. `0` when either side has no
    /// latency data.
    pub fn performance_loss(&self) -> i64 {
        let Some(current) = self.samples.back() else {
            return 0;
        };
        let history = self.samples.iter().take(self.samples.len() - 1);

        let hist_avg = mean_latency(history.map(|s| &**s));
        let curr_avg = mean_latency(std::iter::once(&**current));

        if hist_avg == 0 || curr_avg == 0 {
            return 0;
        }

        let loss = (curr_avg * 100 / hist_avg) as i128 - 100;
        loss.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

fn mean_latency<'a>(samples: impl Iterator<Item = &'a Sample>) -> u128 {
    let (sum, count) = samples.fold((0u128, 0u128), |(sum, count), s| {
        let (s_sum, s_count) = s.latency_totals();
        (sum + s_sum, count + s_count)
    });

    if count == 0 {
        return 0;
    }

    sum / count
}
