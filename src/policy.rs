//! Gate policies deciding whether new actions may proceed.

use crate::config::BreakerConfig;
use crate::error::Rejection;
use crate::state::StateSnapshot;

/// A policy that evaluates the cached breaker metrics.
pub trait BreakerPolicy: Send + Sync + 'static {
    /// Returns the rejection reason if `snapshot` breaches the policy.
    fn evaluate(&self, snapshot: &StateSnapshot) -> Result<(), Rejection>;
}

/// Default policy: fixed limits on concurrency, error rate and performance
/// loss, checked in that order.
///
/// Limits are exclusive. A metric exactly at its limit still accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    max_concurrency: i64,
    max_error_rate: i64,
    max_performance_loss: i64,
}

impl ThresholdPolicy {
    /// Creates a new threshold policy.
    pub fn new(max_concurrency: u32, max_error_rate: u32, max_performance_loss: u32) -> Self {
        Self {
            max_concurrency: i64::from(max_concurrency),
            max_error_rate: i64::from(max_error_rate),
            max_performance_loss: i64::from(max_performance_loss),
        }
    }

    /// Creates a threshold policy from the limits in `config`.
    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(
            config.max_concurrency,
            config.max_error_rate,
            config.max_performance_loss,
        )
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::from_config(&BreakerConfig::default())
    }
}

impl BreakerPolicy for ThresholdPolicy {
    fn evaluate(&self, snapshot: &StateSnapshot) -> Result<(), Rejection> {
        if snapshot.concurrency > self.max_concurrency {
            return Err(Rejection::ConcurrencyLimitExceeded);
        }

        if snapshot.error_rate > self.max_error_rate {
            return Err(Rejection::ErrorRateExceeded);
        }

        if snapshot.performance_loss > self.max_performance_loss {
            return Err(Rejection::PerformanceLossExceeded);
        }

        Ok(())
    }
}
