//! Error types for the circuit breaker.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Result type for circuit breaker operations.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// The gate check that refused an action.
///
/// Checked in declaration order, so a snapshot breaching several limits at
/// once always reports the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// More actions were in flight than `max_concurrency` allows.
    ConcurrencyLimitExceeded,

    /// The window's error rate exceeded `max_error_rate`.
    ErrorRateExceeded,

    /// Current latency degraded beyond `max_performance_loss`.
    PerformanceLossExceeded,
}

impl Rejection {
    /// Short machine-friendly label, used in logs and metric sinks.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::ConcurrencyLimitExceeded => "concurrency",
            Rejection::ErrorRateExceeded => "error_rate",
            Rejection::PerformanceLossExceeded => "performance_loss",
        }
    }
}

/// Error type for circuit breaker operations.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// No action was supplied.
    NilAction,

    /// The breaker refused the action without running it.
    Rejected(Rejection),

    /// The action ran and failed.
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Returns the gate rejection, if the breaker refused the action.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            BreakerError::Rejected(r) => Some(*r),
            _ => None,
        }
    }

    /// Checks whether the error was produced by the breaker rather than the action.
    pub fn is_breaker_error(&self) -> bool {
        matches!(self, BreakerError::Rejected(_))
    }

    /// Unwraps the action's own error.
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl Display for Rejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::ConcurrencyLimitExceeded => write!(f, "max concurrent actions exceeded"),
            Rejection::ErrorRateExceeded => write!(f, "max error rate exceeded"),
            Rejection::PerformanceLossExceeded => write!(f, "max performance loss exceeded"),
        }
    }
}

impl<E> Display for BreakerError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::NilAction => write!(f, "cannot call nil action"),
            BreakerError::Rejected(r) => write!(f, "Circuit breaker rejected action: {}", r),
            BreakerError::Operation(e) => write!(f, "Operation error: {}", e),
        }
    }
}

impl Error for Rejection {}

impl<E: Error + 'static> Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BreakerError::NilAction => None,
            BreakerError::Rejected(r) => Some(r),
            BreakerError::Operation(e) => Some(e),
        }
    }
}

impl<E> From<Rejection> for BreakerError<E> {
    fn from(rejection: Rejection) -> Self {
        BreakerError::Rejected(rejection)
    }
}
