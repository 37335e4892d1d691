//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use resilient_http::prelude::*;
//!
//! let breaker = Breaker::builder().build();
//! let result: BreakerResult<u32, std::io::Error> = breaker.call(|| Ok(42));
//! ```

pub use crate::breaker::Breaker;
pub use crate::config::{BreakerBuilder, BreakerConfig};
pub use crate::error::{BreakerError, BreakerResult, Rejection};
pub use crate::hook::HookRegistry;
pub use crate::metrics::MetricSink;
pub use crate::policy::BreakerPolicy;
pub use crate::state::{State, StateSnapshot};

#[cfg(feature = "transport")]
pub use crate::{
    classify::{
        is_breaker_error, is_connect_refused, is_connect_timeout, is_request_timeout,
        is_status_5xx, ErrorKind, TransportError,
    },
    client::{Client, ClientConfig},
    config::{TransportBuilder, TransportConfig},
    transmit::Transmit,
    transport::Transport,
};
