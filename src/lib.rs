//! # resilient-http
//!
//! An outbound HTTP runtime that adds connection retry, per-attempt request
//! timeouts, request retry and an adaptive circuit breaker on top of a plain
//! HTTP/1.1 transport.
//!
//! ## The breaker
//!
//! [`Breaker`] does not count consecutive failures. It samples every action
//! it runs and, every `sample_ttl`, derives three numbers from a sliding
//! window of samples:
//!
//! - **concurrency**: actions started in the current sample and not yet done;
//! - **error rate**: failed actions in the window, as a percentage;
//! - **performance loss**: how much slower the current sample is than the
//!   ones before it, as a percentage.
//!
//! When any of them exceeds its limit the breaker rejects new actions for
//! `break_ttl`, then looks again.
//!
//! ```rust
//! use resilient_http::{Breaker, BreakerError};
//! use std::time::Duration;
//!
//! let breaker = Breaker::builder()
//!     .max_concurrency(100)
//!     .max_error_rate(20)
//!     .break_ttl(Duration::from_secs(5))
//!     .build();
//!
//! match breaker.call(|| Ok::<_, std::io::Error>("pong")) {
//!     Ok(reply) => println!("upstream said {}", reply),
//!     Err(BreakerError::Rejected(reason)) => println!("not now: {}", reason),
//!     Err(err) => println!("call failed: {}", err),
//! }
//! ```
//!
//! ## The transport
//!
//! With the `transport` feature (on by default), [`Transport`] runs each
//! request through a breaker as one action, retrying refused connections,
//! timed out attempts and 5xx responses inside it:
//!
//! ```rust,no_run
//! use resilient_http::{is_request_timeout, Client, ClientConfig};
//! use std::time::Duration;
//!
//! # async fn run() {
//! let client = Client::new(ClientConfig {
//!     request_timeout: Duration::from_millis(500),
//!     request_retry: 3,
//!     ..ClientConfig::default()
//! });
//!
//! match client.get("http://localhost:8080/health").await {
//!     Ok(res) => println!("status {}", res.status()),
//!     Err(err) if is_request_timeout(&err) => println!("upstream too slow"),
//!     Err(err) => println!("request failed: {}", err),
//! }
//! # }
//! ```
//!
//! A 5xx response is treated as a failure by the retry loop and the breaker
//! but is returned to the caller as a regular response.
//!
//! ## Features
//!
//! - `transport` - HTTP transport and client over Tokio and Hyper (default)

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod config;
mod error;
mod hook;
mod metrics;
mod policy;
pub mod prelude;
mod sample;
mod state;
mod window;

#[cfg(feature = "transport")]
mod classify;
#[cfg(feature = "transport")]
mod client;
#[cfg(feature = "transport")]
mod dial;
#[cfg(feature = "transport")]
mod task;
#[cfg(feature = "transport")]
mod transmit;
#[cfg(feature = "transport")]
mod transport;

// Re-exports
pub use breaker::Breaker;
pub use config::{
    BreakerBuilder, BreakerConfig, DEFAULT_BREAK_TTL, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_MAX_ERROR_RATE, DEFAULT_MAX_PERFORMANCE_LOSS, DEFAULT_MIN_SAMPLE_VOLUME,
    DEFAULT_SAMPLE_TTL,
};
pub use error::{BreakerError, BreakerResult, Rejection};
pub use hook::HookRegistry;
pub use metrics::{MetricSink, NullMetricSink};
pub use policy::{BreakerPolicy, ThresholdPolicy};
pub use sample::Sample;
pub use state::{State, StateSnapshot};
pub use window::Window;

#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub use self::{
    classify::{
        is_breaker_error, is_connect_refused, is_connect_timeout, is_request_timeout,
        is_status_5xx, ErrorKind, TransportError,
    },
    client::{Client, ClientConfig},
    config::{
        TransportBuilder, TransportConfig, DEFAULT_CONNECT_RETRY, DEFAULT_CONNECT_RETRY_DELAY,
        DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_RETRY, DEFAULT_REQUEST_RETRY_DELAY,
        DEFAULT_REQUEST_TIMEOUT,
    },
    dial::Dialer,
    transmit::{transmit_fn, HttpTransmitter, Transmit, TransmitFn},
    transport::Transport,
};
