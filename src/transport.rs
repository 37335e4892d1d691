//! Retrying, timeout-bounded HTTP round trips behind a breaker.

use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use tokio::time::{sleep, timeout};
use tracing::{info, trace, warn};

use crate::breaker::Breaker;
use crate::classify::{ErrorKind, TransportError};
use crate::config::{TransportBuilder, TransportConfig};
use crate::error::BreakerError;
use crate::task::AbortOnDrop;
use crate::transmit::{HttpTransmitter, Transmit};

/// An HTTP transport adding request retry, per-attempt timeouts and an
/// adaptive breaker on top of a [`Transmit`].
///
/// A round trip, including all of its retries, is a single breaker action.
/// Upstream 5xx responses count as failures for both the breaker and the
/// retry loop, yet the last one is handed back to the caller as a normal
/// response once retries run out.
pub struct Transport<T = HttpTransmitter>
where
    T: Transmit,
{
    config: TransportConfig,
    breaker: Breaker,
    transmitter: Arc<T>,
}

impl Transport<HttpTransmitter> {
    /// Creates a new builder for customizing a transport.
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }

    /// Creates a plain HTTP transport from `config`.
    pub fn from_config(config: TransportConfig) -> Self {
        TransportBuilder::from_config(config).build()
    }
}

impl Default for Transport<HttpTransmitter> {
    fn default() -> Self {
        TransportBuilder::new().build()
    }
}

impl<T> Transport<T>
where
    T: Transmit,
{
    /// Assembles a transport from its parts.
    ///
    /// `config` is normalized; its breaker section is informational, the
    /// given `breaker` is used as is.
    pub fn new(config: TransportConfig, breaker: Breaker, transmitter: T) -> Self {
        Self {
            config: config.normalized(),
            breaker,
            transmitter: Arc::new(transmitter),
        }
    }

    /// Creates a transport sending through `transmitter`, with a breaker
    /// built from `config`.
    pub fn with_transmitter(config: TransportConfig, transmitter: T) -> Self {
        TransportBuilder::from_config(config).build_with_transmitter(transmitter)
    }

    /// The normalized configuration in use.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// The breaker guarding this transport.
    pub fn breaker(&self) -> &Breaker {
        &self.breaker
    }

    /// Sends `request`, retrying failed attempts.
    ///
    /// Returns the response of the last attempt, which may carry a 5xx
    /// status. Errors are the breaker's rejection or the last attempt's
    /// failure wrapped with the request method and URL.
    pub async fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        match self.breaker.call_async(|| self.retry(&request)).await {
            Ok(response) => Ok(response),
            Err(BreakerError::Operation(TransportError::Status(response))) => {
                trace!(status = %response.status(), "returning last upstream error response");
                Ok(*response)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn retry(&self, request: &Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let attempts = self.config.request_retry.saturating_add(1);
        let mut attempt = 1;

        loop {
            let outcome = match self.attempt(clone_request(request)).await {
                Ok(response) if response.status().is_server_error() => {
                    Err(TransportError::Status(Box::new(response)))
                }
                outcome => outcome,
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(err) if attempt < attempts => {
                    info!(
                        method = %request.method(),
                        url = %request.uri(),
                        attempt,
                        %err,
                        delay = ?self.config.request_retry_delay,
                        "request attempt failed, retrying"
                    );
                    sleep(self.config.request_retry_delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs one transmission on its own task, bounded by `request_timeout`.
    ///
    /// An attempt that outlives the timeout is aborted and not awaited.
    async fn attempt(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let method = request.method().clone();
        let url = request.uri().to_string();

        let worker = AbortOnDrop::spawn(self.transmitter.transmit(request));

        match timeout(self.config.request_timeout, worker).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(err))) => Err(TransportError::url(method, url, err)),
            Ok(Err(err)) => {
                warn!(%method, %url, %err, "request worker failed");
                Err(TransportError::url(method, url, TransportError::Worker(err)))
            }
            Err(_) => {
                warn!(
                    %method,
                    %url,
                    timeout = ?self.config.request_timeout,
                    "request attempt timed out"
                );
                Err(TransportError::url(
                    method,
                    url,
                    ErrorKind::RequestTimeout.into(),
                ))
            }
        }
    }
}

impl<T> Clone for Transport<T>
where
    T: Transmit,
{
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            breaker: self.breaker.clone(),
            transmitter: Arc::clone(&self.transmitter),
        }
    }
}

fn clone_request(request: &Request<Bytes>) -> Request<Bytes> {
    let mut clone = Request::new(request.body().clone());
    *clone.method_mut() = request.method().clone();
    *clone.uri_mut() = request.uri().clone();
    *clone.version_mut() = request.version();
    *clone.headers_mut() = request.headers().clone();
    clone
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{is_request_timeout, is_status_5xx};
    use crate::hook::HookRegistry;
    use crate::transmit::transmit_fn;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn config(request_retry: u32) -> TransportConfig {
        TransportConfig {
            request_timeout: Duration::from_millis(50),
            request_retry,
            request_retry_delay: Duration::from_millis(1),
            ..TransportConfig::default()
        }
    }

    fn get() -> Request<Bytes> {
        Request::get("http://upstream.test/ping")
            .body(Bytes::new())
            .unwrap()
    }

    fn respond(status: u16) -> Result<Response<Bytes>, TransportError> {
        Ok(Response::builder()
            .status(status)
            .body(Bytes::from_static(b"body"))
            .unwrap())
    }

    /// A transmitter answering with `statuses` in turn, repeating the last.
    fn scripted(statuses: Vec<u16>, calls: Arc<AtomicUsize>) -> impl Transmit {
        transmit_fn(move |_req: Request<Bytes>| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let status = statuses[n.min(statuses.len() - 1)];
            async move { respond(status) }
        })
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport =
            Transport::with_transmitter(config(2), scripted(vec![200], Arc::clone(&calls)));

        let res = transport.round_trip(get()).await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_5xx_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = Transport::with_transmitter(
            config(3),
            scripted(vec![500, 500, 200], Arc::clone(&calls)),
        );

        let res = transport.round_trip(get()).await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_last_5xx_is_returned_as_response() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport =
            Transport::with_transmitter(config(2), scripted(vec![503], Arc::clone(&calls)));

        let res = transport.round_trip(get()).await.unwrap();
        assert_eq!(res.status(), 503);
        assert_eq!(res.body(), &Bytes::from_static(b"body"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_4xx_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport =
            Transport::with_transmitter(config(2), scripted(vec![404], Arc::clone(&calls)));

        let res = transport.round_trip(get()).await.unwrap();
        assert_eq!(res.status(), 404);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stalled_attempts_time_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let transmitter = transmit_fn(move |_req: Request<Bytes>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                sleep(Duration::from_secs(10)).await;
                respond(200)
            }
        });
        let transport = Transport::with_transmitter(config(2), transmitter);

        let err = transport.round_trip(get()).await.unwrap_err();
        assert!(is_request_timeout(&err));
        assert!(!is_status_5xx(&err));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().starts_with("GET http://upstream.test/ping: "));
    }

    #[tokio::test]
    async fn test_timed_out_attempt_is_cancelled() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let transmitter = transmit_fn(move |_req: Request<Bytes>| {
            let flag = Arc::clone(&flag);
            async move {
                sleep(Duration::from_millis(100)).await;
                flag.store(true, Ordering::SeqCst);
                respond(200)
            }
        });
        let transport = Transport::with_transmitter(config(1), transmitter);

        let err = transport.round_trip(get()).await.unwrap_err();
        assert!(is_request_timeout(&err));

        // Well past the point where a surviving transmission would finish.
        sleep(Duration::from_millis(200)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_retry_delay_only_between_attempts() {
        let delay = Duration::from_millis(200);
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = Transport::with_transmitter(
            TransportConfig {
                request_retry_delay: delay,
                ..config(3)
            },
            scripted(vec![500, 200], Arc::clone(&calls)),
        );

        let started = Instant::now();
        let res = transport.round_trip(get()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(res.status(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(elapsed >= delay, "no pause before the retry: {:?}", elapsed);
        assert!(elapsed < delay * 2, "pause before the first attempt: {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_transmit_error_is_wrapped() {
        let transmitter = transmit_fn(|_req: Request<Bytes>| async {
            Err::<Response<Bytes>, _>(TransportError::op(
                "dial",
                "upstream.test:80",
                ErrorKind::ConnectRefused.into(),
            ))
        });
        let transport = Transport::with_transmitter(config(1), transmitter);

        let err = transport.round_trip(get()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ConnectRefused));
        assert!(matches!(err, TransportError::Url { .. }));
    }

    #[tokio::test]
    async fn test_round_trip_is_one_breaker_action() {
        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        let hooks = HookRegistry::new();
        let s = Arc::clone(&successes);
        hooks.set_on_success(move || {
            s.fetch_add(1, Ordering::SeqCst);
        });
        let f = Arc::clone(&failures);
        hooks.set_on_failure(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        let calls = Arc::new(AtomicUsize::new(0));
        let transport = TransportBuilder::from_config(config(2))
            .hooks(hooks)
            .build_with_transmitter(scripted(vec![500], Arc::clone(&calls)));

        let res = transport.round_trip(get()).await.unwrap();
        assert_eq!(res.status(), 500);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clone_request() {
        let mut req = get();
        req.headers_mut()
            .insert("x-trace", http::HeaderValue::from_static("abc"));

        let clone = clone_request(&req);
        assert_eq!(clone.method(), req.method());
        assert_eq!(clone.uri(), req.uri());
        assert_eq!(clone.headers(), req.headers());
        assert_eq!(clone.body(), req.body());
    }
}
