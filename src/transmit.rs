//! Single-attempt HTTP exchange.
//!
//! A [`Transmit`] sends one request and reads back the complete response. It
//! knows nothing about retries, timeouts or the breaker; the
//! [`Transport`](crate::Transport) layers those on top.

use std::future::Future;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::{HeaderValue, CONNECTION, HOST};
use http::uri::{PathAndQuery, Uri};
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tracing::{debug, trace};

use crate::classify::TransportError;
use crate::config::TransportConfig;
use crate::dial::Dialer;
use crate::task::AbortOnDrop;

/// Sends a single request and collects its response.
pub trait Transmit: Send + Sync + 'static {
    /// Performs one exchange with the upstream named by the request URI.
    fn transmit(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'static, Result<Response<Bytes>, TransportError>>;
}

/// Adapts an async function into a [`Transmit`].
pub fn transmit_fn<F, Fut>(f: F) -> TransmitFn<F>
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Bytes>, TransportError>> + Send + 'static,
{
    TransmitFn { f }
}

/// A [`Transmit`] backed by a function. See [`transmit_fn`].
#[derive(Clone)]
pub struct TransmitFn<F> {
    f: F,
}

impl<F, Fut> Transmit for TransmitFn<F>
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Bytes>, TransportError>> + Send + 'static,
{
    fn transmit(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'static, Result<Response<Bytes>, TransportError>> {
        Box::pin((self.f)(request))
    }
}

/// Plain HTTP/1.1 over a fresh TCP connection per exchange.
#[derive(Debug, Clone)]
pub struct HttpTransmitter {
    dialer: Dialer,
}

impl HttpTransmitter {
    /// Creates a transmitter dialing with the connect settings of `config`.
    pub fn new(config: &TransportConfig) -> Self {
        Self::with_dialer(Dialer::new(config))
    }

    /// Creates a transmitter around an existing dialer.
    pub fn with_dialer(dialer: Dialer) -> Self {
        Self { dialer }
    }
}

impl Transmit for HttpTransmitter {
    fn transmit(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'static, Result<Response<Bytes>, TransportError>> {
        let dialer = self.dialer;
        Box::pin(async move { exchange(dialer, request).await })
    }
}

async fn exchange(
    dialer: Dialer,
    request: Request<Bytes>,
) -> Result<Response<Bytes>, TransportError> {
    let addr = target_addr(request.uri())?;
    let request = into_origin_form(request)?;

    let stream = dialer.dial(&addr).await?;
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await?;

    // Drives the connection until the body is read, then gets aborted.
    let conn_addr = addr.clone();
    let _conn = AbortOnDrop::spawn(async move {
        if let Err(err) = conn.await {
            debug!(addr = %conn_addr, %err, "connection closed with error");
        }
    });

    let response = sender.send_request(request.map(Full::new)).await?;
    let (parts, body) = response.into_parts();
    let body = body.collect().await?.to_bytes();

    trace!(%addr, status = %parts.status, bytes = body.len(), "exchange complete");

    Ok(Response::from_parts(parts, body))
}

/// Resolves the `host:port` to dial from an absolute `http` URI.
fn target_addr(uri: &Uri) -> Result<String, TransportError> {
    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => {
            return Err(TransportError::InvalidRequest(format!(
                "unsupported scheme {:?}",
                other
            )))
        }
        None => {
            return Err(TransportError::InvalidRequest(format!(
                "missing scheme in {:?}",
                uri.to_string()
            )))
        }
    }

    let host = uri.host().filter(|h| !h.is_empty()).ok_or_else(|| {
        TransportError::InvalidRequest(format!("missing host in {:?}", uri.to_string()))
    })?;
    let port = uri.port_u16().unwrap_or(80);

    Ok(format!("{}:{}", host, port))
}

/// Rewrites the absolute URI to its path and query and fills in `Host`.
///
/// The connection is used for this single exchange only, so it is marked
/// `Connection: close`.
fn into_origin_form(mut request: Request<Bytes>) -> Result<Request<Bytes>, TransportError> {
    let authority = request.uri().authority().map(|a| a.as_str().to_owned());

    if let Some(authority) = authority {
        if !request.headers().contains_key(HOST) {
            let value = HeaderValue::from_str(&authority)
                .map_err(|e| TransportError::Http(e.into()))?;
            request.headers_mut().insert(HOST, value);
        }
    }
    request
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));

    let path = request
        .uri()
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    *request.uri_mut() = Uri::from(path);

    Ok(request)
}
