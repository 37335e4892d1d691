//! A small request API on top of [`Transport`].

use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, Response};

use crate::classify::TransportError;
use crate::config::TransportConfig;
use crate::transmit::{HttpTransmitter, Transmit};
use crate::transport::Transport;

/// Configuration of a [`Client`]. Same options as the transport it owns.
pub type ClientConfig = TransportConfig;

/// An HTTP client whose requests all go through one resilient transport.
///
/// Clones share the transport, and with it the breaker.
pub struct Client<T = HttpTransmitter>
where
    T: Transmit,
{
    transport: Arc<Transport<T>>,
}

impl Client<HttpTransmitter> {
    /// Creates a client sending plain HTTP/1.1.
    pub fn new(config: ClientConfig) -> Self {
        Self::from_transport(Transport::from_config(config))
    }
}

impl Default for Client<HttpTransmitter> {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl<T> Client<T>
where
    T: Transmit,
{
    /// Creates a client around an existing transport.
    pub fn from_transport(transport: Transport<T>) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// The transport requests go through.
    pub fn transport(&self) -> &Transport<T> {
        &self.transport
    }

    /// Sends a `GET` request to `url`.
    pub async fn get(&self, url: &str) -> Result<Response<Bytes>, TransportError> {
        self.request(Method::GET, url, Bytes::new()).await
    }

    /// Sends a `POST` request with `body` to `url`.
    pub async fn post(
        &self,
        url: &str,
        body: impl Into<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        self.request(Method::POST, url, body.into()).await
    }

    /// Sends a prepared request.
    pub async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        self.transport.round_trip(request).await
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Bytes,
    ) -> Result<Response<Bytes>, TransportError> {
        let request = Request::builder().method(method).uri(url).body(body)?;
        self.send(request).await
    }
}

impl<T> Clone for Client<T>
where
    T: Transmit,
{
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}
