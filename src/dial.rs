//! TCP dialing with retry on refused connections.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::classify::{is_connect_refused, ErrorKind, TransportError};
use crate::config::TransportConfig;

/// Opens TCP connections, retrying while the upstream refuses them.
///
/// Only refusals are retried. Any other dial failure, including a dial that
/// outlives `connect_timeout`, is returned straight away.
#[derive(Debug, Clone, Copy)]
pub struct Dialer {
    connect_timeout: Duration,
    connect_retry: u32,
    connect_retry_delay: Duration,
}

impl Dialer {
    /// Creates a dialer from the connect settings of `config`.
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            connect_retry: config.connect_retry,
            connect_retry_delay: config.connect_retry_delay,
        }
    }

    /// Connects to `addr` (`host:port`), making up to `connect_retry` attempts.
    pub async fn dial(&self, addr: &str) -> Result<TcpStream, TransportError> {
        let attempts = self.connect_retry.max(1);
        let mut attempt = 1;

        loop {
            match self.dial_once(addr).await {
                Ok(stream) => return Ok(stream),
                Err(err) if attempt < attempts && is_connect_refused(&err) => {
                    info!(
                        addr,
                        attempt,
                        delay = ?self.connect_retry_delay,
                        "connection refused, retrying"
                    );
                    sleep(self.connect_retry_delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(addr, attempt, %err, "dial failed");
                    return Err(err);
                }
            }
        }
    }

    async fn dial_once(&self, addr: &str) -> Result<TcpStream, TransportError> {
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                Ok(stream)
            }
            Ok(Err(err)) => Err(TransportError::op("dial", addr, err.into())),
            Err(_) => Err(TransportError::op(
                "dial",
                addr,
                ErrorKind::ConnectTimeout.into(),
            )),
        }
    }
}
