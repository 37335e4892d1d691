//! Mock upstreams for transport tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the upstream does with one request.
#[derive(Debug, Clone, Copy)]
pub struct Reply {
    pub status: u16,
    pub delay: Duration,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
        }
    }

    /// Holds the connection open without answering for a long time.
    pub fn stall() -> Self {
        Self {
            status: 200,
            delay: Duration::from_secs(30),
        }
    }
}

/// A running mock upstream.
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Number of requests read so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Reserves a local port with nothing listening on it.
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Starts an upstream answering the n-th request (from 0) with `reply(n)`.
pub async fn start_backend<F>(reply: F) -> MockBackend
where
    F: Fn(usize) -> Reply + Send + Sync + 'static,
{
    start_backend_at("127.0.0.1:0".parse().unwrap(), reply).await
}

/// Same as [`start_backend`], on a fixed address.
pub async fn start_backend_at<F>(addr: SocketAddr, reply: F) -> MockBackend
where
    F: Fn(usize) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let reply = Arc::new(reply);

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let counter = Arc::clone(&counter);
                    let reply = Arc::clone(&reply);
                    tokio::spawn(async move {
                        handle(socket, counter, reply.as_ref()).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockBackend { addr, hits }
}

async fn handle<F>(mut socket: TcpStream, hits: Arc<AtomicUsize>, reply: &F)
where
    F: Fn(usize) -> Reply,
{
    if !read_request_head(&mut socket).await {
        return;
    }

    let n = hits.fetch_add(1, Ordering::SeqCst);
    let reply = reply(n);
    tokio::time::sleep(reply.delay).await;

    let body = format!("reply {}", n);
    let reason = http::StatusCode::from_u16(reply.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reason,
        body.len(),
        body
    );

    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Reads up to the blank line ending the request head.
async fn read_request_head(socket: &mut TcpStream) -> bool {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    return true;
                }
            }
        }
    }
}
