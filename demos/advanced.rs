//! Resilient HTTP client example
//!
//! Starts a local upstream that fails every other request and lags now and
//! then, and sends requests to it through a [`Client`] while hooks and
//! tracing report what the transport and breaker do.
//!
//! Run with `RUST_LOG=resilient_http=debug` to see every retry and refresh.

use resilient_http::{Client, HookRegistry, TransportBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

async fn start_upstream() -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let hits = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let n = hits.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;

                if n % 7 == 6 {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                let status = if n % 2 == 0 { "200 OK" } else { "503 Service Unavailable" };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    Ok(format!("http://{}/", addr))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = start_upstream().await?;

    let hooks = HookRegistry::new();
    hooks.set_on_break(|reason| println!(">> breaker opened: {}", reason));
    hooks.set_on_recover(|| println!(">> breaker accepting again"));
    hooks.set_on_reject(|reason| println!(">> request rejected: {}", reason));

    let transport = TransportBuilder::new()
        .connect_timeout(Duration::from_secs(1))
        .request_timeout(Duration::from_millis(200))
        .request_retry(2)
        .request_retry_delay(Duration::from_millis(50))
        .breaker(|b| {
            b.sample_ttl(Duration::from_millis(250))
                .min_sample_volume(4)
                .max_error_rate(30)
                .break_ttl(Duration::from_secs(1))
        })
        .hooks(hooks)
        .build();
    let client = Client::from_transport(transport);

    for i in 0..40 {
        match client.get(&url).await {
            Ok(res) => println!("request {:2}: {}", i, res.status()),
            Err(err) => println!("request {:2}: {}", i, err),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let snapshot = client.transport().breaker().snapshot();
    println!("final snapshot: {:?}", snapshot);

    Ok(())
}
