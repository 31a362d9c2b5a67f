//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use lapollo_agent::env::{ProcessManager, ReloadError, ReloadOutcome};

/// A mock Apollo config server on an ephemeral port.
pub struct MockApollo {
    pub addr: SocketAddr,
    /// Request targets (`/path?query`) in arrival order.
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl MockApollo {
    pub fn host(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests_to(&self, prefix: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|target| target.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// Start a programmable mock server. `handler` receives the request target
/// and returns the status and body to send.
pub async fn start_apollo<F, Fut>(handler: F) -> MockApollo
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let log = requests.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let handler = handler.clone();
                    let log = log.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = socket.into_split();
                        let mut reader = BufReader::new(read);

                        let mut request_line = String::new();
                        if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
                            return;
                        }
                        loop {
                            let mut header = String::new();
                            match reader.read_line(&mut header).await {
                                Ok(0) | Err(_) => break,
                                Ok(_) if header == "\r\n" => break,
                                Ok(_) => {}
                            }
                        }

                        let target = request_line
                            .split_whitespace()
                            .nth(1)
                            .unwrap_or("/")
                            .to_string();
                        log.lock().unwrap().push(target.clone());

                        let (status, body) = handler(target).await;
                        let status_text = match status {
                            200 => "200 OK",
                            304 => "304 Not Modified",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let body = if status == 304 { String::new() } else { body };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = write.write_all(response.as_bytes()).await;
                        let _ = write.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockApollo { addr, requests }
}

/// Value of query parameter `name` in a request target.
pub fn query_param(target: &str, name: &str) -> Option<String> {
    let url = url::Url::parse(&format!("http://mock{}", target)).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// A process manager that only counts reloads.
#[derive(Default)]
pub struct CountingManager {
    pub reloads: Mutex<u32>,
}

#[async_trait]
impl ProcessManager for CountingManager {
    async fn reload(&self) -> Result<ReloadOutcome, ReloadError> {
        *self.reloads.lock().unwrap() += 1;
        Ok(ReloadOutcome::Reloaded)
    }
}

impl CountingManager {
    pub fn count(&self) -> u32 {
        *self.reloads.lock().unwrap()
    }
}

/// Poll `path` until its content equals `expected` or `timeout` elapses.
pub async fn wait_for_content(path: &Path, expected: &str, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if std::fs::read_to_string(path).map(|c| c == expected).unwrap_or(false) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
