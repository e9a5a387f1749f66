//! Test doubles for the upstream API.
//!
//! A scripted HTTP/1.1 listener: each accepted connection consumes the next
//! canned response, and the last response repeats once the script runs out
//! (so "always 429" and "always 200" scenarios need a single entry).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A single scripted response.
#[derive(Debug, Clone)]
pub(crate) struct CannedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CannedResponse {
    /// A JSON response with the given status code.
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_string(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn render(&self) -> String {
        let reason = match self.status {
            200 => "OK",
            404 => "Not Found",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            _ => "Unknown",
        };
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason);
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str(&format!(
            "content-length: {}\r\nconnection: close\r\n\r\n",
            self.body.len()
        ));
        head + &self.body
    }
}

/// Scripted stand-in for the upstream API.
pub(crate) struct MockUpstream {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    paths: Arc<std::sync::Mutex<Vec<String>>>,
}

impl MockUpstream {
    /// Bind a local listener and serve the script.
    pub async fn serve(script: Vec<CannedResponse>) -> Self {
        assert!(!script.is_empty(), "script must have at least one response");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let paths = Arc::new(std::sync::Mutex::new(Vec::new()));

        let counter = Arc::clone(&hits);
        let seen_paths = Arc::clone(&paths);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };

                let hit = counter.fetch_add(1, Ordering::SeqCst);
                let response = script.get(hit).unwrap_or_else(|| script.last().unwrap());
                let payload = response.render();

                // Drain the request head before answering.
                let mut buf = vec![0u8; 4096];
                let mut seen = Vec::new();
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => {
                            seen.extend_from_slice(&buf[..n]);
                            if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }

                // Request line: "GET /path HTTP/1.1"
                if let Some(line) = String::from_utf8_lossy(&seen).lines().next() {
                    if let Some(path) = line.split_whitespace().nth(1) {
                        seen_paths.lock().unwrap().push(path.to_string());
                    }
                }

                let _ = stream.write_all(payload.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { addr, hits, paths }
    }

    /// Full URL for a path on this listener.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Base URL, for wiring into an `ApiConfig`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of requests accepted so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Request paths seen so far, in arrival order.
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}
