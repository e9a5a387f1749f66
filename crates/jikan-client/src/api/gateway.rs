//! Rate-limited fetch gateway for the Jikan API.
//!
//! All outbound calls go through one shared [`FetchGateway`]. The gateway
//! owns the only piece of shared mutable state in the access layer, the
//! instant of the last dispatch, and uses it to keep dispatch starts at
//! least one configured interval apart regardless of how many logical
//! requests are queued. Rate-limit responses and transport failures are
//! retried here; every other response is returned to the caller as-is.

use super::error::GatewayError;
use anyhow::{Context, Result};
use reqwest::{header, Client, Response, StatusCode};
use shared::config::ApiConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Gateway serializing and retrying calls to the upstream API.
///
/// Construct one per process and share it (`Arc`) between all callers; the
/// spacing guarantee only holds across callers that go through the same
/// instance.
pub struct FetchGateway {
    /// HTTP client
    client: Client,
    /// Minimum spacing between dispatch starts
    min_interval: Duration,
    /// Attempt budget for transport failures; also bounds 429 re-dispatches
    max_attempts: u32,
    /// Delay for a 429 without a Retry-After header
    retry_delay: Duration,
    /// Instant of the last dispatch, shared by every caller.
    /// Held across the pacing sleep so concurrent callers queue in order.
    last_dispatch: Mutex<Option<Instant>>,
}

impl FetchGateway {
    /// Create a gateway from the API section of the configuration.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            min_interval: Duration::from_millis(config.min_interval_ms),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            last_dispatch: Mutex::new(None),
        })
    }

    /// Issue a GET for a fully-formed URL.
    ///
    /// Suspends until the global dispatch slot is free, then sends. A 429
    /// is slept out (server-supplied delay, or the configured default) and
    /// re-dispatched without touching the transport budget. Transport
    /// failures back off linearly (`interval * attempt`) up to the attempt
    /// budget. Any other response, success or not, is returned unchanged.
    pub async fn send(&self, url: &str) -> std::result::Result<Response, GatewayError> {
        let mut transport_attempts: u32 = 0;
        let mut throttled_dispatches: u32 = 0;

        loop {
            self.pace().await;

            debug!(url = %url, "Dispatching request");

            match self.client.get(url).send().await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    throttled_dispatches += 1;
                    if throttled_dispatches >= self.max_attempts {
                        warn!(
                            url = %url,
                            dispatches = throttled_dispatches,
                            "Upstream still rate limiting, giving up"
                        );
                        return Err(GatewayError::RateLimitExhausted {
                            attempts: throttled_dispatches,
                        });
                    }

                    let delay = retry_after(&response).unwrap_or(self.retry_delay);
                    warn!(
                        url = %url,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited by server, waiting"
                    );
                    sleep(delay).await;
                }
                Ok(response) => {
                    debug!(url = %url, status = %response.status(), "Response received");
                    return Ok(response);
                }
                Err(e) => {
                    transport_attempts += 1;
                    if transport_attempts >= self.max_attempts {
                        warn!(
                            url = %url,
                            error = %e,
                            attempts = transport_attempts,
                            "Transport failure, attempt budget exhausted"
                        );
                        return Err(GatewayError::Transport {
                            attempts: transport_attempts,
                            source: e,
                        });
                    }

                    let delay = self.min_interval * transport_attempts;
                    warn!(
                        url = %url,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Transport failure, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Wait for the global dispatch slot and claim it.
    ///
    /// The lock stays held while sleeping, so N concurrent callers are
    /// released one per interval, in the order the lock admits them.
    async fn pace(&self) {
        let mut last = self.last_dispatch.lock().await;

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(
                    wait_ms = wait.as_millis() as u64,
                    "Throttle: waiting for dispatch slot"
                );
                sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Server-supplied retry delay, in milliseconds.
///
/// The upstream sends plain integer milliseconds rather than RFC 9110
/// seconds; absent or unparsable values fall back to the configured default.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{CannedResponse, MockUpstream};
    use std::sync::Arc;

    fn test_config(base_interval_ms: u64) -> ApiConfig {
        ApiConfig {
            base_url: String::new(),
            user_agent: "aniview-test".to_string(),
            min_interval_ms: base_interval_ms,
            max_attempts: 3,
            retry_delay_ms: 40,
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn test_dispatches_are_spaced_by_min_interval() {
        let upstream = MockUpstream::serve(vec![CannedResponse::json(200, r#"{"data":[]}"#)]).await;
        let gateway = Arc::new(FetchGateway::new(&test_config(50)).unwrap());

        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let gateway = Arc::clone(&gateway);
            let url = upstream.url("/anime");
            handles.push(tokio::spawn(async move { gateway.send(&url).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        // Three dispatches, two enforced gaps. Allow some scheduler slack.
        assert!(start.elapsed() >= Duration::from_millis(90));
        assert_eq!(upstream.hits(), 3);
    }

    #[tokio::test]
    async fn test_rate_limited_then_success() {
        let upstream = MockUpstream::serve(vec![
            CannedResponse::json(429, "{}").with_header("Retry-After", "30"),
            CannedResponse::json(429, "{}").with_header("Retry-After", "30"),
            CannedResponse::json(200, r#"{"data":[]}"#),
        ])
        .await;
        let gateway = FetchGateway::new(&test_config(10)).unwrap();

        let start = Instant::now();
        let response = gateway.send(&upstream.url("/anime")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(upstream.hits(), 3);
        // Two Retry-After waits of 30ms each.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_rate_limit_uses_default_delay_without_header() {
        let upstream = MockUpstream::serve(vec![
            CannedResponse::json(429, "{}"),
            CannedResponse::json(200, r#"{"data":[]}"#),
        ])
        .await;
        let gateway = FetchGateway::new(&test_config(10)).unwrap();

        let start = Instant::now();
        let response = gateway.send(&upstream.url("/anime")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        // Configured retry_delay_ms = 40.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_permanent_rate_limiting_is_terminal() {
        let upstream =
            MockUpstream::serve(vec![CannedResponse::json(429, "{}").with_header("Retry-After", "5")])
                .await;
        let gateway = FetchGateway::new(&test_config(5)).unwrap();

        let err = gateway.send(&upstream.url("/anime")).await.unwrap_err();
        match err {
            GatewayError::RateLimitExhausted { attempts } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(upstream.hits(), 3);
    }

    #[tokio::test]
    async fn test_transport_failure_exhausts_attempt_budget() {
        // Bind a port, then drop the listener so connections are refused.
        let refused = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);
            format!("http://{}/anime", addr)
        };
        let gateway = FetchGateway::new(&test_config(20)).unwrap();

        let start = Instant::now();
        let err = gateway.send(&refused).await.unwrap_err();

        match err {
            GatewayError::Transport { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {:?}", other),
        }
        // Linear backoff between attempts: 20ms then 40ms.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_non_retryable_status_returned_as_is() {
        let upstream = MockUpstream::serve(vec![CannedResponse::json(
            404,
            r#"{"status":404,"message":"Resource does not exist"}"#,
        )])
        .await;
        let gateway = FetchGateway::new(&test_config(5)).unwrap();

        let response = gateway.send(&upstream.url("/anime/0")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        // Exactly one dispatch: ordinary failures are the caller's problem.
        assert_eq!(upstream.hits(), 1);
    }

    #[tokio::test]
    async fn test_retry_after_header_parsing() {
        let upstream = MockUpstream::serve(vec![
            CannedResponse::json(429, "{}").with_header("Retry-After", "not-a-number"),
            CannedResponse::json(200, "{}"),
        ])
        .await;
        let gateway = FetchGateway::new(&test_config(5)).unwrap();

        // Unparsable header falls back to the configured delay, not a panic.
        let response = gateway.send(&upstream.url("/anime")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(upstream.hits(), 2);
    }
}
