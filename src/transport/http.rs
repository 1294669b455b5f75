//! # HTTP Transport
//!
//! POSTs each fix as a JSON report to the collector URL. One request per
//! fix, no retry inside the transport: a failed fix goes back into the
//! queue and the transmitter waits out a bounded, doubling backoff before
//! taking the next one.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{RequeueMode, Transport};
use crate::codec::json::encode_report;
use crate::config::HttpConfig;
use crate::error::{RelayError, Result};
use crate::fix::LocationFix;

/// Doubling delay between consecutive failures, capped at `max`
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    failures: AtomicU32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            failures: AtomicU32::new(0),
        }
    }

    /// Delay for the next failure; each call doubles the following one
    pub fn next_delay(&self) -> Duration {
        let failures = self.failures.fetch_add(1, Ordering::SeqCst);
        let factor = 1u32 << failures.min(16);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }
}

/// JSON-over-HTTP transport
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    backoff: Backoff,
}

impl HttpTransport {
    /// Create a transport posting to `url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built (e.g. TLS backend
    /// initialization fails).
    pub fn new(url: impl Into<String>, timeout: Duration, backoff: Backoff) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            backoff,
        })
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        Self::new(
            config.url.clone(),
            config.timeout(),
            Backoff::new(
                Duration::from_millis(config.backoff_initial_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn requeue_mode(&self) -> RequeueMode {
        RequeueMode::Blocking
    }

    fn encode(&self, fix: &LocationFix) -> Result<Bytes> {
        let body = encode_report(fix)?;
        debug!("Report: {}", String::from_utf8_lossy(&body));
        Ok(body)
    }

    async fn send(&self, payload: Bytes) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { RelayError::Timeout("request") } else { RelayError::Http(e) })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::HttpStatus(status.as_u16()));
        }

        self.backoff.reset();
        Ok(())
    }

    async fn recover(&self, _error: &RelayError, shutdown: &CancellationToken) {
        let delay = self.backoff.next_delay();
        warn!("Collector unavailable, next attempt in {:.1}s", delay.as_secs_f32());

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
