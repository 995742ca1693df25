//! Distributed per-domain rate limiter
//!
//! A token bucket per domain with burst capacity 1, kept in the shared token
//! store so the pace holds across every fetcher instance.

use crate::storage::{StorageResult, TokenStore};
use crate::FetcherError;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Admission check taken before every outbound request
#[async_trait]
pub trait RequestGate: Send + Sync {
    /// Waits until one request to `domain` may be sent
    ///
    /// Returns `Ok(false)` when `cancel` fired first.
    async fn admit(&self, domain: &str, cancel: &CancellationToken) -> Result<bool, FetcherError>;
}

/// Strict pacing: at most one request may be issued back to back
pub const BUCKET_CAPACITY: f64 = 1.0;

pub struct RateLimiter {
    store: Arc<dyn TokenStore>,
    requests_per_second: f64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn TokenStore>, requests_per_second: f64) -> Self {
        Self {
            store,
            requests_per_second,
        }
    }

    /// Waits until `domain` has a token, then consumes it
    ///
    /// There is no deadline; backpressure shows up as latency. Returns `Ok(false)`
    /// when `cancel` fires before a token was obtained.
    pub async fn acquire(&self, domain: &str, cancel: &CancellationToken) -> StorageResult<bool> {
        loop {
            let now_ms = Utc::now().timestamp_millis();
            let wait_ms = self
                .store
                .take(domain, now_ms, self.requests_per_second, BUCKET_CAPACITY)
                .await?;

            if wait_ms == 0 {
                return Ok(true);
            }

            debug!("Rate limit for {}: waiting {}ms", domain, wait_ms);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
            }
        }
    }
}

#[async_trait]
impl RequestGate for RateLimiter {
    async fn admit(&self, domain: &str, cancel: &CancellationToken) -> Result<bool, FetcherError> {
        Ok(self.acquire(domain, cancel).await?)
    }
}
