//! Shared helpers for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use page_fetcher::config::Config;
use page_fetcher::crawler::RequestGate;
use page_fetcher::state::WebpageEvent;
use page_fetcher::storage::{ContentCache, EventLog, StorageError, StorageResult, UrlQueue};
use page_fetcher::FetcherError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A configuration with every wait shrunk to milliseconds
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.queues.poll_timeout_secs = 0.05;
    config.http.request_timeout_secs = 5.0;
    config.http.connect_timeout_secs = 2.0;
    config.http.probe_timeout_secs = 2.0;
    config.http.retry_backoff_base_secs = 0.01;
    config.http.max_retry_after_secs = 1.0;
    config.rate_limit.requests_per_second = 1000.0;
    config.circuit_breaker.failure_threshold = 2;
    config.circuit_breaker.initial_backoff_secs = 0.05;
    config.circuit_breaker.max_backoff_secs = 0.2;
    config.processing.max_infra_failures = 3;
    config.processing.infra_retry_base_secs = 0.01;
    config
}

/// Polls `condition` every 10ms for up to 10 seconds
pub async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..1000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn unavailable() -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "backend down",
    ))
}

/// A queue whose every operation fails
#[derive(Default)]
pub struct BrokenQueue {
    pub calls: AtomicUsize,
}

#[async_trait]
impl UrlQueue for BrokenQueue {
    async fn push(&self, _url: &str) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(unavailable())
    }

    async fn pop(&self, _timeout: Duration) -> StorageResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(unavailable())
    }

    async fn len(&self) -> StorageResult<u64> {
        Err(unavailable())
    }
}

/// A content cache that refuses every write
#[derive(Default)]
pub struct BrokenCache;

#[async_trait]
impl ContentCache for BrokenCache {
    async fn set(&self, _key: &str, _body: &[u8], _ttl: Duration) -> StorageResult<()> {
        Err(unavailable())
    }

    async fn get(&self, _key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// An event log that fails its first `failures` publishes
pub struct FlakyEventLog {
    failures: AtomicUsize,
    pub published: std::sync::Mutex<Vec<WebpageEvent>>,
}

impl FlakyEventLog {
    pub fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            published: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EventLog for FlakyEventLog {
    async fn publish(&self, event: &WebpageEvent) -> StorageResult<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(unavailable());
        }
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn count(&self) -> StorageResult<u64> {
        Ok(self.published.lock().unwrap().len() as u64)
    }
}

/// A request gate that admits a fixed number of requests and counts admissions
pub struct CountingGate {
    remaining: AtomicUsize,
    pub admitted: AtomicUsize,
}

impl CountingGate {
    pub fn unlimited() -> Self {
        Self::admitting(usize::MAX)
    }

    /// Admits `n` requests, then reports a stop
    pub fn admitting(n: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(n),
            admitted: AtomicUsize::new(0),
        }
    }

    pub fn admitted(&self) -> usize {
        self.admitted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestGate for CountingGate {
    async fn admit(&self, _domain: &str, _cancel: &CancellationToken) -> Result<bool, FetcherError> {
        let remaining = self.remaining.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(false);
        }
        self.remaining.store(remaining - 1, Ordering::SeqCst);
        self.admitted.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}
