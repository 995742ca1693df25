//! In-process storage backends
//!
//! Same semantics as the Redis and SQLite backends, held in memory. Used by tests
//! and by single-process runs that do not need shared state.

use crate::state::{TokenBucket, WebpageEvent};
use crate::storage::traits::{
    ContentCache, EventLog, StorageError, StorageResult, TokenStore, UrlQueue,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> StorageResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::LockPoisoned(what.to_string()))
}

/// FIFO queue with a bounded blocking pop
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the queued URLs, head first
    pub fn items(&self) -> StorageResult<Vec<String>> {
        Ok(lock(&self.items, "queue")?.iter().cloned().collect())
    }
}

#[async_trait]
impl UrlQueue for MemoryQueue {
    async fn push(&self, url: &str) -> StorageResult<()> {
        lock(&self.items, "queue")?.push_back(url.to_string());
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> StorageResult<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            let next = lock(&self.items, "queue")?.pop_front();
            if next.is_some() {
                return Ok(next);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self) -> StorageResult<u64> {
        Ok(lock(&self.items, "queue")?.len() as u64)
    }
}

/// Content cache with per-entry expiry
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> StorageResult<usize> {
        Ok(lock(&self.entries, "cache")?.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl ContentCache for MemoryCache {
    async fn set(&self, key: &str, body: &[u8], ttl: Duration) -> StorageResult<()> {
        lock(&self.entries, "cache")?.insert(key.to_string(), (body.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let mut entries = lock(&self.entries, "cache")?;
        let expired = match entries.get(key) {
            Some((body, expires_at)) if *expires_at > Instant::now() => {
                return Ok(Some(body.clone()))
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }
}

/// Event log kept as a vector, in publish order
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<WebpageEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event published so far
    pub fn events(&self) -> StorageResult<Vec<WebpageEvent>> {
        Ok(lock(&self.events, "event log")?.clone())
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn publish(&self, event: &WebpageEvent) -> StorageResult<()> {
        lock(&self.events, "event log")?.push(event.clone());
        Ok(())
    }

    async fn count(&self) -> StorageResult<u64> {
        Ok(lock(&self.events, "event log")?.len() as u64)
    }
}

/// Token buckets in a mutex-guarded map
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn take(
        &self,
        domain: &str,
        now_ms: i64,
        rate: f64,
        capacity: f64,
    ) -> StorageResult<u64> {
        let mut buckets = lock(&self.buckets, "token store")?;
        let bucket = buckets
            .entry(domain.to_string())
            .or_insert_with(|| TokenBucket::full(capacity, now_ms));
        Ok(bucket.take(now_ms, rate, capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let queue = MemoryQueue::new();
        queue.push("a").await.unwrap();
        queue.push("b").await.unwrap();

        assert_eq!(queue.len().await.unwrap(), 2);
        assert_eq!(queue.pop(Duration::from_millis(10)).await.unwrap().as_deref(), Some("a"));
        assert_eq!(queue.pop(Duration::from_millis(10)).await.unwrap().as_deref(), Some("b"));
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pop_times_out_on_empty_queue() {
        let queue = MemoryQueue::new();
        let started = Instant::now();
        assert_eq!(queue.pop(Duration::from_millis(50)).await.unwrap(), None);
        assert!(started.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = std::sync::Arc::new(MemoryQueue::new());
        let pusher = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pusher.push("late").await.unwrap();
        });

        let item = queue.pop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(item.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let cache = MemoryCache::new();
        cache.set("k", b"body", Duration::from_secs(60)).await.unwrap();
        cache.set("gone", b"old", Duration::ZERO).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(b"body".to_vec()));
        assert_eq!(cache.get("gone").await.unwrap(), None);
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_event_log_keeps_order() {
        let log = MemoryEventLog::new();
        for i in 0..3 {
            let event = WebpageEvent {
                url: format!("https://example.com/{}", i),
                cache_key: String::new(),
                status_code: 200,
                content_type: None,
                content_length: 0,
                content_hash: String::new(),
                fetched_at: Utc::now(),
            };
            log.publish(&event).await.unwrap();
        }

        assert_eq!(log.count().await.unwrap(), 3);
        let events = log.events().unwrap();
        assert_eq!(events[0].url, "https://example.com/0");
        assert_eq!(events[2].url, "https://example.com/2");
    }

    #[tokio::test]
    async fn test_token_store_buckets_are_per_domain() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.take("a.com", 0, 1.0, 1.0).await.unwrap(), 0);
        assert_eq!(store.take("b.com", 0, 1.0, 1.0).await.unwrap(), 0);
        assert_eq!(store.take("a.com", 0, 1.0, 1.0).await.unwrap(), 1000);
    }
}
