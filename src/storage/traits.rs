//! Storage traits and error types
//!
//! This module defines the trait interface for the shared infrastructure the fetch
//! stage talks to: the URL queues, the content cache, the event log and the
//! rate-limit token store.

use crate::state::WebpageEvent;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Every variant is an infrastructure failure. The processing loop retries them
/// with backoff and stops once they persist.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Blocking storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A named FIFO list of URLs shared by every fetcher instance
#[async_trait]
pub trait UrlQueue: Send + Sync {
    /// Appends a URL at the tail
    async fn push(&self, url: &str) -> StorageResult<()>;

    /// Removes the head, waiting up to `timeout` for one to arrive
    ///
    /// Returns `None` when the wait elapsed with the queue still empty.
    async fn pop(&self, timeout: Duration) -> StorageResult<Option<String>>;

    /// Number of queued URLs
    async fn len(&self) -> StorageResult<u64>;
}

/// Key-value store for raw page bodies
#[async_trait]
pub trait ContentCache: Send + Sync {
    /// Stores `body` under `key`, expiring after `ttl`
    async fn set(&self, key: &str, body: &[u8], ttl: Duration) -> StorageResult<()>;

    /// Reads a body back, `None` when absent or expired
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;
}

/// Append-only, partitioned log of webpage events
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Appends one event
    async fn publish(&self, event: &WebpageEvent) -> StorageResult<()>;

    /// Number of events appended so far
    async fn count(&self) -> StorageResult<u64>;
}

/// Shared per-domain token buckets
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Atomically refills and tries to take one token from `domain`'s bucket
    ///
    /// Returns 0 when a token was granted, otherwise the milliseconds until one
    /// will be available. `now_ms` is wall-clock milliseconds since the epoch.
    async fn take(&self, domain: &str, now_ms: i64, rate: f64, capacity: f64)
        -> StorageResult<u64>;
}
