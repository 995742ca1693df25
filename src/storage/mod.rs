//! Storage module for the shared fetch infrastructure
//!
//! This module handles every interaction with state shared across fetcher
//! instances:
//! - Input and dead-letter URL queues
//! - The content cache holding raw page bodies
//! - The partitioned webpage event log
//! - Per-domain rate-limit token buckets

mod memory;
mod redis;
mod schema;
mod sqlite;
mod traits;

pub use self::memory::{MemoryCache, MemoryEventLog, MemoryQueue, MemoryTokenStore};
pub use self::redis::{RedisCache, RedisQueue, RedisTokenStore, RATE_LIMIT_KEY_PREFIX};
pub use self::sqlite::SqliteEventLog;
pub use self::traits::{
    ContentCache, EventLog, StorageError, StorageResult, TokenStore, UrlQueue,
};

use crate::config::Config;
use std::path::Path;
use std::sync::Arc;

/// The full set of backends one fetcher instance works against
#[derive(Clone)]
pub struct Backends {
    pub input_queue: Arc<dyn UrlQueue>,
    pub dead_letter_queue: Arc<dyn UrlQueue>,
    pub cache: Arc<dyn ContentCache>,
    pub event_log: Arc<dyn EventLog>,
    pub token_store: Arc<dyn TokenStore>,
}

impl Backends {
    /// Connects the production set: Redis for queues, cache and buckets, SQLite
    /// for the event log
    pub async fn connect(config: &Config) -> StorageResult<Self> {
        let conn = self::redis::connect(&config.infrastructure.redis_url).await?;

        let event_log_path = Path::new(&config.infrastructure.event_log_path);
        if let Some(parent) = event_log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let event_log = SqliteEventLog::open(
            event_log_path,
            &config.event_log.topic,
            config.event_log.partitions,
        )?;

        Ok(Self {
            input_queue: Arc::new(RedisQueue::new(conn.clone(), &config.queues.input)),
            dead_letter_queue: Arc::new(RedisQueue::new(conn.clone(), &config.queues.dead_letter)),
            cache: Arc::new(RedisCache::new(conn.clone())),
            event_log: Arc::new(event_log),
            token_store: Arc::new(RedisTokenStore::new(conn)),
        })
    }

    /// Builds an all-in-memory set, returning the concrete handles alongside so
    /// callers can inspect them
    pub fn in_memory() -> (Self, MemoryHandles) {
        let handles = MemoryHandles {
            input_queue: Arc::new(MemoryQueue::new()),
            dead_letter_queue: Arc::new(MemoryQueue::new()),
            cache: Arc::new(MemoryCache::new()),
            event_log: Arc::new(MemoryEventLog::new()),
            token_store: Arc::new(MemoryTokenStore::new()),
        };

        let backends = Self {
            input_queue: handles.input_queue.clone(),
            dead_letter_queue: handles.dead_letter_queue.clone(),
            cache: handles.cache.clone(),
            event_log: handles.event_log.clone(),
            token_store: handles.token_store.clone(),
        };

        (backends, handles)
    }
}

/// Concrete in-memory backends behind [`Backends::in_memory`]
#[derive(Clone)]
pub struct MemoryHandles {
    pub input_queue: Arc<MemoryQueue>,
    pub dead_letter_queue: Arc<MemoryQueue>,
    pub cache: Arc<MemoryCache>,
    pub event_log: Arc<MemoryEventLog>,
    pub token_store: Arc<MemoryTokenStore>,
}
