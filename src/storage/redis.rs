//! Redis storage backends
//!
//! Queues are plain Redis lists, the content cache is plain string keys with an
//! expiry, and rate-limit buckets are hashes updated by a server-side script so
//! that every fetcher instance shares one bucket per domain.

use crate::state::TokenBucket;
use crate::storage::traits::{ContentCache, StorageResult, TokenStore, UrlQueue};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;

/// Key prefix for rate-limit bucket hashes
pub const RATE_LIMIT_KEY_PREFIX: &str = "rate_limit:";

/// Token bucket refill-and-take, run atomically on the server
///
/// KEYS[1] bucket key; ARGV now_ms, rate, capacity, idle ttl in ms.
/// Returns 0 when a token was granted, otherwise the wait in ms.
const TAKE_TOKEN_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local capacity = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local state = redis.call('HMGET', KEYS[1], 'tokens', 'last_refill_ms')
local tokens = tonumber(state[1])
local last = tonumber(state[2])
if tokens == nil or last == nil then
  tokens = capacity
  last = now
end

local elapsed = math.max(0, now - last)
tokens = math.min(capacity, tokens + elapsed * rate / 1000)
last = math.max(last, now)

local wait = 0
if tokens >= 1 then
  tokens = tokens - 1
else
  wait = math.max(1, math.ceil((1 - tokens) * 1000 / rate))
end

redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'last_refill_ms', tostring(last))
redis.call('PEXPIRE', KEYS[1], ttl)
return wait
"#;

/// Opens a managed, auto-reconnecting connection
pub async fn connect(redis_url: &str) -> StorageResult<ConnectionManager> {
    let client = redis::Client::open(redis_url)?;
    Ok(ConnectionManager::new(client).await?)
}

/// A Redis list used as a FIFO queue
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    name: String,
}

impl RedisQueue {
    pub fn new(conn: ConnectionManager, name: impl Into<String>) -> Self {
        Self {
            conn,
            name: name.into(),
        }
    }
}

#[async_trait]
impl UrlQueue for RedisQueue {
    async fn push(&self, url: &str) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("RPUSH")
            .arg(&self.name)
            .arg(url)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> StorageResult<Option<String>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(&self.name)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;
        Ok(popped.map(|(_, url)| url))
    }

    async fn len(&self) -> StorageResult<u64> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("LLEN")
            .arg(&self.name)
            .query_async(&mut conn)
            .await?)
    }
}

/// Page bodies stored as string keys with `EX`
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ContentCache for RedisCache {
    async fn set(&self, key: &str, body: &[u8], ttl: Duration) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(body)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }
}

/// Rate-limit buckets shared by all instances through Redis hashes
#[derive(Clone)]
pub struct RedisTokenStore {
    conn: ConnectionManager,
    script: Script,
}

impl RedisTokenStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: Script::new(TAKE_TOKEN_SCRIPT),
        }
    }
}

fn bucket_key(domain: &str) -> String {
    format!("{}{}", RATE_LIMIT_KEY_PREFIX, domain)
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn take(
        &self,
        domain: &str,
        now_ms: i64,
        rate: f64,
        capacity: f64,
    ) -> StorageResult<u64> {
        let mut conn = self.conn.clone();
        let wait_ms: i64 = self
            .script
            .key(bucket_key(domain))
            .arg(now_ms)
            .arg(rate)
            .arg(capacity)
            .arg(TokenBucket::idle_ttl_ms(rate, capacity))
            .invoke_async(&mut conn)
            .await?;
        Ok(wait_ms.max(0) as u64)
    }
}
