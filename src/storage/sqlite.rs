//! SQLite event log implementation
//!
//! This module provides a SQLite-backed implementation of the EventLog trait. Rows
//! are only ever inserted; the autoincrement offset gives the append order.
//! Statements run on tokio's blocking pool.

use crate::state::WebpageEvent;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{EventLog, StorageError, StorageResult};
use crate::url::{partition_for, url_digest};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// One stored record, as read back from the log
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub offset: i64,
    pub partition: u32,
    pub key: String,
    pub event: WebpageEvent,
}

/// SQLite event log backend
pub struct SqliteEventLog {
    conn: Arc<Mutex<Connection>>,
    topic: String,
    partitions: u32,
}

impl SqliteEventLog {
    /// Opens or creates the event log database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `topic` - Topic name stamped on every record
    /// * `partitions` - Number of partitions records are spread across
    pub fn open(path: &Path, topic: &str, partitions: u32) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Self::with_connection(conn, topic, partitions)
    }

    /// Creates an in-memory log (for testing)
    pub fn open_in_memory(topic: &str, partitions: u32) -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, topic, partitions)
    }

    fn with_connection(conn: Connection, topic: &str, partitions: u32) -> StorageResult<Self> {
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            topic: topic.to_string(),
            partitions: partitions.max(1),
        })
    }

    /// Runs `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StorageError::LockPoisoned("event log connection".to_string()))?;
            f(&conn)
        })
        .await?
    }

    /// Reads one partition back in append order
    #[cfg(test)]
    fn read_partition(&self, partition: u32) -> StorageResult<Vec<LoggedEvent>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StorageError::LockPoisoned("event log connection".to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT event_offset, partition_id, record_key, payload FROM webpage_events
             WHERE topic = ?1 AND partition_id = ?2 ORDER BY event_offset",
        )?;

        let rows = stmt.query_map(params![self.topic, partition], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (offset, partition, key, payload) = row?;
            events.push(LoggedEvent {
                offset,
                partition,
                key,
                event: WebpageEvent::from_json(&payload)?,
            });
        }
        Ok(events)
    }
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn publish(&self, event: &WebpageEvent) -> StorageResult<()> {
        let payload = event.to_json()?;
        let partition = partition_for(&event.url, self.partitions);
        let key = url_digest(&event.url);
        let topic = self.topic.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO webpage_events (topic, partition_id, record_key, payload, appended_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![topic, partition, key, payload, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn count(&self) -> StorageResult<u64> {
        let topic = self.topic.clone();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM webpage_events WHERE topic = ?1",
                params![topic],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_for(url: &str) -> WebpageEvent {
        WebpageEvent {
            url: url.to_string(),
            cache_key: crate::url::cache_key(url),
            status_code: 200,
            content_type: Some("text/html".to_string()),
            content_length: 4,
            content_hash: crate::url::content_hash(b"page"),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_and_count() {
        let log = SqliteEventLog::open_in_memory("webpages", 4).unwrap();
        assert_eq!(log.count().await.unwrap(), 0);

        log.publish(&event_for("https://example.com/a")).await.unwrap();
        log.publish(&event_for("https://example.com/b")).await.unwrap();
        assert_eq!(log.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_same_url_lands_in_same_partition_in_order() {
        let log = SqliteEventLog::open_in_memory("webpages", 4).unwrap();
        let url = "https://example.com/listing/7";
        log.publish(&event_for(url)).await.unwrap();
        log.publish(&event_for("https://example.com/other")).await.unwrap();
        log.publish(&event_for(url)).await.unwrap();

        let partition = partition_for(url, 4);
        let records: Vec<_> = log
            .read_partition(partition)
            .unwrap()
            .into_iter()
            .filter(|r| r.event.url == url)
            .collect();

        assert_eq!(records.len(), 2);
        assert!(records[0].offset < records[1].offset);
        assert_eq!(records[0].key, url_digest(url));
        assert_eq!(records[0].partition, partition);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_publishes_all_land() {
        let log = Arc::new(SqliteEventLog::open_in_memory("webpages", 4).unwrap());

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                tokio::spawn(async move {
                    log.publish(&event_for(&format!("https://example.com/{}", i)))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(log.count().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");

        {
            let log = SqliteEventLog::open(&path, "webpages", 2).unwrap();
            log.publish(&event_for("https://example.com/")).await.unwrap();
        }

        let log = SqliteEventLog::open(&path, "webpages", 2).unwrap();
        assert_eq!(log.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_is_per_topic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");

        let pages = SqliteEventLog::open(&path, "webpages", 1).unwrap();
        pages.publish(&event_for("https://example.com/")).await.unwrap();
        drop(pages);

        let other = SqliteEventLog::open(&path, "other", 1).unwrap();
        assert_eq!(other.count().await.unwrap(), 0);
    }
}
