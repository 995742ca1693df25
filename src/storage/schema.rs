//! Database schema definitions
//!
//! This module contains the SQL schema for the webpage event log.

/// SQL schema for the event log database
pub const SCHEMA_SQL: &str = r#"
-- Append-only event log; event_offset is the global append order
CREATE TABLE IF NOT EXISTS webpage_events (
    event_offset INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    partition_id INTEGER NOT NULL,
    record_key TEXT NOT NULL,
    payload TEXT NOT NULL,
    appended_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_webpage_events_partition ON webpage_events(topic, partition_id, event_offset);
CREATE INDEX IF NOT EXISTS idx_webpage_events_key ON webpage_events(record_key);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
