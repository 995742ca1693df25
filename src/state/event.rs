use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of one successful page retrieval
///
/// Built once by the fetch orchestrator, appended once to the event log, never
/// updated. Serialized as JSON with a `"type": "webpage_fetched"` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "webpage_fetched")]
pub struct WebpageEvent {
    /// The fetched URL in its parsed, serialized form
    pub url: String,

    /// Content cache key holding the raw body
    pub cache_key: String,

    /// HTTP status code of the final response
    pub status_code: u16,

    /// Content-Type header value, if the server sent one
    pub content_type: Option<String>,

    /// Body length in bytes
    pub content_length: u64,

    /// Hex SHA-256 of the body
    pub content_hash: String,

    /// When the body was received
    pub fetched_at: DateTime<Utc>,
}

impl WebpageEvent {
    /// Serializes the event for the log
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses an event read back from the log
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
