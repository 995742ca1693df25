//! Page Fetcher: the resilient fetch stage of a single-site crawl pipeline
//!
//! This crate turns a stream of URLs pulled from a shared queue into cached page
//! content and published webpage events, while surviving partial and total outages
//! of the target site, respecting robots.txt, pacing requests per domain, and
//! routing every failure to the right recovery path (retry, re-queue, dead-letter).

pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for page fetcher operations
///
/// Fetch outcomes (site-wide failures, URL-specific failures, robots skips) are not
/// errors; they are reported through [`crawler::FetchOutcome`]. This type covers
/// configuration, infrastructure and interruption.
#[derive(Debug, Error)]
pub enum FetcherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Interrupted by shutdown while processing {url}")]
    Interrupted { url: String },

    #[error("Infrastructure unavailable after {attempts} attempts to {operation}: {source}")]
    InfrastructureUnavailable {
        operation: String,
        attempts: u32,
        source: storage::StorageError,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnv { name: String, value: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for page fetcher operations
pub type Result<T> = std::result::Result<T, FetcherError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, FetchOutcome, Fetcher};
pub use state::{CircuitState, WebpageEvent};
pub use url::{cache_key, extract_domain, parse_target};
