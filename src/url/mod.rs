//! URL handling module
//!
//! This module parses target URLs, derives their domain, and computes the
//! deterministic keys the pipeline stores content and events under.

mod domain;

use crate::UrlError;
use sha2::{Digest, Sha256};
use url::Url;

// Re-export main functions
pub use domain::{extract_domain, origin_of};

/// Prefix of every content cache key
pub const CACHE_KEY_PREFIX: &str = "webpage:";

/// Parses a raw queue item into an absolute http(s) URL with a host
///
/// # Examples
///
/// ```
/// use page_fetcher::url::parse_target;
///
/// assert!(parse_target("https://example.com/cars/1").is_ok());
/// assert!(parse_target("ftp://example.com/file").is_err());
/// assert!(parse_target("/relative/path").is_err());
/// ```
pub fn parse_target(raw: &str) -> Result<Url, UrlError> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    Ok(url)
}

/// Hex SHA-256 of the URL string, used as the event log record key
pub fn url_digest(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// Derives the content cache key for a URL
///
/// This is a pure function of the URL string: fetching the same URL twice always
/// stores the body under the same key.
///
/// # Examples
///
/// ```
/// use page_fetcher::url::cache_key;
///
/// let key = cache_key("https://example.com/");
/// assert!(key.starts_with("webpage:"));
/// assert_eq!(key, cache_key("https://example.com/"));
/// ```
pub fn cache_key(url: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, url_digest(url))
}

/// Chooses the event log partition for a URL
///
/// Uses the first four bytes of the URL's SHA-256, so every event for one URL lands
/// in the same partition and keeps its relative order there.
pub fn partition_for(url: &str, partitions: u32) -> u32 {
    let digest = Sha256::digest(url.as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix % partitions.max(1)
}

/// Hex SHA-256 of a page body
pub fn content_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_accepts_http_and_https() {
        assert!(parse_target("http://example.com/").is_ok());
        assert!(parse_target("https://example.com/cars?page=2").is_ok());
        assert!(parse_target("  https://example.com/padded  ").is_ok());
    }

    #[test]
    fn test_parse_target_rejects_other_schemes() {
        assert!(matches!(
            parse_target("mailto:someone@example.com"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(matches!(
            parse_target("ftp://example.com/"),
            Err(UrlError::InvalidScheme(_))
        ));
    }

    #[test]
    fn test_parse_target_rejects_garbage() {
        assert!(matches!(parse_target("not a url"), Err(UrlError::Parse(_))));
        assert!(matches!(parse_target(""), Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = cache_key("https://example.com/listing/1");
        let b = cache_key("https://example.com/listing/1");
        let c = cache_key("https://example.com/listing/2");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), CACHE_KEY_PREFIX.len() + 64);
    }

    #[test]
    fn test_cache_key_known_value() {
        // sha256("") is a well-known constant
        assert_eq!(
            cache_key(""),
            "webpage:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_partition_is_stable_and_in_range() {
        let url = "https://example.com/listing/1";
        let first = partition_for(url, 8);
        for _ in 0..10 {
            assert_eq!(partition_for(url, 8), first);
        }
        assert!(first < 8);
        assert_eq!(partition_for(url, 1), 0);
        assert_eq!(partition_for(url, 0), 0);
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
