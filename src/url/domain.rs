use url::Url;

/// Extracts the domain (authority) from a URL
///
/// The domain is the lowercase host, followed by `:port` when the URL names a port
/// other than the scheme's default. Two services on one host but different ports
/// are therefore distinct domains for rate limiting and circuit breaking.
///
/// # Arguments
///
/// * `url` - The URL to extract the domain from
///
/// # Returns
///
/// * `Some(String)` - The lowercase domain
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use page_fetcher::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Returns `scheme://domain` for a URL, the base robots.txt and probes are built on
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}
