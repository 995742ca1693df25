//! Fetch orchestrator
//!
//! This module performs the HTTP side of processing one URL:
//! - GET with a bounded timeout and a redirect cap, each send admitted by the
//!   rate limiter
//! - Failure classification (site-wide vs URL-specific)
//! - Local retries with exponential backoff for transient URL-specific errors
//! - Sleep-and-retry on HTTP 429, honouring Retry-After
//! - Caching the body and building the webpage event on success
//! - HEAD probes used by the circuit breaker to detect recovery

use crate::config::HttpConfig;
use crate::crawler::limiter::RequestGate;
use crate::output::FetchStats;
use crate::state::WebpageEvent;
use crate::storage::ContentCache;
use crate::url::{cache_key, content_hash, extract_domain};
use crate::{FetcherError, UrlError};
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Redirects a recovery probe may follow
pub const PROBE_MAX_REDIRECTS: usize = 3;

/// Why a URL was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Robots,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Robots => "robots",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of processing one URL
///
/// Exactly one variant per processed URL; the processing loop routes on the tag
/// alone and never re-classifies.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The body is cached and the event is ready to publish
    Fetched { event: WebpageEvent },

    /// Outage-class failure: re-queue the URL and count it toward the breaker
    SiteWideFailure { reason: String },

    /// Content-class failure after local retries: dead-letter the URL
    UrlSpecificFailure {
        status_code: Option<u16>,
        reason: String,
    },

    /// Not attempted; not a failure
    Skipped { reason: SkipReason },
}

/// How a single failed attempt is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureClass {
    SiteWide,
    /// URL-specific and plausibly transient: retry locally
    Retryable,
    /// URL-specific and permanent
    Terminal,
}

/// Classifies a response status that is neither 2xx nor 429
fn classify_status(status: StatusCode) -> FailureClass {
    match status.as_u16() {
        502..=504 => FailureClass::SiteWide,
        408 => FailureClass::Retryable,
        500..=599 => FailureClass::Retryable,
        _ => FailureClass::Terminal,
    }
}

/// Classifies a transport-level error
fn classify_error(error: &reqwest::Error) -> FailureClass {
    if error.is_connect() {
        // Refused connections, DNS failures and connect timeouts
        FailureClass::SiteWide
    } else if error.is_timeout() || error.is_body() || error.is_decode() {
        FailureClass::Retryable
    } else if error.is_redirect() {
        FailureClass::Terminal
    } else {
        FailureClass::SiteWide
    }
}

/// Parses a Retry-After value in delta-seconds or HTTP-date form
///
/// Dates in the past yield zero. Returns `None` when the value is neither.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Builds the client used for page fetches
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(Policy::limited(config.max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Builds the client used for recovery probes
fn build_probe_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.probe_timeout())
        .connect_timeout(config.connect_timeout().min(config.probe_timeout()))
        .redirect(Policy::limited(PROBE_MAX_REDIRECTS))
        .build()
}

/// Sleeps unless `cancel` fires first; returns false when cancelled
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Performs fetches for the processing loop
pub struct Fetcher {
    client: Client,
    probe_client: Client,
    cache: Arc<dyn ContentCache>,
    cache_ttl: Duration,
    max_attempts: u32,
    retry_backoff_base: Duration,
    max_retry_after: Duration,
    stats: Arc<FetchStats>,
}

impl Fetcher {
    /// Creates a fetcher
    ///
    /// # Arguments
    ///
    /// * `config` - HTTP settings (timeouts, redirects, retry policy, user agent)
    /// * `cache` - Content cache successful bodies are written to
    /// * `cache_ttl` - Expiry of cached bodies
    /// * `stats` - Counters for retries and 429 waits
    pub fn new(
        config: &HttpConfig,
        cache: Arc<dyn ContentCache>,
        cache_ttl: Duration,
        stats: Arc<FetchStats>,
    ) -> Result<Self, FetcherError> {
        Ok(Self {
            client: build_http_client(config)?,
            probe_client: build_probe_client(config)?,
            cache,
            cache_ttl,
            max_attempts: config.max_attempts.max(1),
            retry_backoff_base: config.retry_backoff_base(),
            max_retry_after: config.max_retry_after(),
            stats,
        })
    }

    /// Delay before retry number `attempt` (1-based)
    fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Fetches one URL and classifies the result
    ///
    /// Every request, including re-sends after a 429 and local retries, first
    /// passes `gate`. On success the body is already in the content cache when
    /// this returns. Errors are infrastructure failures (cache write, gate) or
    /// [`FetcherError::Interrupted`] when `cancel` fired during a wait.
    pub async fn fetch(
        &self,
        url: &Url,
        gate: &dyn RequestGate,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetcherError> {
        let domain = extract_domain(url).ok_or(UrlError::MissingDomain)?;
        let mut attempt = 1;

        loop {
            if !gate.admit(&domain, cancel).await? {
                return Err(FetcherError::Interrupted {
                    url: url.to_string(),
                });
            }

            let (class, status_code, reason) = match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let wait = self.retry_after(&response);
                        self.stats.record_rate_limited_wait();
                        warn!("HTTP 429 for {}, retrying in {:.1}s", url, wait.as_secs_f64());
                        if !sleep_or_cancel(wait, cancel).await {
                            return Err(FetcherError::Interrupted {
                                url: url.to_string(),
                            });
                        }
                        continue;
                    }

                    if status.is_success() {
                        let content_type = response
                            .headers()
                            .get(CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);

                        match response.bytes().await {
                            Ok(body) => {
                                return self.complete(url, status, content_type, &body).await;
                            }
                            Err(e) => (
                                FailureClass::Retryable,
                                Some(status.as_u16()),
                                format!("failed to read body: {}", e),
                            ),
                        }
                    } else {
                        (
                            classify_status(status),
                            Some(status.as_u16()),
                            format!("HTTP {}", status.as_u16()),
                        )
                    }
                }
                Err(e) => (
                    classify_error(&e),
                    e.status().map(|s| s.as_u16()),
                    e.to_string(),
                ),
            };

            match class {
                FailureClass::SiteWide => {
                    debug!("Site-wide failure for {}: {}", url, reason);
                    return Ok(FetchOutcome::SiteWideFailure { reason });
                }
                FailureClass::Retryable if attempt < self.max_attempts => {
                    let delay = self.retry_delay(attempt);
                    self.stats.record_retry();
                    debug!(
                        "Attempt {}/{} for {} failed ({}), retrying in {:.1}s",
                        attempt,
                        self.max_attempts,
                        url,
                        reason,
                        delay.as_secs_f64()
                    );
                    if !sleep_or_cancel(delay, cancel).await {
                        return Err(FetcherError::Interrupted {
                            url: url.to_string(),
                        });
                    }
                    attempt += 1;
                }
                FailureClass::Retryable | FailureClass::Terminal => {
                    return Ok(FetchOutcome::UrlSpecificFailure {
                        status_code,
                        reason,
                    });
                }
            }
        }
    }

    /// Wait requested by a 429 response, capped
    fn retry_after(&self, response: &reqwest::Response) -> Duration {
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()))
            .unwrap_or(self.retry_backoff_base)
            .min(self.max_retry_after)
    }

    /// Caches a 2xx body and builds the event
    async fn complete(
        &self,
        url: &Url,
        status: StatusCode,
        content_type: Option<String>,
        body: &[u8],
    ) -> Result<FetchOutcome, FetcherError> {
        let key = cache_key(url.as_str());
        self.cache.set(&key, body, self.cache_ttl).await?;

        let event = WebpageEvent {
            url: url.to_string(),
            cache_key: key,
            status_code: status.as_u16(),
            content_type,
            content_length: body.len() as u64,
            content_hash: content_hash(body),
            fetched_at: Utc::now(),
        };

        Ok(FetchOutcome::Fetched { event })
    }

    /// Issues a lightweight HEAD to `origin` to test whether the site recovered
    ///
    /// Succeeds on any 2xx or 3xx status.
    pub async fn probe(&self, origin: &str) -> bool {
        let probe_url = format!("{}/", origin.trim_end_matches('/'));

        match self.probe_client.head(&probe_url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!("Probe {} returned {}", probe_url, status.as_u16());
                status.is_success() || status.is_redirection()
            }
            Err(e) => {
                debug!("Probe {} failed: {}", probe_url, e);
                false
            }
        }
    }
}
