use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the page fetcher
///
/// Every section and field has a default, so an empty TOML document (or no file at
/// all) yields a working configuration for a local Redis.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub infrastructure: InfrastructureConfig,
    pub queues: QueueConfig,
    #[serde(rename = "event-log")]
    pub event_log: EventLogConfig,
    pub http: HttpConfig,
    pub cache: CacheConfig,
    #[serde(rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,
    #[serde(rename = "circuit-breaker")]
    pub circuit_breaker: CircuitBreakerConfig,
    pub robots: RobotsConfig,
    pub processing: ProcessingConfig,
}

/// Connections to shared infrastructure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InfrastructureConfig {
    /// Redis connection URL (queues, content cache, rate-limit buckets)
    #[serde(rename = "redis-url")]
    pub redis_url: String,

    /// Path to the SQLite event log database
    #[serde(rename = "event-log-path")]
    pub event_log_path: String,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            event_log_path: "./webpage_log.db".to_string(),
        }
    }
}

/// Queue names and polling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Input queue the upstream scheduler fills with URLs
    pub input: String,

    /// Dead-letter queue for URLs whose retries are exhausted
    #[serde(rename = "dead-letter")]
    pub dead_letter: String,

    /// Bounded wait for one dequeue (seconds)
    #[serde(rename = "poll-timeout-secs")]
    pub poll_timeout_secs: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            input: "crawler_queue".to_string(),
            dead_letter: "page_fetcher_dlq".to_string(),
            poll_timeout_secs: 5.0,
        }
    }
}

impl QueueConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.poll_timeout_secs)
    }
}

/// Event log topic layout
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Topic webpage events are appended to
    pub topic: String,

    /// Number of partitions events are spread over by URL
    pub partitions: u32,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            topic: "webpage_log".to_string(),
            partitions: 8,
        }
    }
}

/// HTTP client and retry behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Identifying client label sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Bound on one complete request (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: f64,

    /// Bound on establishing the connection (seconds)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: f64,

    /// Bound on one recovery probe (seconds)
    #[serde(rename = "probe-timeout-secs")]
    pub probe_timeout_secs: f64,

    /// Maximum redirects followed per request
    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,

    /// Maximum attempts per URL for transient URL-specific errors
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// First retry delay; doubles on each further attempt (seconds)
    #[serde(rename = "retry-backoff-base-secs")]
    pub retry_backoff_base_secs: f64,

    /// Longest Retry-After honoured on HTTP 429 (seconds)
    #[serde(rename = "max-retry-after-secs")]
    pub max_retry_after_secs: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "OttoBot/1.0".to_string(),
            request_timeout_secs: 30.0,
            connect_timeout_secs: 10.0,
            probe_timeout_secs: 10.0,
            max_redirects: 5,
            max_attempts: 3,
            retry_backoff_base_secs: 2.0,
            max_retry_after_secs: 300.0,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.probe_timeout_secs)
    }

    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_secs_f64(self.retry_backoff_base_secs)
    }

    pub fn max_retry_after(&self) -> Duration {
        Duration::from_secs_f64(self.max_retry_after_secs)
    }
}

/// Content cache behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached page body (seconds)
    #[serde(rename = "ttl-secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Per-domain request pacing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per second allowed for one domain
    #[serde(rename = "requests-per-second")]
    pub requests_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
        }
    }
}

/// Outage detection and recovery probing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive site-wide failures that open the circuit
    #[serde(rename = "failure-threshold")]
    pub failure_threshold: u32,

    /// First backoff after opening (seconds)
    #[serde(rename = "initial-backoff-secs")]
    pub initial_backoff_secs: f64,

    /// Backoff cap (seconds)
    #[serde(rename = "max-backoff-secs")]
    pub max_backoff_secs: f64,

    /// Growth factor applied after each failed probe
    #[serde(rename = "backoff-multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            initial_backoff_secs: 30.0,
            max_backoff_secs: 300.0,
            backoff_multiplier: 2.0,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.max_backoff_secs)
    }
}

/// robots.txt handling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobotsConfig {
    /// How long a fetched rule set is trusted (seconds)
    #[serde(rename = "cache-ttl-secs")]
    pub cache_ttl_secs: u64,

    /// Bound on fetching one robots.txt (seconds)
    #[serde(rename = "fetch-timeout-secs")]
    pub fetch_timeout_secs: f64,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 86_400,
            fetch_timeout_secs: 10.0,
        }
    }
}

impl RobotsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.fetch_timeout_secs)
    }
}

/// Processing loop behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Consecutive infrastructure errors tolerated before the loop gives up
    #[serde(rename = "max-infra-failures")]
    pub max_infra_failures: u32,

    /// First delay between infrastructure retries; doubles each time (seconds)
    #[serde(rename = "infra-retry-base-secs")]
    pub infra_retry_base_secs: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_infra_failures: 5,
            infra_retry_base_secs: 1.0,
        }
    }
}

impl ProcessingConfig {
    pub fn infra_retry_base(&self) -> Duration {
        Duration::from_secs_f64(self.infra_retry_base_secs)
    }
}
