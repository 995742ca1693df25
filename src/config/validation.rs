use crate::config::types::{
    CircuitBreakerConfig, Config, EventLogConfig, HttpConfig, InfrastructureConfig,
    ProcessingConfig, QueueConfig, RateLimitConfig, RobotsConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_infrastructure_config(&config.infrastructure)?;
    validate_queue_config(&config.queues)?;
    validate_event_log_config(&config.event_log)?;
    validate_http_config(&config.http)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_circuit_breaker_config(&config.circuit_breaker)?;
    validate_robots_config(&config.robots)?;
    validate_processing_config(&config.processing)?;

    if config.cache.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "cache ttl-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates infrastructure connection settings
fn validate_infrastructure_config(config: &InfrastructureConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.redis_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid redis-url: {}", e)))?;

    if !matches!(url.scheme(), "redis" | "rediss" | "unix" | "redis+unix") {
        return Err(ConfigError::InvalidUrl(format!(
            "redis-url must use a redis scheme, got '{}'",
            url.scheme()
        )));
    }

    if config.event_log_path.is_empty() {
        return Err(ConfigError::Validation(
            "event-log-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates queue names and polling
fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.input.is_empty() || config.dead_letter.is_empty() {
        return Err(ConfigError::Validation(
            "queue names cannot be empty".to_string(),
        ));
    }

    if config.input == config.dead_letter {
        return Err(ConfigError::Validation(format!(
            "input and dead-letter queues must differ, both are '{}'",
            config.input
        )));
    }

    require_positive("poll-timeout-secs", config.poll_timeout_secs)
}

/// Validates event log layout
fn validate_event_log_config(config: &EventLogConfig) -> Result<(), ConfigError> {
    if config.topic.is_empty() {
        return Err(ConfigError::Validation("topic cannot be empty".to_string()));
    }

    if config.partitions < 1 {
        return Err(ConfigError::Validation(format!(
            "partitions must be >= 1, got {}",
            config.partitions
        )));
    }

    Ok(())
}

/// Validates HTTP client and retry settings
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    require_positive("request-timeout-secs", config.request_timeout_secs)?;
    require_positive("connect-timeout-secs", config.connect_timeout_secs)?;
    require_positive("probe-timeout-secs", config.probe_timeout_secs)?;
    require_positive("retry-backoff-base-secs", config.retry_backoff_base_secs)?;
    require_positive("max-retry-after-secs", config.max_retry_after_secs)?;

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    Ok(())
}

/// Validates request pacing
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    require_positive("requests-per-second", config.requests_per_second)
}

/// Validates breaker thresholds and the backoff ladder
fn validate_circuit_breaker_config(config: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if config.failure_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "failure-threshold must be >= 1, got {}",
            config.failure_threshold
        )));
    }

    require_positive("initial-backoff-secs", config.initial_backoff_secs)?;
    require_positive("max-backoff-secs", config.max_backoff_secs)?;

    if config.initial_backoff_secs > config.max_backoff_secs {
        return Err(ConfigError::Validation(format!(
            "initial-backoff-secs ({}) cannot exceed max-backoff-secs ({})",
            config.initial_backoff_secs, config.max_backoff_secs
        )));
    }

    if !config.backoff_multiplier.is_finite() || config.backoff_multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff-multiplier must be >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    Ok(())
}

/// Validates robots.txt handling
fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    if config.cache_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "robots cache-ttl-secs must be >= 1".to_string(),
        ));
    }

    require_positive("fetch-timeout-secs", config.fetch_timeout_secs)
}

/// Validates loop-level infrastructure retry
fn validate_processing_config(config: &ProcessingConfig) -> Result<(), ConfigError> {
    if config.max_infra_failures < 1 {
        return Err(ConfigError::Validation(format!(
            "max-infra-failures must be >= 1, got {}",
            config.max_infra_failures
        )));
    }

    require_positive("infra-retry-base-secs", config.infra_retry_base_secs)
}

/// Durations are given in seconds and must be finite and strictly positive
fn require_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    // Upper bound keeps Duration::from_secs_f64 in range
    if !value.is_finite() || value <= 0.0 || value > 1.0e9 {
        return Err(ConfigError::Validation(format!(
            "{} must be a positive number of seconds, got {}",
            name, value
        )));
    }
    Ok(())
}
