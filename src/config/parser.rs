use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::str::FromStr;

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "PAGE_FETCHER_";

/// Loads the configuration from an optional TOML file plus the process environment
///
/// Precedence, lowest to highest: built-in defaults, the TOML file (when given),
/// then `PAGE_FETCHER_*` environment variables. The result is validated.
///
/// # Arguments
///
/// * `path` - Optional path to a TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to read, parse, override or validate
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use page_fetcher::config::load_config;
///
/// let config = load_config(Some(Path::new("fetcher.toml"))).unwrap();
/// println!("Input queue: {}", config.queues.input);
/// ```
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate(&config)?;

    Ok(config)
}

/// Parses a TOML configuration file without validating it
fn parse_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

/// Applies `PAGE_FETCHER_*` overrides using the given variable lookup
///
/// The lookup is injected so overrides can be exercised without touching the real
/// process environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    env.set("REDIS_URL", &mut config.infrastructure.redis_url)?;
    env.set("EVENT_LOG_PATH", &mut config.infrastructure.event_log_path)?;

    env.set("INPUT_QUEUE", &mut config.queues.input)?;
    env.set("DLQ_QUEUE", &mut config.queues.dead_letter)?;
    env.set("POLL_TIMEOUT_SECONDS", &mut config.queues.poll_timeout_secs)?;

    env.set("WEBPAGE_LOG_TOPIC", &mut config.event_log.topic)?;
    env.set("WEBPAGE_LOG_PARTITIONS", &mut config.event_log.partitions)?;

    env.set("USER_AGENT", &mut config.http.user_agent)?;
    env.set(
        "REQUEST_TIMEOUT_SECONDS",
        &mut config.http.request_timeout_secs,
    )?;
    env.set(
        "CONNECT_TIMEOUT_SECONDS",
        &mut config.http.connect_timeout_secs,
    )?;
    env.set("PROBE_TIMEOUT_SECONDS", &mut config.http.probe_timeout_secs)?;
    env.set("MAX_REDIRECTS", &mut config.http.max_redirects)?;
    env.set("MAX_RETRIES", &mut config.http.max_attempts)?;
    env.set(
        "RETRY_BACKOFF_BASE_SECONDS",
        &mut config.http.retry_backoff_base_secs,
    )?;
    env.set(
        "MAX_RETRY_AFTER_SECONDS",
        &mut config.http.max_retry_after_secs,
    )?;

    env.set("CACHE_TTL_SECONDS", &mut config.cache.ttl_secs)?;

    env.set(
        "RATE_LIMIT_PER_SECOND",
        &mut config.rate_limit.requests_per_second,
    )?;

    env.set(
        "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
        &mut config.circuit_breaker.failure_threshold,
    )?;
    env.set(
        "CIRCUIT_BREAKER_INITIAL_BACKOFF_SECONDS",
        &mut config.circuit_breaker.initial_backoff_secs,
    )?;
    env.set(
        "CIRCUIT_BREAKER_MAX_BACKOFF_SECONDS",
        &mut config.circuit_breaker.max_backoff_secs,
    )?;
    env.set(
        "CIRCUIT_BREAKER_BACKOFF_MULTIPLIER",
        &mut config.circuit_breaker.backoff_multiplier,
    )?;

    env.set(
        "ROBOTS_TXT_CACHE_TTL_SECONDS",
        &mut config.robots.cache_ttl_secs,
    )?;
    env.set(
        "ROBOTS_TXT_FETCH_TIMEOUT_SECONDS",
        &mut config.robots.fetch_timeout_secs,
    )?;

    env.set(
        "MAX_INFRA_FAILURES",
        &mut config.processing.max_infra_failures,
    )?;
    env.set(
        "INFRA_RETRY_BASE_SECONDS",
        &mut config.processing.infra_retry_base_secs,
    )?;

    Ok(())
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Overwrites `target` when the prefixed variable is set
    fn set<T: FromStr>(&self, suffix: &str, target: &mut T) -> Result<(), ConfigError> {
        let name = format!("{}{}", ENV_PREFIX, suffix);
        if let Some(value) = (self.lookup)(&name) {
            *target = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name, value })?;
        }
        Ok(())
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is logged at startup so runs can be matched to the configuration they used.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and the hash of its file
///
/// The hash is `None` when no file was given.
pub fn load_config_with_hash(path: Option<&Path>) -> Result<(Config, Option<String>), ConfigError> {
    let config = load_config(path)?;
    let hash = path.map(compute_config_hash).transpose()?;
    Ok((config, hash))
}
