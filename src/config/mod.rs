//! Configuration module for the page fetcher
//!
//! This module handles loading, overriding, and validating configuration. Values come
//! from built-in defaults, an optional TOML file, and `PAGE_FETCHER_*` environment
//! variables, in increasing order of precedence.
//!
//! # Example
//!
//! ```no_run
//! use page_fetcher::config::load_config;
//!
//! let config = load_config(None).unwrap();
//! println!("Breaker opens after {} failures", config.circuit_breaker.failure_threshold);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheConfig, CircuitBreakerConfig, Config, EventLogConfig, HttpConfig, InfrastructureConfig,
    ProcessingConfig, QueueConfig, RateLimitConfig, RobotsConfig,
};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash, ENV_PREFIX,
};
pub use validation::validate;
