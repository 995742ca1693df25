//! Crawler module for resilient page fetching
//!
//! This module contains the core fetch logic, including:
//! - The fetch orchestrator with failure classification and local retries
//! - The per-domain circuit breaker
//! - The distributed per-domain rate limiter
//! - The processing loop that routes every outcome

mod breaker;
mod coordinator;
mod fetcher;
mod limiter;

pub use breaker::{BreakerSnapshot, CircuitBreaker};
pub use coordinator::Coordinator;
pub use fetcher::{
    build_http_client, parse_retry_after, FetchOutcome, Fetcher, SkipReason, PROBE_MAX_REDIRECTS,
};
pub use limiter::{RateLimiter, RequestGate, BUCKET_CAPACITY};
