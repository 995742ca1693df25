//! State module for the fetch pipeline
//!
//! This module holds the pure, clock-injected state the fetch layer is built on.
//!
//! # Components
//!
//! - `BreakerState`: per-domain circuit breaker finite-state machine
//! - `TokenBucket`: per-domain rate-limit bucket arithmetic
//! - `WebpageEvent`: the immutable record of a successful fetch

mod bucket;
mod circuit;
mod event;

// Re-export main types
pub use bucket::TokenBucket;
pub use circuit::{BreakerPolicy, BreakerState, CircuitState};
pub use event::WebpageEvent;
