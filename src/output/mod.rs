//! Output module for fetch statistics
//!
//! This module handles:
//! - Counting outcomes, retries, probes and breaker transitions
//! - Rendering those counters and the shared queue sizes to the console

pub mod stats;

pub use stats::{
    load_infrastructure_summary, print_infrastructure_summary, print_statistics, FetchStats,
    InfrastructureSummary, StatsSnapshot,
};
