//! Fetch statistics
//!
//! This module keeps the counters the processing loop updates as it routes
//! outcomes, and renders them (and the shared queue/log sizes) to the console.

use crate::storage::{Backends, StorageResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one fetcher instance
///
/// Shared behind an `Arc` between the processing loop and the fetch orchestrator.
#[derive(Debug, Default)]
pub struct FetchStats {
    processed: AtomicU64,
    fetched: AtomicU64,
    skipped_robots: AtomicU64,
    requeued: AtomicU64,
    dead_lettered: AtomicU64,
    retries: AtomicU64,
    rate_limited_waits: AtomicU64,
    probes_succeeded: AtomicU64,
    probes_failed: AtomicU64,
    breaker_opened: AtomicU64,
    breaker_closed: AtomicU64,
    infra_errors: AtomicU64,
    input_queue_len: AtomicU64,
    dead_letter_len: AtomicU64,
}

/// Point-in-time copy of [`FetchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub fetched: u64,
    pub skipped_robots: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
    pub retries: u64,
    pub rate_limited_waits: u64,
    pub probes_succeeded: u64,
    pub probes_failed: u64,
    pub breaker_opened: u64,
    pub breaker_closed: u64,
    pub infra_errors: u64,
    pub input_queue_len: u64,
    pub dead_letter_len: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl FetchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_fetched(&self) {
        bump(&self.fetched);
    }

    pub fn record_skipped_robots(&self) {
        bump(&self.skipped_robots);
    }

    pub fn record_requeued(&self) {
        bump(&self.requeued);
    }

    pub fn record_dead_lettered(&self) {
        bump(&self.dead_lettered);
    }

    pub fn record_retry(&self) {
        bump(&self.retries);
    }

    pub fn record_rate_limited_wait(&self) {
        bump(&self.rate_limited_waits);
    }

    pub fn record_probe(&self, succeeded: bool) {
        if succeeded {
            bump(&self.probes_succeeded);
        } else {
            bump(&self.probes_failed);
        }
    }

    pub fn record_breaker_opened(&self) {
        bump(&self.breaker_opened);
    }

    pub fn record_breaker_closed(&self) {
        bump(&self.breaker_closed);
    }

    pub fn record_infra_error(&self) {
        bump(&self.infra_errors);
    }

    /// Stores the queue sizes sampled on an idle poll
    pub fn record_queue_sizes(&self, input: u64, dead_letter: u64) {
        self.input_queue_len.store(input, Ordering::Relaxed);
        self.dead_letter_len.store(dead_letter, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            skipped_robots: self.skipped_robots.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            rate_limited_waits: self.rate_limited_waits.load(Ordering::Relaxed),
            probes_succeeded: self.probes_succeeded.load(Ordering::Relaxed),
            probes_failed: self.probes_failed.load(Ordering::Relaxed),
            breaker_opened: self.breaker_opened.load(Ordering::Relaxed),
            breaker_closed: self.breaker_closed.load(Ordering::Relaxed),
            infra_errors: self.infra_errors.load(Ordering::Relaxed),
            input_queue_len: self.input_queue_len.load(Ordering::Relaxed),
            dead_letter_len: self.dead_letter_len.load(Ordering::Relaxed),
        }
    }
}

/// Sizes of the shared queues and event log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfrastructureSummary {
    pub input_queue_len: u64,
    pub dead_letter_len: u64,
    pub events_published: u64,
}

/// Reads the current queue and event log sizes
pub async fn load_infrastructure_summary(
    backends: &Backends,
) -> StorageResult<InfrastructureSummary> {
    Ok(InfrastructureSummary {
        input_queue_len: backends.input_queue.len().await?,
        dead_letter_len: backends.dead_letter_queue.len().await?,
        events_published: backends.event_log.count().await?,
    })
}

/// Prints the shared infrastructure sizes to stdout
pub fn print_infrastructure_summary(summary: &InfrastructureSummary) {
    println!("=== Page Fetcher Infrastructure ===\n");
    println!("  Input queue:       {}", summary.input_queue_len);
    println!("  Dead-letter queue: {}", summary.dead_letter_len);
    println!("  Events published:  {}", summary.events_published);
}

/// Prints a run's counters to stdout
pub fn print_statistics(stats: &StatsSnapshot) {
    println!("=== Fetch Statistics ===\n");

    println!("Outcomes:");
    println!("  Processed:        {}", stats.processed);
    println!("  Fetched:          {}", stats.fetched);
    println!("  Skipped (robots): {}", stats.skipped_robots);
    println!("  Re-queued:        {}", stats.requeued);
    println!("  Dead-lettered:    {}", stats.dead_lettered);
    println!();

    println!("Resilience:");
    println!("  Retries:            {}", stats.retries);
    println!("  429 waits:          {}", stats.rate_limited_waits);
    println!(
        "  Probes:             {} ok / {} failed",
        stats.probes_succeeded, stats.probes_failed
    );
    println!(
        "  Breaker:            opened {} / closed {}",
        stats.breaker_opened, stats.breaker_closed
    );
    println!("  Infrastructure errors: {}", stats.infra_errors);

    if stats.input_queue_len > 0 || stats.dead_letter_len > 0 {
        println!();
        println!("Last sampled queues:");
        println!("  Input:       {}", stats.input_queue_len);
        println!("  Dead-letter: {}", stats.dead_letter_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = FetchStats::new();
        assert_eq!(stats.record_processed(), 1);
        assert_eq!(stats.record_processed(), 2);
        stats.record_fetched();
        stats.record_requeued();
        stats.record_requeued();
        stats.record_probe(true);
        stats.record_probe(false);
        stats.record_probe(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.fetched, 1);
        assert_eq!(snapshot.requeued, 2);
        assert_eq!(snapshot.probes_succeeded, 1);
        assert_eq!(snapshot.probes_failed, 2);
        assert_eq!(snapshot.dead_lettered, 0);
    }

    #[test]
    fn test_queue_sizes_overwrite() {
        let stats = FetchStats::new();
        stats.record_queue_sizes(10, 2);
        stats.record_queue_sizes(3, 4);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.input_queue_len, 3);
        assert_eq!(snapshot.dead_letter_len, 4);
    }

    #[tokio::test]
    async fn test_infrastructure_summary() {
        let (backends, _) = Backends::in_memory();
        backends.input_queue.push("https://example.com/a").await.unwrap();
        backends.input_queue.push("https://example.com/b").await.unwrap();
        backends.dead_letter_queue.push("https://example.com/c").await.unwrap();

        let summary = load_infrastructure_summary(&backends).await.unwrap();
        assert_eq!(
            summary,
            InfrastructureSummary {
                input_queue_len: 2,
                dead_letter_len: 1,
                events_published: 0,
            }
        );
    }
}
