//! Per-domain circuit breaker
//!
//! Holds one [`BreakerState`] per domain, created closed on first use, and adds
//! the one suspending operation: waiting out an open breaker's backoff.
//! State is local to this process and starts over on restart.

use crate::state::{BreakerPolicy, BreakerState, CircuitState};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Externally inspectable view of one domain's breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub domain: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub current_backoff: Duration,
}

/// Circuit breakers keyed by domain
#[derive(Debug)]
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    domains: HashMap<String, BreakerState>,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            domains: HashMap::new(),
        }
    }

    fn entry(&mut self, domain: &str) -> &mut BreakerState {
        let policy = self.policy;
        self.domains
            .entry(domain.to_string())
            .or_insert_with(|| BreakerState::new(policy))
    }

    /// Current state; unseen domains are closed
    pub fn state(&self, domain: &str) -> CircuitState {
        self.domains
            .get(domain)
            .map_or(CircuitState::Closed, BreakerState::state)
    }

    pub fn consecutive_failures(&self, domain: &str) -> u32 {
        self.domains
            .get(domain)
            .map_or(0, BreakerState::consecutive_failures)
    }

    /// True only while the domain's breaker is half-open
    pub fn is_probing(&self, domain: &str) -> bool {
        self.domains
            .get(domain)
            .is_some_and(BreakerState::is_probing)
    }

    /// The domain that needs attention before any normal work
    ///
    /// A half-open domain comes first (it is waiting for its probe), then the
    /// open domain whose backoff ends soonest.
    pub fn tripped_domain(&self) -> Option<String> {
        if let Some((domain, _)) = self.domains.iter().find(|(_, b)| b.is_probing()) {
            return Some(domain.clone());
        }

        self.domains
            .iter()
            .filter(|(_, b)| b.state() == CircuitState::Open)
            .min_by_key(|(_, b)| b.open_until())
            .map(|(domain, _)| domain.clone())
    }

    /// Suspends while the domain's breaker is open, then moves it to half-open
    ///
    /// Returns immediately when closed or half-open. Returns false if `cancel`
    /// fired during the wait, leaving the breaker open.
    pub async fn wait_until_ready(&mut self, domain: &str, cancel: &CancellationToken) -> bool {
        let remaining = self.entry(domain).remaining_backoff(Instant::now());

        if self.state(domain) == CircuitState::Open {
            if !remaining.is_zero() {
                info!(
                    "Circuit open for {}, waiting {:.1}s before probing",
                    domain,
                    remaining.as_secs_f64()
                );
                tokio::select! {
                    _ = cancel.cancelled() => return false,
                    _ = tokio::time::sleep(remaining) => {}
                }
            }

            if self.entry(domain).try_half_open(Instant::now()) {
                info!("Circuit half-open for {}, probing", domain);
            }
        }

        true
    }

    /// Records a success, closing a half-open breaker
    pub fn record_success(&mut self, domain: &str) -> Option<CircuitState> {
        let transition = self.entry(domain).record_success();
        if transition == Some(CircuitState::Closed) {
            info!("Circuit closed for {}", domain);
        }
        transition
    }

    /// Records a site-wide failure, opening the breaker at the threshold or
    /// after a failed probe
    pub fn record_site_wide_failure(&mut self, domain: &str) -> Option<CircuitState> {
        let breaker = self.entry(domain);
        let transition = breaker.record_site_wide_failure(Instant::now());
        if transition == Some(CircuitState::Open) {
            warn!(
                "Circuit opened for {} after {} consecutive site-wide failures, backoff {:.0}s",
                domain,
                breaker.consecutive_failures(),
                breaker.current_backoff().as_secs_f64()
            );
        }
        transition
    }

    /// All known breakers, sorted by domain
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut snapshot: Vec<_> = self
            .domains
            .iter()
            .map(|(domain, b)| BreakerSnapshot {
                domain: domain.clone(),
                state: b.state(),
                consecutive_failures: b.consecutive_failures(),
                current_backoff: b.current_backoff(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.domain.cmp(&b.domain));
        snapshot
    }
}
