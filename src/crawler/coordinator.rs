//! Processing loop - the sequencing authority for one fetcher instance
//!
//! Each iteration either probes a domain whose circuit breaker has tripped, or
//! pulls one URL and takes it through robots, rate limiting and the fetch
//! orchestrator, then routes the outcome:
//! - `Fetched` → publish the event, record a breaker success
//! - `SiteWideFailure` → re-enqueue at the tail, record a breaker failure
//! - `UrlSpecificFailure` → dead-letter queue
//! - `Skipped` → counted and logged only
//!
//! Infrastructure calls (queues, event log, token store) are retried in place
//! with doubling backoff; once they keep failing the loop stops with
//! [`FetcherError::InfrastructureUnavailable`].

use crate::config::Config;
use crate::crawler::breaker::{BreakerSnapshot, CircuitBreaker};
use crate::crawler::fetcher::{FetchOutcome, Fetcher, SkipReason};
use crate::crawler::limiter::{RateLimiter, RequestGate};
use crate::output::{FetchStats, StatsSnapshot};
use crate::robots::{HttpRobotsSource, RobotsGate, RobotsSource};
use crate::state::{BreakerPolicy, CircuitState};
use crate::storage::{Backends, StorageError, StorageResult};
use crate::url::{extract_domain, origin_of, parse_target};
use crate::FetcherError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Whether the loop should keep going after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Stop,
}

/// Retry policy for infrastructure calls
struct InfraRetry {
    max_failures: u32,
    base: Duration,
    stats: Arc<FetchStats>,
}

impl InfraRetry {
    /// Backoff after the `failures`-th consecutive failure
    fn delay(&self, failures: u32) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(failures.saturating_sub(1)))
    }

    /// Runs `op` until it succeeds, `max_failures` consecutive attempts fail, or
    /// `cancel` fires during a backoff (`Ok(None)`)
    async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<Option<T>, FetcherError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut failures = 0u32;

        loop {
            let source = match op().await {
                Ok(value) => return Ok(Some(value)),
                Err(e) => e,
            };

            failures += 1;
            self.stats.record_infra_error();

            if failures >= self.max_failures {
                error!(
                    "Giving up on {} after {} consecutive failures: {}",
                    operation, failures, source
                );
                return Err(FetcherError::InfrastructureUnavailable {
                    operation: operation.to_string(),
                    attempts: failures,
                    source,
                });
            }

            let delay = self.delay(failures);
            error!(
                "Failed to {} ({}/{}): {}; retrying in {:.1}s",
                operation,
                failures,
                self.max_failures,
                source,
                delay.as_secs_f64()
            );

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Rate-limit admission with token store failures retried in place
struct InfraGate<'a> {
    limiter: &'a RateLimiter,
    infra: &'a InfraRetry,
}

#[async_trait]
impl RequestGate for InfraGate<'_> {
    async fn admit(&self, domain: &str, cancel: &CancellationToken) -> Result<bool, FetcherError> {
        let limiter = self.limiter;
        let acquired = self
            .infra
            .run("acquire rate-limit token", cancel, || {
                limiter.acquire(domain, cancel)
            })
            .await?;
        Ok(acquired == Some(true))
    }
}

/// Main processing loop structure
pub struct Coordinator {
    backends: Backends,
    fetcher: Fetcher,
    robots: RobotsGate,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    stats: Arc<FetchStats>,
    infra: InfraRetry,
    poll_timeout: Duration,
    /// Origin to probe for each domain, learned from the URLs seen
    origins: HashMap<String, String>,
    /// Consecutive content cache write failures
    cache_failures: u32,
}

impl Coordinator {
    /// Creates a coordinator that fetches robots.txt over HTTP
    ///
    /// # Arguments
    ///
    /// * `config` - The fetcher configuration
    /// * `backends` - Queues, cache, event log and token store to work against
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(FetcherError)` - An HTTP client could not be built
    pub fn new(config: &Config, backends: Backends) -> Result<Self, FetcherError> {
        let source = HttpRobotsSource::new(&config.http.user_agent, config.robots.fetch_timeout())?;
        Self::with_robots_source(config, backends, Arc::new(source))
    }

    /// Creates a coordinator with a custom robots.txt source
    pub fn with_robots_source(
        config: &Config,
        backends: Backends,
        robots_source: Arc<dyn RobotsSource>,
    ) -> Result<Self, FetcherError> {
        let stats = Arc::new(FetchStats::new());

        let fetcher = Fetcher::new(
            &config.http,
            backends.cache.clone(),
            config.cache.ttl(),
            stats.clone(),
        )?;
        let robots = RobotsGate::new(
            robots_source,
            &config.http.user_agent,
            config.robots.cache_ttl(),
        );
        let limiter = RateLimiter::new(
            backends.token_store.clone(),
            config.rate_limit.requests_per_second,
        );
        let breaker = CircuitBreaker::new(BreakerPolicy::from(&config.circuit_breaker));

        Ok(Self {
            fetcher,
            robots,
            limiter,
            breaker,
            infra: InfraRetry {
                max_failures: config.processing.max_infra_failures.max(1),
                base: config.processing.infra_retry_base(),
                stats: stats.clone(),
            },
            stats,
            poll_timeout: config.queues.poll_timeout(),
            origins: HashMap::new(),
            cache_failures: 0,
            backends,
        })
    }

    /// Shared handle to this instance's counters
    pub fn stats(&self) -> Arc<FetchStats> {
        self.stats.clone()
    }

    /// Current breaker state of a domain
    pub fn circuit_state(&self, domain: &str) -> CircuitState {
        self.breaker.state(domain)
    }

    /// Every domain's breaker, for monitoring
    pub fn breaker_snapshot(&self) -> Vec<BreakerSnapshot> {
        self.breaker.snapshot()
    }

    /// Runs the processing loop until `cancel` fires
    ///
    /// Returns the final counters on a cooperative stop. The only error is
    /// sustained infrastructure failure.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<StatsSnapshot, FetcherError> {
        info!("Page fetcher started");
        let started = Instant::now();

        while !cancel.is_cancelled() {
            let step = match self.breaker.tripped_domain() {
                Some(domain) => self.probe_domain(&domain, &cancel).await?,
                None => self.process_next(&cancel).await?,
            };

            if step == Step::Stop {
                break;
            }
        }

        let snapshot = self.stats.snapshot();
        info!(
            "Page fetcher stopped after {:.1}s: {} processed, {} fetched, {} skipped, {} re-queued, {} dead-lettered, robots.txt cached for {} domains",
            started.elapsed().as_secs_f64(),
            snapshot.processed,
            snapshot.fetched,
            snapshot.skipped_robots,
            snapshot.requeued,
            snapshot.dead_lettered,
            self.robots.cached_domains().await
        );
        Ok(snapshot)
    }

    /// Waits out a tripped breaker and, once half-open, issues its single probe
    async fn probe_domain(
        &mut self,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<Step, FetcherError> {
        if !self.breaker.wait_until_ready(domain, cancel).await {
            return Ok(Step::Stop);
        }
        if !self.breaker.is_probing(domain) {
            return Ok(Step::Continue);
        }

        if !self.acquire_token(domain, cancel).await? {
            return Ok(Step::Stop);
        }

        let origin = self
            .origins
            .get(domain)
            .cloned()
            .unwrap_or_else(|| format!("https://{}", domain));
        let recovered = self.fetcher.probe(&origin).await;
        self.stats.record_probe(recovered);

        if recovered {
            info!("Probe of {} succeeded", origin);
            if self.breaker.record_success(domain) == Some(CircuitState::Closed) {
                self.stats.record_breaker_closed();
            }
        } else {
            warn!("Probe of {} failed", origin);
            self.record_site_wide_failure(domain);
        }

        Ok(Step::Continue)
    }

    fn gate(&self) -> InfraGate<'_> {
        InfraGate {
            limiter: &self.limiter,
            infra: &self.infra,
        }
    }

    /// Takes a rate-limit token; false when stopped while waiting
    async fn acquire_token(
        &self,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, FetcherError> {
        self.gate().admit(domain, cancel).await
    }

    /// Pulls one URL and takes it to exactly one terminal route
    async fn process_next(&mut self, cancel: &CancellationToken) -> Result<Step, FetcherError> {
        let input = self.backends.input_queue.clone();
        let poll_timeout = self.poll_timeout;

        // The pop is bounded by the poll timeout and never abandoned midway, so
        // a URL handed out by the queue is always owned by this loop
        let popped = self
            .infra
            .run("pop input queue", cancel, || input.pop(poll_timeout))
            .await?;
        let raw = match popped {
            None => return Ok(Step::Stop),
            Some(None) => {
                self.sample_queue_sizes().await;
                return Ok(Step::Continue);
            }
            Some(Some(raw)) => raw,
        };

        if cancel.is_cancelled() {
            self.requeue_on_stop(&raw).await;
            return Ok(Step::Stop);
        }

        let processed = self.stats.record_processed();
        let step = self.process_url(raw, cancel).await?;

        if processed % 10 == 0 {
            let s = self.stats.snapshot();
            info!(
                "Progress: {} processed, {} fetched, {} skipped, {} re-queued, {} dead-lettered",
                s.processed, s.fetched, s.skipped_robots, s.requeued, s.dead_lettered
            );
        }

        Ok(step)
    }

    async fn process_url(
        &mut self,
        raw: String,
        cancel: &CancellationToken,
    ) -> Result<Step, FetcherError> {
        debug!("Processing {}", raw);

        let (url, domain) = match parse_target(&raw) {
            Ok(url) => match extract_domain(&url) {
                Some(domain) => (url, domain),
                None => return self.dead_letter_unparseable(&raw, "missing domain", cancel).await,
            },
            Err(e) => return self.dead_letter_unparseable(&raw, &e.to_string(), cancel).await,
        };
        self.origins
            .entry(domain.clone())
            .or_insert_with(|| origin_of(&url));

        let outcome = if !self.robots.is_allowed(&url).await {
            FetchOutcome::Skipped {
                reason: SkipReason::Robots,
            }
        } else {
            let fetched = self.fetcher.fetch(&url, &self.gate(), cancel).await;
            match fetched {
                Ok(outcome) => outcome,
                Err(FetcherError::Interrupted { .. }) => {
                    self.requeue_on_stop(&raw).await;
                    return Ok(Step::Stop);
                }
                Err(FetcherError::Storage(source)) => {
                    return self.handle_cache_failure(&raw, source, cancel).await;
                }
                Err(e) => {
                    self.requeue_on_stop(&raw).await;
                    return Err(e);
                }
            }
        };

        // The content cache accepted this URL or was not needed
        self.cache_failures = 0;
        self.route(&raw, &domain, outcome, cancel).await
    }

    /// The content cache refused a body: the URL goes back to the input queue
    /// and the failure counts toward the infrastructure limit
    async fn handle_cache_failure(
        &mut self,
        raw: &str,
        source: StorageError,
        cancel: &CancellationToken,
    ) -> Result<Step, FetcherError> {
        self.cache_failures += 1;
        self.stats.record_infra_error();

        if self.cache_failures >= self.infra.max_failures {
            error!(
                "Giving up on write content cache after {} consecutive failures: {}",
                self.cache_failures, source
            );
            self.requeue_on_stop(raw).await;
            return Err(FetcherError::InfrastructureUnavailable {
                operation: "write content cache".to_string(),
                attempts: self.cache_failures,
                source,
            });
        }

        let delay = self.infra.delay(self.cache_failures);
        error!(
            "Failed to cache body of {} ({}/{}): {}; re-queueing, pausing {:.1}s",
            raw,
            self.cache_failures,
            self.infra.max_failures,
            source,
            delay.as_secs_f64()
        );

        let input = self.backends.input_queue.clone();
        if self
            .infra
            .run("re-enqueue URL", cancel, || input.push(raw))
            .await?
            .is_none()
        {
            self.requeue_on_stop(raw).await;
            return Ok(Step::Stop);
        }
        self.stats.record_requeued();

        tokio::select! {
            _ = cancel.cancelled() => Ok(Step::Stop),
            _ = tokio::time::sleep(delay) => Ok(Step::Continue),
        }
    }

    /// Sends an outcome to its single destination
    async fn route(
        &mut self,
        raw: &str,
        domain: &str,
        outcome: FetchOutcome,
        cancel: &CancellationToken,
    ) -> Result<Step, FetcherError> {
        let routed = match outcome {
            FetchOutcome::Fetched { event } => {
                let log = self.backends.event_log.clone();
                let published = self
                    .infra
                    .run("publish webpage event", cancel, || log.publish(&event))
                    .await?;
                if published.is_some() {
                    debug!(
                        "Fetched {} ({} bytes, status {})",
                        raw, event.content_length, event.status_code
                    );
                    self.stats.record_fetched();
                    if self.breaker.record_success(domain) == Some(CircuitState::Closed) {
                        self.stats.record_breaker_closed();
                    }
                }
                published.is_some()
            }
            FetchOutcome::SiteWideFailure { reason } => {
                warn!("Site-wide failure for {}: {}; re-queueing", raw, reason);
                self.record_site_wide_failure(domain);
                let input = self.backends.input_queue.clone();
                let pushed = self
                    .infra
                    .run("re-enqueue URL", cancel, || input.push(raw))
                    .await?;
                if pushed.is_some() {
                    self.stats.record_requeued();
                }
                pushed.is_some()
            }
            FetchOutcome::UrlSpecificFailure {
                status_code,
                reason,
            } => {
                warn!(
                    "Dead-lettering {} (status {:?}): {}",
                    raw, status_code, reason
                );
                let dlq = self.backends.dead_letter_queue.clone();
                let pushed = self
                    .infra
                    .run("push to dead-letter queue", cancel, || dlq.push(raw))
                    .await?;
                if pushed.is_some() {
                    self.stats.record_dead_lettered();
                }
                pushed.is_some()
            }
            FetchOutcome::Skipped { reason } => {
                debug!("Skipping {} ({})", raw, reason);
                self.stats.record_skipped_robots();
                true
            }
        };

        if routed {
            Ok(Step::Continue)
        } else {
            // Stopped while the route was being retried
            self.requeue_on_stop(raw).await;
            Ok(Step::Stop)
        }
    }

    fn record_site_wide_failure(&mut self, domain: &str) {
        if self.breaker.record_site_wide_failure(domain) == Some(CircuitState::Open) {
            self.stats.record_breaker_opened();
        }
    }

    async fn dead_letter_unparseable(
        &mut self,
        raw: &str,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<Step, FetcherError> {
        warn!("Unparseable URL {:?}: {}", raw, reason);
        let dlq = self.backends.dead_letter_queue.clone();
        let pushed = self
            .infra
            .run("push to dead-letter queue", cancel, || dlq.push(raw))
            .await?;
        if pushed.is_some() {
            self.stats.record_dead_lettered();
            Ok(Step::Continue)
        } else {
            self.requeue_on_stop(raw).await;
            Ok(Step::Stop)
        }
    }

    /// Returns an unfinished URL to the input queue during shutdown
    async fn requeue_on_stop(&self, raw: &str) {
        match self.backends.input_queue.push(raw).await {
            Ok(()) => info!("Returned {} to the input queue on shutdown", raw),
            Err(e) => error!("Lost {} on shutdown, could not re-enqueue: {}", raw, e),
        }
    }

    /// Records queue sizes on an idle poll
    async fn sample_queue_sizes(&self) {
        let input = self.backends.input_queue.len().await;
        let dlq = self.backends.dead_letter_queue.len().await;
        match (input, dlq) {
            (Ok(input), Ok(dlq)) => {
                debug!("Idle: input queue {}, dead-letter queue {}", input, dlq);
                self.stats.record_queue_sizes(input, dlq);
            }
            (Err(e), _) | (_, Err(e)) => debug!("Could not sample queue sizes: {}", e),
        }
    }
}
