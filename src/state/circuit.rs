//! Circuit breaker state machine for one domain
//!
//! The whole breaker is one value holding the state, the consecutive failure count,
//! the current backoff tier and the probe deadline. The transition methods below are
//! its only mutators. Time is passed in, so the machine itself never sleeps.
//!
//! ```text
//! Closed   --threshold consecutive site-wide failures-->  Open (backoff = initial)
//! Open     --deadline reached------------------------->  HalfOpen
//! HalfOpen --probe success---------------------------->  Closed (backoff reset)
//! HalfOpen --probe failure---------------------------->  Open (backoff = min(backoff * multiplier, max))
//! ```

use crate::config::CircuitBreakerConfig;
use std::fmt;
use std::time::{Duration, Instant};

/// The three breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Normal operation
    Closed,

    /// Outage assumed; no requests until the backoff deadline
    Open,

    /// Probing recovery with a single request
    HalfOpen,
}

impl CircuitState {
    /// Stable lowercase name used in logs and statistics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds and the backoff ladder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for BreakerPolicy {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
            multiplier: config.backoff_multiplier,
        }
    }
}

impl BreakerPolicy {
    /// The tier after `current`, capped at the maximum
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let max = self.max_backoff.as_secs_f64();
        let next = (current.as_secs_f64() * self.multiplier).min(max);
        Duration::from_secs_f64(next)
    }
}

/// Breaker state for a single domain
#[derive(Debug, Clone)]
pub struct BreakerState {
    policy: BreakerPolicy,
    state: CircuitState,
    consecutive_failures: u32,
    current_backoff: Duration,
    open_until: Option<Instant>,
}

impl BreakerState {
    /// Creates a closed breaker; every process start begins here
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            current_backoff: policy.initial_backoff,
            open_until: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Backoff of the current (or, while closed, the first) open period
    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    /// Deadline after which an open breaker may probe
    pub fn open_until(&self) -> Option<Instant> {
        self.open_until
    }

    /// True only while half-open: the caller must issue one probe
    pub fn is_probing(&self) -> bool {
        self.state == CircuitState::HalfOpen
    }

    /// Records a successful request or probe
    ///
    /// Resets the failure counter. A half-open breaker closes and its backoff returns
    /// to the initial tier. Returns the new state when a transition happened.
    pub fn record_success(&mut self) -> Option<CircuitState> {
        self.consecutive_failures = 0;

        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Closed;
            self.current_backoff = self.policy.initial_backoff;
            self.open_until = None;
            return Some(CircuitState::Closed);
        }

        None
    }

    /// Records a failure classified as site-wide
    ///
    /// While closed, reaching the threshold opens the breaker at the initial backoff.
    /// While half-open (a failed probe), the breaker reopens one tier higher.
    /// Returns the new state when a transition happened.
    pub fn record_site_wide_failure(&mut self, now: Instant) -> Option<CircuitState> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= self.policy.failure_threshold {
                    self.current_backoff = self.policy.initial_backoff;
                    self.open(now);
                    Some(CircuitState::Open)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                self.current_backoff = self.policy.next_backoff(self.current_backoff);
                self.open(now);
                Some(CircuitState::Open)
            }
            // Already open: the deadline stands
            CircuitState::Open => None,
        }
    }

    /// Moves an open breaker to half-open once its deadline has passed
    ///
    /// Returns true when the transition happened.
    pub fn try_half_open(&mut self, now: Instant) -> bool {
        match (self.state, self.open_until) {
            (CircuitState::Open, Some(deadline)) if now >= deadline => {
                self.state = CircuitState::HalfOpen;
                true
            }
            _ => false,
        }
    }

    /// Time left before an open breaker may probe; zero when not open
    pub fn remaining_backoff(&self, now: Instant) -> Duration {
        match (self.state, self.open_until) {
            (CircuitState::Open, Some(deadline)) => deadline.saturating_duration_since(now),
            _ => Duration::ZERO,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.open_until = Some(now + self.current_backoff);
    }
}
