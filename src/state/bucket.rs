//! Token bucket arithmetic
//!
//! One bucket per domain, refilled continuously at `rate` tokens per second up to
//! `capacity`. Timestamps are wall-clock milliseconds so that buckets kept in a
//! shared store stay meaningful across processes. The Redis token store runs the
//! same arithmetic as a server-side script.

/// Persistent part of one bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    pub tokens: f64,
    pub last_refill_ms: i64,
}

impl TokenBucket {
    /// A bucket seen for the first time starts full
    pub fn full(capacity: f64, now_ms: i64) -> Self {
        Self {
            tokens: capacity,
            last_refill_ms: now_ms,
        }
    }

    /// Refills, then tries to consume one token
    ///
    /// Returns 0 when the token was granted, otherwise the number of milliseconds
    /// until one token will be available. A denied call consumes nothing.
    pub fn take(&mut self, now_ms: i64, rate: f64, capacity: f64) -> u64 {
        let elapsed_ms = (now_ms - self.last_refill_ms).max(0) as f64;
        self.tokens = (self.tokens + elapsed_ms * rate / 1000.0).min(capacity);
        // Never move the refill clock backwards when callers' clocks disagree
        self.last_refill_ms = self.last_refill_ms.max(now_ms);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            0
        } else {
            ((1.0 - self.tokens) * 1000.0 / rate).ceil().max(1.0) as u64
        }
    }

    /// How long an idle bucket must be kept before it would have refilled anyway
    pub fn idle_ttl_ms(rate: f64, capacity: f64) -> u64 {
        ((capacity / rate) * 1000.0).ceil().max(1.0) as u64 * 2
    }
}
