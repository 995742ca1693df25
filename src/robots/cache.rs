//! Robots.txt cache entries
//!
//! An entry is trusted for a fixed TTL after it was fetched and never past it.

use crate::robots::ParsedRobots;
use std::time::{Duration, Instant};

/// Cached robots.txt rules for a domain
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub rules: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: Instant,
}

impl CachedRobots {
    pub fn new(rules: ParsedRobots, fetched_at: Instant) -> Self {
        Self { rules, fetched_at }
    }

    /// Whether the entry may still be used at `now`
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }

    /// How long ago the rules were fetched
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_until_ttl() {
        let start = Instant::now();
        let entry = CachedRobots::new(ParsedRobots::allow_all(), start);
        let ttl = Duration::from_secs(86_400);

        assert!(entry.is_fresh(ttl, start));
        assert!(entry.is_fresh(ttl, start + Duration::from_secs(23 * 3600)));
        assert!(!entry.is_fresh(ttl, start + ttl));
        assert!(!entry.is_fresh(ttl, start + Duration::from_secs(25 * 3600)));
    }

    #[test]
    fn test_age() {
        let start = Instant::now();
        let entry = CachedRobots::new(ParsedRobots::allow_all(), start);
        assert_eq!(entry.age(start + Duration::from_secs(12)), Duration::from_secs(12));
    }
}
