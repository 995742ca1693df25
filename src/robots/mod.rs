//! Robots.txt handling module
//!
//! This module fetches, parses and caches robots.txt rules per domain and answers
//! whether a URL may be fetched. A robots.txt that cannot be retrieved allows
//! everything and is not cached, so the next URL for that domain tries again.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::{product_token, ParsedRobots};

use crate::url::{extract_domain, origin_of};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

/// Result of asking a source for a domain's robots.txt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsFetch {
    /// A 2xx response and its body
    Found(String),

    /// Network error or non-2xx status, with a description for the log
    Unavailable(String),
}

/// Where robots.txt bodies come from
#[async_trait]
pub trait RobotsSource: Send + Sync {
    /// Fetches `{origin}/robots.txt`
    async fn fetch(&self, origin: &str) -> RobotsFetch;
}

/// Fetches robots.txt over HTTP with its own short timeout
pub struct HttpRobotsSource {
    client: reqwest::Client,
}

impl HttpRobotsSource {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RobotsSource for HttpRobotsSource {
    async fn fetch(&self, origin: &str) -> RobotsFetch {
        let robots_url = format!("{}/robots.txt", origin.trim_end_matches('/'));

        let response = match self.client.get(&robots_url).send().await {
            Ok(response) => response,
            Err(e) => return RobotsFetch::Unavailable(e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            return RobotsFetch::Unavailable(format!("HTTP {}", status.as_u16()));
        }

        match response.text().await {
            Ok(body) => RobotsFetch::Found(body),
            Err(e) => RobotsFetch::Unavailable(e.to_string()),
        }
    }
}

/// Per-domain robots.txt gate with a TTL cache
pub struct RobotsGate {
    source: Arc<dyn RobotsSource>,
    user_agent: String,
    ttl: Duration,
    cache: Mutex<HashMap<String, CachedRobots>>,
}

impl RobotsGate {
    /// Creates a gate
    ///
    /// # Arguments
    ///
    /// * `source` - Where robots.txt bodies are fetched from
    /// * `user_agent` - Full user agent; its product token selects the rule group
    /// * `ttl` - How long fetched rules are trusted
    pub fn new(source: Arc<dyn RobotsSource>, user_agent: &str, ttl: Duration) -> Self {
        Self {
            source,
            user_agent: user_agent.to_string(),
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Decides whether `url` may be fetched
    ///
    /// Uses cached rules while fresh, otherwise fetches robots.txt from the URL's
    /// origin first. Never fails: an unavailable robots.txt allows.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let Some(domain) = extract_domain(url) else {
            return true;
        };

        let now = Instant::now();
        {
            let mut cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&domain) {
                if entry.is_fresh(self.ttl, now) {
                    return entry.rules.is_allowed(url.as_str(), &self.user_agent);
                }
                debug!(
                    "robots.txt for {} is {:.0}s old, refetching",
                    domain,
                    entry.age(now).as_secs_f64()
                );
            }
            // Stale rules are never consulted again
            cache.remove(&domain);
        }

        match self.source.fetch(&origin_of(url)).await {
            RobotsFetch::Found(body) => {
                let rules = ParsedRobots::from_body(&body);
                let allowed = rules.is_allowed(url.as_str(), &self.user_agent);
                debug!(
                    "Cached robots.txt for {} (crawl-delay: {:?})",
                    domain,
                    rules.crawl_delay(&self.user_agent)
                );
                self.cache
                    .lock()
                    .await
                    .insert(domain, CachedRobots::new(rules, Instant::now()));
                allowed
            }
            RobotsFetch::Unavailable(reason) => {
                warn!(
                    "robots.txt unavailable for {} ({}), allowing {}",
                    domain, reason, url
                );
                true
            }
        }
    }

    /// Number of domains with cached rules
    pub async fn cached_domains(&self) -> usize {
        self.cache.lock().await.len()
    }
}
