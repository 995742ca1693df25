//! Robots.txt parser implementation
//!
//! Rule evaluation is delegated to the robotstxt crate. Crawl-delay, which that
//! crate does not expose, is read from the matching user-agent group here.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data for one domain
///
/// An empty body allows everything.
#[derive(Debug, Clone, Default)]
pub struct ParsedRobots {
    body: String,
}

/// Reduces a full user agent string such as `OttoBot/1.0 (+info)` to the product
/// token `OttoBot` that robots.txt groups are matched against
pub fn product_token(user_agent: &str) -> &str {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .find(|part| !part.is_empty())
        .unwrap_or(user_agent)
}

impl ParsedRobots {
    /// Wraps a fetched robots.txt body
    pub fn from_body(body: &str) -> Self {
        Self {
            body: body.to_string(),
        }
    }

    /// Rules that allow every URL
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Checks if `url` may be fetched by `user_agent`
    ///
    /// `url` may be absolute or a path; `user_agent` may be the full header value.
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.body.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.body, product_token(user_agent), url)
    }

    /// Crawl-delay in seconds of the group that applies to `user_agent`
    ///
    /// A group naming the agent wins over the `*` group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        let token = product_token(user_agent).to_ascii_lowercase();
        let mut specific = None;
        let mut wildcard = None;

        let mut group_agents: Vec<String> = Vec::new();
        let mut in_agent_lines = false;

        for line in self.body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match field.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    // Consecutive user-agent lines share one group
                    if !in_agent_lines {
                        group_agents.clear();
                    }
                    group_agents.push(value.to_ascii_lowercase());
                    in_agent_lines = true;
                }
                "crawl-delay" => {
                    in_agent_lines = false;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if group_agents.iter().any(|agent| *agent == token) {
                        specific = specific.or(Some(delay));
                    } else if group_agents.iter().any(|agent| agent == "*") {
                        wildcard = wildcard.or(Some(delay));
                    }
                }
                _ => in_agent_lines = false,
            }
        }

        specific.or(wildcard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_token() {
        assert_eq!(product_token("OttoBot/1.0"), "OttoBot");
        assert_eq!(product_token("OttoBot"), "OttoBot");
        assert_eq!(product_token("OttoBot (+https://example.com/bot)"), "OttoBot");
    }

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("https://example.com/any/path", "OttoBot/1.0"));
        assert!(robots.is_allowed("/admin", "OttoBot/1.0"));
    }

    #[test]
    fn test_disallow_everything() {
        let robots = ParsedRobots::from_body("User-agent: *\nDisallow: /");
        assert!(!robots.is_allowed("https://example.com/", "OttoBot/1.0"));
        assert!(!robots.is_allowed("https://example.com/page", "OttoBot/1.0"));
    }

    #[test]
    fn test_disallow_prefix_with_allow_override() {
        let robots =
            ParsedRobots::from_body("User-agent: *\nDisallow: /private\nAllow: /private/public");
        assert!(robots.is_allowed("https://example.com/listing", "OttoBot/1.0"));
        assert!(!robots.is_allowed("https://example.com/private/x", "OttoBot/1.0"));
        assert!(robots.is_allowed("https://example.com/private/public", "OttoBot/1.0"));
    }

    #[test]
    fn test_group_for_our_agent_takes_precedence() {
        let body = "User-agent: OttoBot\nDisallow: /search\n\nUser-agent: *\nDisallow: /";
        let robots = ParsedRobots::from_body(body);
        assert!(robots.is_allowed("https://example.com/cars", "OttoBot/1.0"));
        assert!(!robots.is_allowed("https://example.com/search?q=x", "OttoBot/1.0"));
        assert!(!robots.is_allowed("https://example.com/cars", "OtherBot/2.0"));
    }

    #[test]
    fn test_garbage_body_allows() {
        let robots = ParsedRobots::from_body("<html>not robots</html>");
        assert!(robots.is_allowed("https://example.com/any", "OttoBot/1.0"));
    }

    #[test]
    fn test_crawl_delay_prefers_named_group() {
        let body = "User-agent: OttoBot\nCrawl-delay: 5\n\nUser-agent: *\nCrawl-delay: 10";
        let robots = ParsedRobots::from_body(body);
        assert_eq!(robots.crawl_delay("OttoBot/1.0"), Some(5.0));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(10.0));
    }

    #[test]
    fn test_crawl_delay_shared_group_and_comments() {
        let body = "User-agent: A\nUser-agent: OttoBot # us\nDisallow: /x\nCrawl-delay: 2.5";
        let robots = ParsedRobots::from_body(body);
        assert_eq!(robots.crawl_delay("OttoBot/1.0"), Some(2.5));
        assert_eq!(robots.crawl_delay("B"), None);
    }

    #[test]
    fn test_crawl_delay_absent() {
        assert_eq!(ParsedRobots::allow_all().crawl_delay("OttoBot"), None);
        let robots = ParsedRobots::from_body("User-agent: *\nDisallow: /admin");
        assert_eq!(robots.crawl_delay("OttoBot"), None);
    }
}
