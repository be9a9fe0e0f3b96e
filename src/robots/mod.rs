//! Robots.txt handling module
//!
//! This module fetches and parses robots.txt for a discovery job. A missing
//! or unreachable robots.txt means everything is allowed.

mod parser;

pub use parser::{is_path_allowed, parse_robots, RobotsRules};

use crate::crawler::{FetchResult, Fetcher};
use url::Url;

/// Fetches robots.txt from the origin of `base_url`
///
/// # Returns
///
/// * `Some(String)` - The body of a 2xx response
/// * `None` - Non-2xx, network failure, timeout or rejected URL
pub async fn fetch_robots(fetcher: &Fetcher, base_url: &Url) -> Option<String> {
    let robots_url = match base_url.join("/robots.txt") {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Cannot build robots.txt URL from {}: {}", base_url, e);
            return None;
        }
    };

    match fetcher.fetch_robots_txt(&robots_url).await {
        FetchResult::Success { body, .. } => Some(body),
        other => {
            tracing::info!(
                "No usable robots.txt at {} ({}), allowing all",
                robots_url,
                other.describe()
            );
            None
        }
    }
}

/// Fetches and parses robots.txt, falling back to allow-all
pub async fn load_robots(fetcher: &Fetcher, base_url: &Url, bot_token: &str) -> RobotsRules {
    match fetch_robots(fetcher, base_url).await {
        Some(content) => {
            let rules = parse_robots(&content, bot_token);
            tracing::debug!(
                "Parsed robots.txt: {} disallow rules, {} sitemaps, crawl-delay {:?}",
                rules.disallowed_paths.len(),
                rules.sitemap_urls.len(),
                rules.crawl_delay
            );
            rules
        }
        None => RobotsRules::allow_all(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetchConfig, UserAgentConfig};
    use crate::crawler::{build_http_client, RateLimiter};
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        let user_agent = UserAgentConfig {
            crawler_name: "SkeletonBot".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        };
        let config = FetchConfig {
            allow_private_hosts: true,
            ..FetchConfig::default()
        };
        Fetcher::new(
            build_http_client(&user_agent).unwrap(),
            Arc::new(RateLimiter::new(2, Duration::ZERO, Duration::ZERO)),
            config,
        )
    }

    #[tokio::test]
    async fn test_load_robots_parses_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /admin\nCrawl-delay: 1"),
            )
            .mount(&server)
            .await;

        let base = Url::parse(&format!("{}/some/page", server.uri())).unwrap();
        let rules = load_robots(&fetcher(), &base, "skeletonbot").await;
        assert_eq!(rules.disallowed_paths, vec!["/admin".to_string()]);
        assert_eq!(rules.crawl_delay, Some(1.0));
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        assert!(fetch_robots(&fetcher(), &base).await.is_none());
        assert_eq!(
            load_robots(&fetcher(), &base, "skeletonbot").await,
            RobotsRules::allow_all()
        );
    }
}
