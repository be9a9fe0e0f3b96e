use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for skeleton discovery
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Defaults applied to newly requested discoveries
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Maximum pages kept per discovery
    #[serde(rename = "default-max-pages", default = "default_max_pages")]
    pub default_max_pages: u32,

    /// Maximum page depth kept per discovery
    #[serde(rename = "default-max-depth", default = "default_max_depth")]
    pub default_max_depth: u32,

    /// How many levels of nested sitemap indexes are followed
    #[serde(rename = "sitemap-max-depth", default = "default_sitemap_max_depth")]
    pub sitemap_max_depth: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            default_max_pages: default_max_pages(),
            default_max_depth: default_max_depth(),
            sitemap_max_depth: default_sitemap_max_depth(),
        }
    }
}

/// Outbound fetch limits
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(rename = "robots-timeout-ms", default = "default_robots_timeout_ms")]
    pub robots_timeout_ms: u64,

    #[serde(rename = "sitemap-timeout-ms", default = "default_sitemap_timeout_ms")]
    pub sitemap_timeout_ms: u64,

    #[serde(rename = "homepage-timeout-ms", default = "default_homepage_timeout_ms")]
    pub homepage_timeout_ms: u64,

    /// Maximum redirect hops followed manually
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Maximum response body size in bytes
    #[serde(rename = "max-body-bytes", default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// Skip the private-IP check (local development and tests only)
    #[serde(rename = "allow-private-hosts", default)]
    pub allow_private_hosts: bool,
}

impl FetchConfig {
    pub fn robots_timeout(&self) -> Duration {
        Duration::from_millis(self.robots_timeout_ms)
    }

    pub fn sitemap_timeout(&self) -> Duration {
        Duration::from_millis(self.sitemap_timeout_ms)
    }

    pub fn homepage_timeout(&self) -> Duration {
        Duration::from_millis(self.homepage_timeout_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            robots_timeout_ms: default_robots_timeout_ms(),
            sitemap_timeout_ms: default_sitemap_timeout_ms(),
            homepage_timeout_ms: default_homepage_timeout_ms(),
            max_redirects: default_max_redirects(),
            max_body_bytes: default_max_body_bytes(),
            allow_private_hosts: false,
        }
    }
}

/// Per-job outbound throughput governor
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum concurrent fetches within one job
    #[serde(
        rename = "max-concurrent-requests",
        default = "default_max_concurrent_requests"
    )]
    pub max_concurrent_requests: u32,

    /// Delay inserted after each completed fetch (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Upper bound applied to a robots.txt Crawl-delay (milliseconds)
    #[serde(rename = "max-crawl-delay-ms", default = "default_max_crawl_delay_ms")]
    pub max_crawl_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
            request_delay_ms: default_request_delay_ms(),
            max_crawl_delay_ms: default_max_crawl_delay_ms(),
        }
    }
}

/// Job-level retry policy
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles on every further attempt
    #[serde(rename = "initial-backoff-ms", default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

/// Worker polling behavior
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// How long an idle worker waits before polling the queue again
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Result snapshot cache
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(rename = "ttl-hours", default = "default_cache_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_cache_ttl_hours(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the token matched against robots.txt groups
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Full user agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }

    /// Token used to select relevant robots.txt user-agent groups
    pub fn bot_token(&self) -> String {
        self.crawler_name.to_lowercase()
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_max_pages() -> u32 {
    10
}

fn default_max_depth() -> u32 {
    1
}

fn default_sitemap_max_depth() -> u32 {
    2
}

fn default_robots_timeout_ms() -> u64 {
    3_000
}

fn default_sitemap_timeout_ms() -> u64 {
    10_000
}

fn default_homepage_timeout_ms() -> u64 {
    5_000
}

fn default_max_redirects() -> u32 {
    5
}

fn default_max_body_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_max_concurrent_requests() -> u32 {
    10
}

fn default_request_delay_ms() -> u64 {
    100
}

fn default_max_crawl_delay_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_cache_ttl_hours() -> u64 {
    24
}
