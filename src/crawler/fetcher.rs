//! HTTP fetcher implementation
//!
//! This module handles all outbound requests of a discovery job:
//! - Building HTTP clients with proper user agent strings
//! - Manual redirect handling with per-hop SSRF and origin checks
//! - Per-resource timeouts
//! - Response size limits
//! - Error classification

use crate::config::{FetchConfig, UserAgentConfig};
use crate::crawler::RateLimiter;
use crate::url::{same_origin, UrlRejection, UrlValidator};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched the resource
    Success {
        /// Final URL after redirects
        final_url: Url,
        /// HTTP status code
        status_code: u16,
        /// Content-Type header value
        content_type: String,
        /// Response body
        body: String,
    },

    /// Non-2xx response
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Redirect could not be followed (too many hops, missing Location)
    RedirectError {
        /// Error description
        error: String,
    },

    /// The request target or a redirect hop failed URL validation
    Rejected {
        /// The URL that was refused
        url: String,
        /// Why it was refused
        reason: UrlRejection,
    },

    /// Body exceeded the configured size limit
    TooLarge {
        /// The limit in bytes
        limit: u64,
    },

    /// Network error (connection refused, timeout, etc.)
    NetworkError {
        /// Error description
        error: String,
        /// True if the request hit its deadline
        timed_out: bool,
    },
}

impl FetchResult {
    /// Returns true if the server could not be reached at all
    ///
    /// HTTP errors and rejected redirects mean the host answered, so they
    /// are not considered unreachable.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::NetworkError { .. })
    }

    /// Short human-readable description for logs and error messages
    pub fn describe(&self) -> String {
        match self {
            Self::Success { status_code, .. } => format!("HTTP {}", status_code),
            Self::HttpError { status_code } => format!("HTTP {}", status_code),
            Self::RedirectError { error } => format!("redirect failed: {}", error),
            Self::Rejected { url, reason } => format!("rejected {}: {}", url, reason),
            Self::TooLarge { limit } => format!("response larger than {} bytes", limit),
            Self::NetworkError { error, .. } => error.clone(),
        }
    }
}

/// The kind of resource being fetched; selects timeout and Accept header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Robots,
    Sitemap,
    Homepage,
}

impl FetchKind {
    fn accept(self) -> &'static str {
        match self {
            Self::Robots => "text/plain, */*;q=0.5",
            Self::Sitemap => "application/xml, text/xml;q=0.9, */*;q=0.5",
            Self::Homepage => "text/html, application/xhtml+xml;q=0.9, */*;q=0.5",
        }
    }

    fn timeout(self, config: &FetchConfig) -> Duration {
        match self {
            Self::Robots => config.robots_timeout(),
            Self::Sitemap => config.sitemap_timeout(),
            Self::Homepage => config.homepage_timeout(),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are disabled on the client: every hop is validated by
/// [`Fetcher`] before it is followed. Per-request deadlines are applied by
/// the fetcher, so only the connect timeout is set here.
///
/// # Example
///
/// ```no_run
/// use skeleton_discovery::config::UserAgentConfig;
/// use skeleton_discovery::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SkeletonBot".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/bot".to_string(),
///     contact_email: "bot@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches robots.txt, sitemaps and homepages for one discovery job
///
/// Every request goes through the job's [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    validator: UrlValidator,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(client: Client, limiter: Arc<RateLimiter>, config: FetchConfig) -> Self {
        Self {
            client,
            limiter,
            validator: UrlValidator::new(config.allow_private_hosts),
            config,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn validator(&self) -> UrlValidator {
        self.validator
    }

    pub async fn fetch_robots_txt(&self, url: &Url) -> FetchResult {
        self.fetch(url, FetchKind::Robots).await
    }

    pub async fn fetch_sitemap(&self, url: &Url) -> FetchResult {
        self.fetch(url, FetchKind::Sitemap).await
    }

    pub async fn fetch_homepage(&self, url: &Url) -> FetchResult {
        self.fetch(url, FetchKind::Homepage).await
    }

    /// Fetches a URL under the rate limiter with the timeout of `kind`
    ///
    /// # Request Flow
    ///
    /// 1. Validate the target (protocol, private host)
    /// 2. Send GET; on 3xx resolve `Location` against the current URL
    /// 3. Each hop must stay on the origin of the first URL and pass
    ///    validation; at most `max_redirects` hops are followed
    /// 4. Non-2xx → `HttpError`
    /// 5. Body is read in chunks and abandoned once it exceeds
    ///    `max_body_bytes`
    ///
    /// The whole chain, including body download, shares one deadline.
    pub async fn fetch(&self, url: &Url, kind: FetchKind) -> FetchResult {
        let timeout = kind.timeout(&self.config);

        self.limiter
            .run(async {
                match tokio::time::timeout(timeout, self.fetch_following_redirects(url, kind)).await
                {
                    Ok(result) => result,
                    Err(_) => FetchResult::NetworkError {
                        error: format!("Request timeout after {}ms", timeout.as_millis()),
                        timed_out: true,
                    },
                }
            })
            .await
    }

    async fn fetch_following_redirects(&self, initial: &Url, kind: FetchKind) -> FetchResult {
        if let Err(reason) = self.validator.check_target(initial) {
            return FetchResult::Rejected {
                url: initial.to_string(),
                reason,
            };
        }

        let mut current = initial.clone();
        let mut hops = 0;

        loop {
            let response = match self
                .client
                .get(current.clone())
                .header(ACCEPT, kind.accept())
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => return classify_error(e),
            };

            let status = response.status();

            if is_redirect(status) {
                if hops >= self.config.max_redirects {
                    return FetchResult::RedirectError {
                        error: format!("Too many redirects (> {})", self.config.max_redirects),
                    };
                }

                let next = match redirect_target(&response, &current) {
                    Ok(next) => next,
                    Err(error) => return FetchResult::RedirectError { error },
                };

                if !same_origin(&next, initial) {
                    return FetchResult::Rejected {
                        url: next.to_string(),
                        reason: UrlRejection::CrossOrigin(next.origin().ascii_serialization()),
                    };
                }

                if let Err(reason) = self.validator.check_target(&next) {
                    return FetchResult::Rejected {
                        url: next.to_string(),
                        reason,
                    };
                }

                tracing::debug!("Following redirect {} -> {}", current, next);
                current = next;
                hops += 1;
                continue;
            }

            if !status.is_success() {
                return FetchResult::HttpError {
                    status_code: status.as_u16(),
                };
            }

            let limit = self.config.max_body_bytes;
            if response.content_length().is_some_and(|len| len > limit) {
                return FetchResult::TooLarge { limit };
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            return match read_body_capped(response, limit).await {
                Ok(Some(bytes)) => FetchResult::Success {
                    final_url: current,
                    status_code: status.as_u16(),
                    content_type,
                    body: String::from_utf8_lossy(&bytes).into_owned(),
                },
                Ok(None) => FetchResult::TooLarge { limit },
                Err(e) => classify_error(e),
            };
        }
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn redirect_target(response: &Response, current: &Url) -> Result<Url, String> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "Redirect without Location header".to_string())?;

    current
        .join(location)
        .map_err(|e| format!("Invalid redirect location '{}': {}", location, e))
}

/// Reads the body chunk by chunk; `None` once the limit is exceeded
async fn read_body_capped(
    mut response: Response,
    limit: u64,
) -> Result<Option<Vec<u8>>, reqwest::Error> {
    let mut body = Vec::new();

    while let Some(chunk) = response.chunk().await? {
        if (body.len() + chunk.len()) as u64 > limit {
            return Ok(None);
        }
        body.extend_from_slice(&chunk);
    }

    Ok(Some(body))
}

fn classify_error(e: reqwest::Error) -> FetchResult {
    if e.is_timeout() {
        FetchResult::NetworkError {
            error: "Request timeout".to_string(),
            timed_out: true,
        }
    } else if e.is_connect() {
        FetchResult::NetworkError {
            error: format!("Connection failed: {}", e),
            timed_out: false,
        }
    } else {
        FetchResult::NetworkError {
            error: e.to_string(),
            timed_out: false,
        }
    }
}
