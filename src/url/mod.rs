//! URL handling module
//!
//! This module provides URL normalization and deduplication, the SSRF
//! denylist, candidate URL validation, and homepage parsing.

mod normalize;
mod safety;

use crate::{UrlError, UrlResult};
use url::Url;

// Re-export main functions
pub use normalize::{dedupe, dedupe_by, normalize};
pub use safety::{is_private_host, validate_url, UrlRejection, UrlValidator};

/// Parses a homepage URL submitted for discovery
///
/// Only absolute http(s) URLs with a host are accepted. The fragment is
/// dropped since it never reaches the server.
///
/// # Examples
///
/// ```
/// use skeleton_discovery::url::parse_homepage;
///
/// let url = parse_homepage("https://example.com/#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/");
/// assert!(parse_homepage("ftp://example.com").is_err());
/// ```
pub fn parse_homepage(url_str: &str) -> UrlResult<Url> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);
    Ok(url)
}

/// Returns true if both URLs share scheme, host and port
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}
