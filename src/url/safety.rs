//! SSRF denylist and candidate URL validation
//!
//! Pure functions, no I/O. Hostnames that are not IP literals are always
//! treated as public; resolving them (and defending against DNS rebinding)
//! is outside what this module checks.

use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

/// Why a candidate URL was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlRejection {
    #[error("invalid URL format")]
    InvalidFormat,

    #[error("protocol not allowed: {0}")]
    DisallowedProtocol(String),

    #[error("private or reserved host: {0}")]
    PrivateIp(String),

    #[error("cross-origin URL: {0}")]
    CrossOrigin(String),
}

/// Returns true if the hostname is a private or reserved IP literal
///
/// Covers IPv4 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16, 127.0.0.0/8,
/// 169.254.0.0/16, and IPv6 loopback `::1` and link-local `fe80::/10`.
/// Bracketed IPv6 literals (`[::1]`) are accepted.
///
/// # Examples
///
/// ```
/// use skeleton_discovery::url::is_private_host;
///
/// assert!(is_private_host("192.168.1.10"));
/// assert!(is_private_host("[::1]"));
/// assert!(!is_private_host("8.8.8.8"));
/// assert!(!is_private_host("localhost.example.com"));
/// ```
pub fn is_private_host(hostname: &str) -> bool {
    let host = hostname.trim_start_matches('[').trim_end_matches(']');

    if let Ok(v4) = host.parse::<Ipv4Addr>() {
        return is_private_v4(v4);
    }

    if let Ok(v6) = host.parse::<Ipv6Addr>() {
        return is_private_v6(v6);
    }

    false
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    a == 10
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
        || a == 127
        || (a == 169 && b == 254)
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_private_v4(mapped);
    }
    ip.is_loopback() || (ip.segments()[0] & 0xffc0) == 0xfe80
}

fn is_private_url_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => is_private_v4(ip),
        Some(Host::Ipv6(ip)) => is_private_v6(ip),
        Some(Host::Domain(domain)) => is_private_host(domain),
        None => false,
    }
}

/// Validation rules applied to every URL the discovery pipeline touches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlValidator {
    allow_private_hosts: bool,
}

impl UrlValidator {
    /// Rejects private hosts
    pub fn strict() -> Self {
        Self::default()
    }

    /// Creates a validator; `allow_private_hosts` only disables the
    /// private-IP rule
    pub fn new(allow_private_hosts: bool) -> Self {
        Self {
            allow_private_hosts,
        }
    }

    /// Checks protocol and host of a URL that is about to be fetched
    pub fn check_target(&self, url: &Url) -> Result<(), UrlRejection> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(UrlRejection::DisallowedProtocol(other.to_string())),
        }

        if url.host().is_none() {
            return Err(UrlRejection::InvalidFormat);
        }

        if !self.allow_private_hosts && is_private_url_host(url) {
            return Err(UrlRejection::PrivateIp(
                url.host_str().unwrap_or_default().to_string(),
            ));
        }

        Ok(())
    }

    /// Validates a candidate URL against the homepage
    ///
    /// Rules are applied in order: parseable, http/https only, not a private
    /// host, same origin (scheme, host and port) as the homepage.
    pub fn validate(&self, candidate: &str, homepage: &Url) -> Result<Url, UrlRejection> {
        let url = Url::parse(candidate).map_err(|_| UrlRejection::InvalidFormat)?;
        self.check_target(&url)?;

        if url.origin() != homepage.origin() {
            return Err(UrlRejection::CrossOrigin(url.origin().ascii_serialization()));
        }

        Ok(url)
    }
}

/// Validates a candidate URL against a homepage with the strict rules
///
/// # Examples
///
/// ```
/// use skeleton_discovery::url::{validate_url, UrlRejection};
///
/// assert!(validate_url("https://example.com/about", "https://example.com/").is_ok());
/// assert!(matches!(
///     validate_url("ftp://example.com/file", "https://example.com/"),
///     Err(UrlRejection::DisallowedProtocol(_))
/// ));
/// ```
pub fn validate_url(candidate: &str, homepage: &str) -> Result<Url, UrlRejection> {
    let homepage = Url::parse(homepage).map_err(|_| UrlRejection::InvalidFormat)?;
    UrlValidator::strict().validate(candidate, &homepage)
}
