//! Crawler module for outbound fetching and document parsing
//!
//! This module contains the network-facing pieces of a discovery job:
//! - HTTP fetching with redirect, size and timeout protections
//! - Per-job rate limiting
//! - Sitemap parsing and sitemap index resolution
//! - Homepage navigation extraction

mod fetcher;
mod limiter;
mod navigation;
mod sitemap;

pub use fetcher::{build_http_client, FetchKind, FetchResult, Fetcher};
pub use limiter::RateLimiter;
pub use navigation::{
    extract_nav, parse_homepage_html, sanitize_text, NavigationLink, ParsedHomepage,
    MAX_TEXT_LENGTH,
};
pub use sitemap::{
    parse_sitemap_document, SitemapCollector, SitemapDocument, SitemapEntry, SitemapError,
    SitemapFetch,
};
