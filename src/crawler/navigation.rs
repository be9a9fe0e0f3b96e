//! Homepage navigation extraction
//!
//! This module parses homepage HTML to extract:
//! - Internal navigation links, in selector priority order
//! - Sanitized link text used as page titles
//! - The homepage `<title>`

use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::url::same_origin;

/// Maximum length of sanitized link text, in characters
pub const MAX_TEXT_LENGTH: usize = 500;

/// Structural selectors, highest priority first
const NAV_SELECTORS: &[&str] = &[
    "nav a[href]",
    "[role='navigation'] a[href]",
    "header nav a[href]",
    ".nav a[href]",
    ".navbar a[href]",
    ".navigation a[href]",
    ".menu a[href]",
    ".main-menu a[href]",
    "#nav a[href]",
    "#menu a[href]",
    "#navigation a[href]",
];

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// A navigation link found on the homepage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationLink {
    /// Absolute, fragment-free URL on the homepage origin
    pub url: String,
    /// Sanitized link text; empty for icon-only links
    pub text: String,
}

/// Extracted information from the homepage
#[derive(Debug, Clone, Default)]
pub struct ParsedHomepage {
    pub title: Option<String>,
    pub links: Vec<NavigationLink>,
}

/// Parses homepage HTML into its title and navigation links
pub fn parse_homepage_html(html: &str, homepage: &Url) -> ParsedHomepage {
    let document = Html::parse_document(html);

    ParsedHomepage {
        title: extract_title(&document),
        links: collect_nav_links(&document, homepage),
    }
}

/// Extracts navigation links from homepage HTML
///
/// # Extraction Rules
///
/// - Selectors are applied in priority order: `<nav>`, ARIA
///   `role=navigation`, header-nested nav, then common class and id names
/// - `href` is resolved against the homepage; `javascript:`, `mailto:`,
///   `tel:`, `data:` and fragment-only links are skipped
/// - Only links on the homepage origin are kept, with the fragment removed
/// - A URL matched by several selectors keeps the text of the first match
///
/// # Example
///
/// ```
/// use skeleton_discovery::crawler::extract_nav;
/// use url::Url;
///
/// let html = r#"<nav><a href="/about">About <b>us</b></a><a href="https://other.com/">x</a></nav>"#;
/// let homepage = Url::parse("https://example.com/").unwrap();
/// let links = extract_nav(html, &homepage);
/// assert_eq!(links.len(), 1);
/// assert_eq!(links[0].url, "https://example.com/about");
/// assert_eq!(links[0].text, "About us");
/// ```
pub fn extract_nav(html: &str, homepage: &Url) -> Vec<NavigationLink> {
    collect_nav_links(&Html::parse_document(html), homepage)
}

fn collect_nav_links(document: &Html, homepage: &Url) -> Vec<NavigationLink> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for selector_str in NAV_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };

        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(url) = resolve_link(href, homepage) else {
                continue;
            };
            if !same_origin(&url, homepage) {
                continue;
            }

            let url = url.to_string();
            if seen.insert(url.clone()) {
                let raw_text = element.text().collect::<String>();
                links.push(NavigationLink {
                    url,
                    text: sanitize_text(&raw_text),
                });
            }
        }
    }

    links
}

/// Strips markup from link text, collapses whitespace and truncates
///
/// # Example
///
/// ```
/// use skeleton_discovery::crawler::sanitize_text;
///
/// assert_eq!(sanitize_text("  <script>x</script> Our\n  Team "), "x Our Team");
/// ```
pub fn sanitize_text(raw: &str) -> String {
    let stripped = TAG_RE.replace_all(raw, " ");
    let stripped = stripped.replace(['<', '>'], "");
    let collapsed = WHITESPACE_RE.replace_all(&stripped, " ");
    collapsed.trim().chars().take(MAX_TEXT_LENGTH).collect()
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| sanitize_text(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// Resolves a link href to an absolute, fragment-free URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut url = base_url.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }

    url.set_fragment(None);
    Some(url)
}
