//! Sitemap XML parsing
//!
//! Supports:
//! - Standard `<urlset>` sitemaps
//! - Sitemap index files (`<sitemapindex>`), resolved recursively
//! - Namespaced and CDATA-wrapped content
//!
//! Parsing never fails the discovery: malformed documents yield no entries.

use crate::crawler::{FetchResult, Fetcher};
use crate::url::same_origin;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// A URL entry from a sitemap
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    /// The page URL
    pub loc: String,
    /// Last modification time (optional)
    pub lastmod: Option<String>,
    /// Change frequency (optional)
    pub changefreq: Option<String>,
    /// Priority (optional)
    pub priority: Option<f32>,
}

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq)]
pub enum SitemapDocument {
    /// `<urlset>`: page entries
    Urlset(Vec<SitemapEntry>),
    /// `<sitemapindex>`: nested sitemap locations
    SitemapIndex(Vec<String>),
    /// Well-formed XML with some other root element
    Unknown,
}

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("Malformed sitemap XML: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Loc,
    Lastmod,
    Changefreq,
    Priority,
}

#[derive(Debug, Default)]
struct EntryBuilder {
    loc: String,
    lastmod: String,
    changefreq: String,
    priority: String,
}

impl EntryBuilder {
    fn append(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Loc => &mut self.loc,
            Field::Lastmod => &mut self.lastmod,
            Field::Changefreq => &mut self.changefreq,
            Field::Priority => &mut self.priority,
        };
        target.push_str(text);
    }

    fn into_entry(self) -> Option<SitemapEntry> {
        let loc = self.loc.trim();
        if loc.is_empty() {
            return None;
        }

        let non_empty = |s: String| {
            let trimmed = s.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        };

        Some(SitemapEntry {
            loc: loc.to_string(),
            priority: self.priority.trim().parse().ok(),
            lastmod: non_empty(self.lastmod),
            changefreq: non_empty(self.changefreq),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
    Urlset,
    Index,
}

/// Parses a sitemap document
///
/// The first element decides the document kind. Elements are matched by
/// local name, so namespace prefixes are ignored. Entries without `<loc>`
/// are skipped.
///
/// # Example
///
/// ```
/// use skeleton_discovery::crawler::{parse_sitemap_document, SitemapDocument};
///
/// let xml = r#"<urlset><url><loc>https://example.com/a</loc></url></urlset>"#;
/// match parse_sitemap_document(xml).unwrap() {
///     SitemapDocument::Urlset(entries) => assert_eq!(entries[0].loc, "https://example.com/a"),
///     other => panic!("unexpected {:?}", other),
/// }
/// ```
pub fn parse_sitemap_document(xml: &str) -> Result<SitemapDocument, SitemapError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root: Option<Root> = None;
    let mut entries = Vec::new();
    let mut nested = Vec::new();
    let mut current: Option<EntryBuilder> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                match (root, name.as_ref()) {
                    (None, b"urlset") => root = Some(Root::Urlset),
                    (None, b"sitemapindex") => root = Some(Root::Index),
                    (None, _) => return Ok(SitemapDocument::Unknown),
                    (Some(Root::Urlset), b"url") | (Some(Root::Index), b"sitemap") => {
                        current = Some(EntryBuilder::default());
                    }
                    (Some(_), b"loc") => field = Some(Field::Loc),
                    (Some(_), b"lastmod") => field = Some(Field::Lastmod),
                    (Some(_), b"changefreq") => field = Some(Field::Changefreq),
                    (Some(_), b"priority") => field = Some(Field::Priority),
                    _ => field = None,
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(f), Some(entry)) = (field, current.as_mut()) {
                    let text = t
                        .unescape()
                        .map_err(|e| SitemapError::Malformed(e.to_string()))?;
                    entry.append(f, &text);
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(f), Some(entry)) = (field, current.as_mut()) {
                    entry.append(f, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"url" if root == Some(Root::Urlset) => {
                    if let Some(entry) = current.take().and_then(EntryBuilder::into_entry) {
                        entries.push(entry);
                    }
                }
                b"sitemap" if root == Some(Root::Index) => {
                    if let Some(entry) = current.take().and_then(EntryBuilder::into_entry) {
                        nested.push(entry.loc);
                    }
                }
                _ => field = None,
            },
            Ok(Event::Empty(e)) => {
                if root.is_none() {
                    return Ok(match e.local_name().as_ref() {
                        b"urlset" => SitemapDocument::Urlset(Vec::new()),
                        b"sitemapindex" => SitemapDocument::SitemapIndex(Vec::new()),
                        _ => SitemapDocument::Unknown,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SitemapError::Malformed(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(match root {
        Some(Root::Urlset) => SitemapDocument::Urlset(entries),
        Some(Root::Index) => SitemapDocument::SitemapIndex(nested),
        None => SitemapDocument::Unknown,
    })
}

/// Entries gathered from one sitemap URL and everything it nests
#[derive(Debug, Default)]
pub struct SitemapFetch {
    pub entries: Vec<SitemapEntry>,
    /// True if the sitemap itself could not be reached
    pub unreachable: bool,
}

/// Fetches sitemaps and follows sitemap indexes for one homepage
///
/// Nested sitemaps are followed only on the homepage's origin and only up to
/// `max_depth` levels; each sitemap URL is fetched at most once. Page entries
/// on other origins are dropped.
pub struct SitemapCollector<'a> {
    fetcher: &'a Fetcher,
    homepage: &'a Url,
    max_depth: u32,
    visited: Mutex<HashSet<String>>,
}

impl<'a> SitemapCollector<'a> {
    pub fn new(fetcher: &'a Fetcher, homepage: &'a Url, max_depth: u32) -> Self {
        Self {
            fetcher,
            homepage,
            max_depth,
            visited: Mutex::new(HashSet::new()),
        }
    }

    /// Fetches `url` and returns its page entries, recursing into indexes
    ///
    /// Every failure (non-2xx, timeout, malformed XML) is logged and yields
    /// no entries.
    pub fn collect(&self, url: Url, depth: u32) -> BoxFuture<'_, SitemapFetch> {
        async move {
            if depth > self.max_depth {
                debug!("Sitemap nesting limit reached, skipping {}", url);
                return SitemapFetch::default();
            }

            if !self.mark_visited(&url) {
                debug!("Sitemap already visited: {}", url);
                return SitemapFetch::default();
            }

            let xml = match self.fetcher.fetch_sitemap(&url).await {
                FetchResult::Success { body, .. } => body,
                other => {
                    debug!("Sitemap {} not available: {}", url, other.describe());
                    return SitemapFetch {
                        entries: Vec::new(),
                        unreachable: other.is_unreachable(),
                    };
                }
            };

            match parse_sitemap_document(&xml) {
                Ok(SitemapDocument::Urlset(entries)) => {
                    let total = entries.len();
                    let entries: Vec<SitemapEntry> = entries
                        .into_iter()
                        .filter(|entry| self.on_homepage_origin(&entry.loc))
                        .collect();
                    debug!(
                        "Sitemap {} listed {} URLs ({} on homepage origin)",
                        url,
                        total,
                        entries.len()
                    );
                    SitemapFetch {
                        entries,
                        unreachable: false,
                    }
                }
                Ok(SitemapDocument::SitemapIndex(locations)) => {
                    let nested: Vec<Url> = locations
                        .iter()
                        .filter_map(|loc| Url::parse(loc).ok())
                        .filter(|nested| same_origin(nested, self.homepage))
                        .collect();
                    debug!(
                        "Sitemap index {} lists {} sitemaps ({} followed)",
                        url,
                        locations.len(),
                        nested.len()
                    );

                    let results =
                        join_all(nested.into_iter().map(|n| self.collect(n, depth + 1))).await;

                    SitemapFetch {
                        entries: results.into_iter().flat_map(|r| r.entries).collect(),
                        unreachable: false,
                    }
                }
                Ok(SitemapDocument::Unknown) => {
                    warn!("Unrecognized sitemap root element at {}", url);
                    SitemapFetch::default()
                }
                Err(e) => {
                    warn!("Failed to parse sitemap {}: {}", url, e);
                    SitemapFetch::default()
                }
            }
        }
        .boxed()
    }

    fn mark_visited(&self, url: &Url) -> bool {
        match self.visited.lock() {
            Ok(mut visited) => visited.insert(url.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(url.to_string()),
        }
    }

    fn on_homepage_origin(&self, loc: &str) -> bool {
        Url::parse(loc).is_ok_and(|url| same_origin(&url, self.homepage))
    }
}
