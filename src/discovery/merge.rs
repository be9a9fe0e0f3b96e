//! Merging and prioritizing phase results
//!
//! The two phases can find the same page; the final list keeps one record
//! per normalized URL, ordered so that the most useful pages survive
//! truncation.

use crate::state::PageSource;
use crate::storage::NewPage;
use crate::url::normalize;
use std::collections::HashMap;
use url::Url;

/// Unions sitemap and navigation pages keyed by normalized URL
///
/// On collision the sitemap record wins; if it has no title, the navigation
/// link text is used. Encounter order is preserved: sitemap pages first,
/// then navigation-only pages.
pub fn merge_pages(sitemap: Vec<NewPage>, navigation: Vec<NewPage>) -> Vec<NewPage> {
    let mut merged: Vec<NewPage> = Vec::with_capacity(sitemap.len() + navigation.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for page in sitemap.into_iter().chain(navigation) {
        let key = normalize(&page.url);
        match index.get(&key) {
            Some(&existing) => {
                let kept = &mut merged[existing];
                if page.source.rank() < kept.source.rank() {
                    let fallback_title = kept.title.take();
                    *kept = page;
                    if kept.title.is_none() {
                        kept.title = fallback_title;
                    }
                } else if kept.title.is_none() {
                    kept.title = page.title;
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(page);
            }
        }
    }

    merged
}

/// Builds the synthetic homepage record used when no phase found anything
pub fn homepage_page(homepage: &Url, title: Option<String>) -> NewPage {
    NewPage::new(homepage.as_str(), PageSource::Navigation, 0).with_title(title)
}

/// Orders, filters and truncates merged pages
///
/// 1. The homepage is always depth 0 and takes the homepage title if it
///    has none
/// 2. Pages deeper than `max_depth` are dropped
/// 3. Stable sort by depth, then source (SITEMAP before NAVIGATION)
/// 4. The homepage, if present, moves to the front
/// 5. At most `max_pages` are kept
pub fn prioritize(
    mut pages: Vec<NewPage>,
    homepage: &Url,
    homepage_title: Option<&str>,
    max_pages: usize,
    max_depth: u32,
) -> Vec<NewPage> {
    let homepage_key = normalize(homepage.as_str());

    for page in pages.iter_mut() {
        if normalize(&page.url) == homepage_key {
            page.depth = 0;
            if page.title.is_none() {
                page.title = homepage_title.map(str::to_string);
            }
        }
    }

    pages.retain(|page| page.depth <= max_depth);
    pages.sort_by_key(|page| (page.depth, page.source.rank()));

    if let Some(pos) = pages
        .iter()
        .position(|page| normalize(&page.url) == homepage_key)
    {
        let home = pages.remove(pos);
        pages.insert(0, home);
    }

    pages.truncate(max_pages);
    pages
}
