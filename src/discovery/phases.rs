//! The two discovery phases
//!
//! Each phase turns network input into validated, robots-allowed,
//! deduplicated page candidates. A phase only fails when its source could
//! not be reached at all (or, for sitemaps, when nothing was fetchable);
//! empty or broken documents just yield no pages.

use crate::crawler::{parse_homepage_html, FetchResult, Fetcher, SitemapCollector};
use crate::robots::RobotsRules;
use crate::state::{PageSource, Phase};
use crate::storage::NewPage;
use crate::url::{dedupe, dedupe_by, UrlValidator};
use crate::{DiscoveryError, Result};
use futures::future::join_all;
use tracing::debug;
use url::Url;

/// Well-known sitemap locations tried on every site
pub const SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml"];

/// Shared inputs of both phases for one job run
pub struct PhaseContext<'a> {
    pub fetcher: &'a Fetcher,
    pub homepage: &'a Url,
    pub robots: &'a RobotsRules,
    pub validator: UrlValidator,
    pub sitemap_max_depth: u32,
}

impl PhaseContext<'_> {
    /// Validates a candidate URL and checks it against robots rules
    fn accept(&self, candidate: &str) -> Option<Url> {
        let url = match self.validator.validate(candidate, self.homepage) {
            Ok(url) => url,
            Err(reason) => {
                debug!(url = candidate, "Skipping candidate: {}", reason);
                return None;
            }
        };

        if !self.robots.allows_url(&url) {
            debug!(url = candidate, "Skipping candidate disallowed by robots.txt");
            return None;
        }

        Some(url)
    }
}

/// Sitemap URLs to try: the well-known paths plus robots.txt declarations
///
/// Declared sitemaps must pass the same validation as pages (same origin,
/// no private hosts).
pub fn sitemap_candidates(ctx: &PhaseContext<'_>) -> Vec<Url> {
    let well_known = SITEMAP_PATHS
        .iter()
        .filter_map(|path| ctx.homepage.join(path).ok())
        .map(|url| url.to_string());
    let declared = ctx.robots.sitemap_urls.iter().cloned();
    let all: Vec<String> = well_known.chain(declared).collect();

    dedupe(&all)
        .iter()
        .filter_map(|candidate| match ctx.validator.validate(candidate, ctx.homepage) {
            Ok(url) => Some(url),
            Err(reason) => {
                debug!(url = %candidate, "Skipping sitemap candidate: {}", reason);
                None
            }
        })
        .collect()
}

/// Collects depth-0 pages from the site's sitemaps
///
/// Candidates are fetched concurrently through the job's rate limiter;
/// results keep candidate order.
///
/// # Errors
///
/// `PhaseFailed` if no candidate passed validation or every candidate was
/// unreachable (network error or timeout). 404s and malformed XML are not
/// failures.
pub async fn run_sitemap_phase(ctx: &PhaseContext<'_>) -> Result<Vec<NewPage>> {
    let candidates = sitemap_candidates(ctx);
    if candidates.is_empty() {
        return Err(DiscoveryError::PhaseFailed {
            phase: Phase::Sitemap,
            reason: "no sitemap candidate passed validation".to_string(),
        });
    }

    let collector = SitemapCollector::new(ctx.fetcher, ctx.homepage, ctx.sitemap_max_depth);

    let results = join_all(
        candidates
            .iter()
            .map(|candidate| collector.collect(candidate.clone(), 0)),
    )
    .await;

    if !results.is_empty() && results.iter().all(|result| result.unreachable) {
        return Err(DiscoveryError::PhaseFailed {
            phase: Phase::Sitemap,
            reason: format!("all {} sitemap candidates unreachable", results.len()),
        });
    }

    let pages: Vec<NewPage> = results
        .into_iter()
        .flat_map(|result| result.entries)
        .filter(|entry| ctx.accept(&entry.loc).is_some())
        .map(|entry| NewPage::new(entry.loc, PageSource::Sitemap, 0))
        .collect();

    Ok(dedupe_by(pages, |page| page.url.as_str()))
}

/// Output of the navigation phase
#[derive(Debug, Default)]
pub struct NavigationOutput {
    pub pages: Vec<NewPage>,
    /// Sanitized `<title>` of the homepage
    pub homepage_title: Option<String>,
}

/// Collects depth-1 pages from the homepage's navigation links
///
/// # Errors
///
/// `PhaseFailed` if the homepage could not be fetched (unreachable,
/// non-2xx, rejected redirect or oversized).
pub async fn run_navigation_phase(ctx: &PhaseContext<'_>) -> Result<NavigationOutput> {
    let html = match ctx.fetcher.fetch_homepage(ctx.homepage).await {
        FetchResult::Success { body, .. } => body,
        other => {
            return Err(DiscoveryError::PhaseFailed {
                phase: Phase::Navigation,
                reason: format!("homepage fetch failed: {}", other.describe()),
            })
        }
    };

    let parsed = parse_homepage_html(&html, ctx.homepage);
    let found = parsed.links.len();

    let pages: Vec<NewPage> = parsed
        .links
        .into_iter()
        .filter(|link| ctx.accept(&link.url).is_some())
        .map(|link| NewPage::new(link.url, PageSource::Navigation, 1).with_title(Some(link.text)))
        .collect();
    let pages = dedupe_by(pages, |page| page.url.as_str());

    debug!(
        "Navigation phase kept {} of {} links from {}",
        pages.len(),
        found,
        ctx.homepage
    );

    Ok(NavigationOutput {
        pages,
        homepage_title: parsed.title,
    })
}
