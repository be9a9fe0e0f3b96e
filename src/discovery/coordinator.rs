//! Discovery job coordinator
//!
//! Runs one attempt of a discovery job end to end: robots.txt, the sitemap
//! phase, the navigation phase, merging and persistence. Failures of a single
//! phase degrade the result to partial; only a job-level failure goes through
//! the retry policy.

use crate::cache::{DiscoverySnapshot, SnapshotCache};
use crate::config::Config;
use crate::crawler::{build_http_client, Fetcher, RateLimiter};
use crate::discovery::merge::{homepage_page, merge_pages, prioritize};
use crate::discovery::phases::{run_navigation_phase, run_sitemap_phase, PhaseContext};
use crate::discovery::retry::Attempt;
use crate::queue::{JobRequest, JobResult};
use crate::robots::load_robots;
use crate::state::{DiscoveryStatus, Phase};
use crate::storage::{ErrorDetails, NewPage, SqliteStorage, Storage, StorageError, StorageResult};
use crate::url::parse_homepage;
use crate::{DiscoveryError, Result};
use reqwest::Client;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

/// What an attempt has gathered so far
///
/// Kept outside the attempt's happy path so a failing final attempt can
/// still persist whatever was collected.
#[derive(Debug, Default)]
pub struct JobProgress {
    pub phase_failures: BTreeSet<Phase>,
    /// Merged pages of the phases that completed
    pub pages: Vec<NewPage>,
    pub homepage_title: Option<String>,
}

impl JobProgress {
    fn record_failure(&mut self, discovery_id: &str, phase: Phase, err: &DiscoveryError) {
        warn!(discovery_id, phase = %phase, "Phase failed: {}", err);
        self.phase_failures.insert(phase);
    }

    fn all_phases_failed(&self) -> bool {
        self.phase_failures.contains(&Phase::Sitemap)
            && self.phase_failures.contains(&Phase::Navigation)
    }
}

/// Runs discovery jobs against shared storage and cache
pub struct Coordinator {
    config: Arc<Config>,
    storage: Arc<Mutex<SqliteStorage>>,
    cache: Arc<dyn SnapshotCache>,
    client: Client,
}

impl Coordinator {
    /// Creates a coordinator
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(
        config: Arc<Config>,
        storage: Arc<Mutex<SqliteStorage>>,
        cache: Arc<dyn SnapshotCache>,
    ) -> Result<Self> {
        let client = build_http_client(&config.user_agent)?;

        Ok(Self {
            config,
            storage,
            cache,
            client,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }

    pub fn cache(&self) -> Arc<dyn SnapshotCache> {
        Arc::clone(&self.cache)
    }

    /// Runs `op` with the storage lock held
    fn with_storage<T>(
        &self,
        op: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
    ) -> Result<T> {
        let mut storage = self
            .storage
            .lock()
            .map_err(|_| DiscoveryError::LockPoisoned)?;
        Ok(op(&mut storage)?)
    }

    /// Runs one attempt of a discovery job
    ///
    /// # Returns
    ///
    /// * `Ok(JobResult)` - The discovery reached a terminal status, either in
    ///   this attempt or before it
    /// * `Err(DiscoveryError)` - The attempt failed and the queue should retry
    ///   (or drop, for `NotFound`) the job
    pub async fn run_job(&self, request: &JobRequest, attempt: Attempt) -> Result<JobResult> {
        let id = request.discovery_id.as_str();

        let discovery = self
            .with_storage(|s| s.find_discovery(id))?
            .ok_or_else(|| DiscoveryError::NotFound(id.to_string()))?;

        if discovery.status.is_terminal() {
            info!(
                discovery_id = id,
                status = %discovery.status,
                "Discovery already finished, skipping"
            );
            let page_count = self.with_storage(|s| s.count_pages(id))?;
            return Ok(JobResult::from_discovery(&discovery, page_count));
        }

        info!(
            discovery_id = id,
            attempt = attempt.number,
            max_attempts = attempt.max_attempts,
            "Starting discovery of {}",
            request.homepage_url
        );

        let mut progress = JobProgress::default();
        match self.execute(request, &mut progress).await {
            Ok(result) => {
                info!(
                    discovery_id = id,
                    pages = result.page_count,
                    partial = result.partial_results,
                    "Discovery completed"
                );
                Ok(result)
            }
            Err(err) => self.handle_failure(request, err, attempt, progress),
        }
    }

    async fn execute(&self, request: &JobRequest, progress: &mut JobProgress) -> Result<JobResult> {
        let id = request.discovery_id.as_str();
        let homepage = parse_homepage(&request.homepage_url)?;

        // One limiter per attempt, shared by robots, sitemaps and homepage
        let limiter = Arc::new(RateLimiter::from_config(&self.config.rate_limit));
        let fetcher = Fetcher::new(self.client.clone(), limiter, self.config.fetch.clone());
        fetcher.validator().check_target(&homepage)?;

        self.with_storage(|s| s.update_status(id, DiscoveryStatus::Running, None))?;

        self.with_storage(|s| s.set_phase(id, Some(Phase::Sitemap)))?;

        let robots = load_robots(&fetcher, &homepage, &self.config.user_agent.bot_token()).await;
        if let Some(seconds) = robots.crawl_delay {
            fetcher.limiter().respect_crawl_delay(seconds);
            debug!(
                discovery_id = id,
                "Request delay set to {:?} by robots.txt",
                fetcher.limiter().delay()
            );
        }

        let ctx = PhaseContext {
            fetcher: &fetcher,
            homepage: &homepage,
            robots: &robots,
            validator: fetcher.validator(),
            sitemap_max_depth: self.config.discovery.sitemap_max_depth,
        };

        match run_sitemap_phase(&ctx).await {
            Ok(pages) => {
                info!(discovery_id = id, phase = %Phase::Sitemap, "Found {} pages", pages.len());
                progress.pages = pages;
            }
            Err(err) => progress.record_failure(id, Phase::Sitemap, &err),
        }

        self.with_storage(|s| s.set_phase(id, Some(Phase::Navigation)))?;

        match run_navigation_phase(&ctx).await {
            Ok(output) => {
                info!(
                    discovery_id = id,
                    phase = %Phase::Navigation,
                    "Found {} pages",
                    output.pages.len()
                );
                progress.pages = merge_pages(std::mem::take(&mut progress.pages), output.pages);
                progress.homepage_title = output.homepage_title;
            }
            Err(err) => progress.record_failure(id, Phase::Navigation, &err),
        }

        if progress.all_phases_failed() {
            return Err(DiscoveryError::AllPhasesFailed);
        }

        let partial = !progress.phase_failures.is_empty();
        let pages = final_pages(progress, &homepage, request);
        let result = self.save_completed(id, &pages, partial)?;
        self.cache_snapshot(id);

        Ok(result)
    }

    /// Applies the retry policy to a failed attempt
    fn handle_failure(
        &self,
        request: &JobRequest,
        err: DiscoveryError,
        attempt: Attempt,
        progress: JobProgress,
    ) -> Result<JobResult> {
        let id = request.discovery_id.as_str();

        if let Some(result) = self.cancelled_result(id, &err)? {
            return Ok(result);
        }

        if err.is_retryable() && !attempt.is_final() {
            warn!(
                discovery_id = id,
                attempt = attempt.number,
                "Attempt failed, retrying in {:?}: {}",
                attempt.next_delay,
                err
            );
            return Err(err);
        }

        if !progress.pages.is_empty() {
            if let Ok(homepage) = parse_homepage(&request.homepage_url) {
                warn!(
                    discovery_id = id,
                    "Final attempt failed, saving {} pages collected so far: {}",
                    progress.pages.len(),
                    err
                );
                let pages = final_pages(&progress, &homepage, request);
                match self.save_completed(id, &pages, true) {
                    Ok(result) => {
                        self.cache_snapshot(id);
                        return Ok(result);
                    }
                    Err(save_err) => {
                        if let Some(result) = self.cancelled_result(id, &save_err)? {
                            return Ok(result);
                        }
                        error!(discovery_id = id, "Failed to save partial results: {}", save_err);
                    }
                }
            }
        }

        error!(discovery_id = id, code = err.code(), "Discovery failed: {}", err);

        let details = ErrorDetails {
            message: err.to_string(),
            code: err.code().to_string(),
        };
        let marked = self.with_storage(|s| {
            s.set_phase(id, None)?;
            s.update_status(id, DiscoveryStatus::Failed, Some(&details))
        });
        if let Err(mark_err) = marked {
            if let Some(result) = self.cancelled_result(id, &mark_err)? {
                return Ok(result);
            }
            return Err(mark_err);
        }

        if let Err(cache_err) = self.cache.invalidate(id) {
            warn!(discovery_id = id, "Cache invalidation failed: {}", cache_err);
        }

        Ok(JobResult {
            discovery_id: id.to_string(),
            status: DiscoveryStatus::Failed,
            page_count: self.with_storage(|s| s.count_pages(id))?,
            partial_results: false,
            error_message: Some(details.message),
        })
    }

    /// Writes pages and moves the discovery to `Completed`
    fn save_completed(&self, id: &str, pages: &[NewPage], partial: bool) -> Result<JobResult> {
        self.with_storage(|s| {
            let inserted = s.complete_discovery(id, pages, partial)?;
            debug!(discovery_id = id, "Stored {} of {} pages", inserted, pages.len());

            let discovery = s
                .find_discovery(id)?
                .ok_or_else(|| StorageError::DiscoveryNotFound(id.to_string()))?;
            Ok(JobResult::from_discovery(&discovery, s.count_pages(id)?))
        })
    }

    /// Maps a write refused because the discovery was cancelled mid-run to a
    /// `Cancelled` result
    fn cancelled_result(&self, id: &str, err: &DiscoveryError) -> Result<Option<JobResult>> {
        if !matches!(err, DiscoveryError::StorageError(e) if e.is_cancelled()) {
            return Ok(None);
        }

        info!(discovery_id = id, "Discovery was cancelled while running");

        let Some(discovery) = self.with_storage(|s| s.find_discovery(id))? else {
            return Err(DiscoveryError::NotFound(id.to_string()));
        };
        let page_count = self.with_storage(|s| s.count_pages(id))?;
        Ok(Some(JobResult::from_discovery(&discovery, page_count)))
    }

    /// Stores the finished discovery in the cache; failures are only logged
    fn cache_snapshot(&self, id: &str) {
        let snapshot = self.with_storage(|s| {
            let discovery = s.find_discovery(id)?;
            let pages = s.get_pages(id)?;
            Ok(discovery.map(|d| DiscoverySnapshot::new(d, pages)))
        });

        let outcome = match snapshot {
            Ok(Some(snapshot)) => self.cache.put(&snapshot).map_err(DiscoveryError::from),
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };

        if let Err(err) = outcome {
            warn!(discovery_id = id, "Failed to cache discovery result: {}", err);
        }
    }
}

/// Prioritizes the collected pages, falling back to the homepage itself
fn final_pages(progress: &JobProgress, homepage: &Url, request: &JobRequest) -> Vec<NewPage> {
    let pages = prioritize(
        progress.pages.clone(),
        homepage,
        progress.homepage_title.as_deref(),
        request.max_pages.max(1) as usize,
        request.max_depth,
    );

    if pages.is_empty() {
        return vec![homepage_page(homepage, progress.homepage_title.clone())];
    }

    pages
}
