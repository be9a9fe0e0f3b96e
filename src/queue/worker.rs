//! Discovery job worker
//!
//! Pulls due jobs from the durable queue one at a time, runs them through
//! the [`Coordinator`] and applies the retry policy to failed attempts.
//!
//! ```text
//! Worker
//!     │
//!     ├─► claim_next_job (attempts += 1)
//!     ├─► Coordinator::run_job(request, attempt)
//!     │       ├─ Ok            ─► finish_job
//!     │       ├─ Err, retries  ─► reschedule_job(now + backoff)
//!     │       └─ Err, final    ─► finish_job(Failed)
//!     └─► sleep until the next job is due
//! ```

use crate::config::Config;
use crate::discovery::{Coordinator, RetryPolicy};
use crate::queue::{JobRequest, JobResult};
use crate::state::DiscoveryStatus;
use crate::storage::{JobState, NewDiscovery, SqliteStorage, Storage, StorageResult};
use crate::{DiscoveryError, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What happened to a claimed job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The discovery reached a terminal status
    Finished(JobResult),

    /// The attempt failed and the job is queued again
    Rescheduled {
        discovery_id: String,
        attempt: u32,
        delay: Duration,
    },

    /// The job failed permanently without a discovery result
    Dropped { discovery_id: String, error: String },
}

/// Sequential job processor owning its storage handle and coordinator
pub struct Worker {
    storage: Arc<Mutex<SqliteStorage>>,
    coordinator: Coordinator,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(config: &Config, coordinator: Coordinator) -> Self {
        Self {
            storage: coordinator.storage(),
            coordinator,
            retry: RetryPolicy::from_config(&config.retry),
            poll_interval: Duration::from_millis(config.worker.poll_interval_ms),
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

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

    /// Creates a discovery and queues its job
    pub fn request_discovery(&self, new: &NewDiscovery) -> Result<JobRequest> {
        let request = self.with_storage(|s| {
            let discovery = s.create_discovery(new)?;
            let request = JobRequest::from_discovery(&discovery);
            s.enqueue_job(&request)?;
            Ok(request)
        })?;

        info!(
            discovery_id = %request.discovery_id,
            "Queued discovery of {}",
            request.homepage_url
        );
        Ok(request)
    }

    /// Queues a job for an existing discovery
    ///
    /// # Returns
    ///
    /// `false` if the discovery already has a job
    pub fn submit(&self, request: &JobRequest) -> Result<bool> {
        let queued = self.with_storage(|s| s.enqueue_job(request))?;
        if !queued {
            debug!(discovery_id = %request.discovery_id, "Job already queued");
        }
        Ok(queued)
    }

    /// Claims and runs the next due job, if any
    pub async fn process_next(&self) -> Result<Option<JobOutcome>> {
        let Some(job) = self.with_storage(|s| s.claim_next_job(Utc::now()))? else {
            return Ok(None);
        };

        let attempt = self.retry.attempt(job.attempts);
        let discovery_id = job.request.discovery_id.clone();

        let outcome = match self.coordinator.run_job(&job.request, attempt).await {
            Ok(result) => {
                let state = if result.status == DiscoveryStatus::Failed {
                    JobState::Failed
                } else {
                    JobState::Succeeded
                };
                let error = result.error_message.as_deref();
                self.with_storage(|s| s.finish_job(&discovery_id, state, error))?;
                JobOutcome::Finished(result)
            }
            Err(err) if err.is_retryable() && !attempt.is_final() => {
                let delay = attempt.next_delay;
                let run_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                self.with_storage(|s| s.reschedule_job(&discovery_id, run_at, &err.to_string()))?;
                JobOutcome::Rescheduled {
                    discovery_id,
                    attempt: attempt.number,
                    delay,
                }
            }
            Err(err) => {
                error!(discovery_id = %discovery_id, "Dropping job: {}", err);
                let message = err.to_string();
                self.with_storage(|s| s.finish_job(&discovery_id, JobState::Failed, Some(&message)))?;
                JobOutcome::Dropped {
                    discovery_id,
                    error: message,
                }
            }
        };

        Ok(Some(outcome))
    }

    /// Runs jobs until the queue holds nothing, waiting for rescheduled ones
    pub async fn run_until_idle(&self) -> Result<Vec<JobOutcome>> {
        let mut outcomes = Vec::new();

        loop {
            if let Some(outcome) = self.process_next().await? {
                outcomes.push(outcome);
                continue;
            }

            match self.with_storage(|s| s.next_job_due())? {
                Some(due) => {
                    let wait = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    debug!("Next job due in {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
                None => return Ok(outcomes),
            }
        }
    }

    /// Polls the queue until `shutdown` resolves
    ///
    /// Jobs left running by a previous worker process are queued again first.
    /// A job in progress when shutdown is requested is abandoned and picked
    /// up again on the next start.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let requeued = self.with_storage(|s| s.requeue_interrupted_jobs())?;
        if requeued > 0 {
            warn!("Requeued {} interrupted jobs", requeued);
        }

        info!("Worker started, polling every {:?}", self.poll_interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping worker");
                    return Ok(());
                }
                processed = self.process_next() => {
                    match processed {
                        Ok(Some(outcome)) => debug!("Job outcome: {:?}", outcome),
                        Ok(None) => tokio::time::sleep(self.poll_interval).await,
                        Err(err) => {
                            error!("Worker iteration failed: {}", err);
                            tokio::time::sleep(self.poll_interval).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySnapshotCache;
    use crate::state::ExecutionMode;

    fn config() -> Config {
        toml::from_str(
            r#"
            [fetch]
            allow-private-hosts = true
            robots-timeout-ms = 500
            sitemap-timeout-ms = 500
            homepage-timeout-ms = 500

            [rate-limit]
            request-delay-ms = 0

            [retry]
            max-attempts = 2
            initial-backoff-ms = 10

            [worker]
            poll-interval-ms = 10

            [user-agent]
            crawler-name = "SkeletonBot"
            crawler-version = "1.0"
            contact-url = "https://example.com/bot"
            contact-email = "bot@example.com"

            [output]
            database-path = ":memory:"
            "#,
        )
        .unwrap()
    }

    fn worker() -> Worker {
        let config = Arc::new(config());
        let storage = Arc::new(Mutex::new(SqliteStorage::open_in_memory().unwrap()));
        let cache = Arc::new(MemorySnapshotCache::with_ttl_hours(1));
        let coordinator = Coordinator::new(Arc::clone(&config), storage, cache).unwrap();
        Worker::new(&config, coordinator)
    }

    fn unreachable_site() -> NewDiscovery {
        NewDiscovery {
            // Nothing listens on port 1, so every fetch is refused
            homepage_url: "http://127.0.0.1:1/".to_string(),
            mode: ExecutionMode::Auto,
            max_pages: 10,
            max_depth: 1,
            session_id: None,
        }
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let worker = worker();
        assert_eq!(worker.process_next().await.unwrap(), None);
        assert!(worker.run_until_idle().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_is_idempotent() {
        let worker = worker();
        let request = worker.request_discovery(&unreachable_site()).unwrap();
        assert!(!worker.submit(&request).unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_site_retries_then_fails() {
        let worker = worker();
        let request = worker.request_discovery(&unreachable_site()).unwrap();

        let outcomes = worker.run_until_idle().await.unwrap();
        assert_eq!(outcomes.len(), 2);

        match &outcomes[0] {
            JobOutcome::Rescheduled { attempt, delay, .. } => {
                assert_eq!(*attempt, 1);
                assert_eq!(*delay, Duration::from_millis(10));
            }
            other => panic!("expected reschedule, got {:?}", other),
        }

        match &outcomes[1] {
            JobOutcome::Finished(result) => {
                assert_eq!(result.status, DiscoveryStatus::Failed);
                assert_eq!(result.page_count, 0);
            }
            other => panic!("expected finished job, got {:?}", other),
        }

        let storage = worker.coordinator().storage();
        let storage = storage.lock().unwrap();
        let discovery = storage
            .find_discovery(&request.discovery_id)
            .unwrap()
            .unwrap();
        assert_eq!(discovery.status, DiscoveryStatus::Failed);
        assert_eq!(discovery.error_code.as_deref(), Some("ALL_PHASES_FAILED"));

        let job = storage.get_job(&request.discovery_id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 2);
    }

    #[tokio::test]
    async fn test_cancelled_discovery_finishes_without_work() {
        let worker = worker();
        let request = worker.request_discovery(&unreachable_site()).unwrap();
        {
            let storage = worker.coordinator().storage();
            let mut storage = storage.lock().unwrap();
            storage
                .update_status(&request.discovery_id, DiscoveryStatus::Cancelled, None)
                .unwrap();
        }

        let outcome = worker.process_next().await.unwrap().unwrap();
        match outcome {
            JobOutcome::Finished(result) => assert_eq!(result.status, DiscoveryStatus::Cancelled),
            other => panic!("expected finished job, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let worker = worker();
        worker
            .run(tokio::time::sleep(Duration::from_millis(30)))
            .await
            .unwrap();
    }
}
