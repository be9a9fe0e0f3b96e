//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::queue::{JobRequest, QueuedJob};
use crate::state::{DiscoveryStatus, Phase};
use crate::storage::{Discovery, DiscoveredPage, ErrorDetails, JobState, NewDiscovery, NewPage};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Discovery not found: {0}")]
    DiscoveryNotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: DiscoveryStatus,
        to: DiscoveryStatus,
    },

    #[error("Discovery {id} is already {status}")]
    AlreadyFinished {
        id: String,
        status: DiscoveryStatus,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl StorageError {
    /// Returns true if the same operation could succeed later
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::DiscoveryNotFound(_)
                | Self::InvalidTransition { .. }
                | Self::AlreadyFinished { .. }
                | Self::ConstraintViolation(_)
        )
    }

    /// Returns true if the write was refused because the discovery had been
    /// cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition {
                from: DiscoveryStatus::Cancelled,
                ..
            } | Self::AlreadyFinished {
                status: DiscoveryStatus::Cancelled,
                ..
            }
        )
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by discovery jobs and
/// the worker queue.
pub trait Storage {
    // ===== Discovery Management =====

    /// Creates a discovery in `Pending` status with a fresh id
    fn create_discovery(&mut self, new: &NewDiscovery) -> StorageResult<Discovery>;

    /// Gets a discovery by id
    fn find_discovery(&self, id: &str) -> StorageResult<Option<Discovery>>;

    /// Moves a discovery to `status`
    ///
    /// The write is a compare-and-set on the status read beforehand; a
    /// transition the lifecycle does not allow (for example out of
    /// `Cancelled`) fails with [`StorageError::InvalidTransition`]. Terminal
    /// statuses set `completed_at`. `error` is stored as given, so a
    /// transition without error details clears previous ones.
    fn update_status(
        &mut self,
        id: &str,
        status: DiscoveryStatus,
        error: Option<&ErrorDetails>,
    ) -> StorageResult<()>;

    /// Records the phase currently running (`None` once finished)
    ///
    /// Fails with [`StorageError::AlreadyFinished`] on a terminal discovery.
    fn set_phase(&mut self, id: &str, phase: Option<Phase>) -> StorageResult<()>;

    fn set_partial_results(&mut self, id: &str, partial: bool) -> StorageResult<()>;

    /// Stores the final pages and moves a `Running` discovery to `Completed`
    ///
    /// One transaction that starts with the status compare-and-set. If the
    /// discovery is no longer running (cancelled mid-run, for example) nothing
    /// is written and the call fails with [`StorageError::InvalidTransition`].
    ///
    /// # Returns
    ///
    /// The number of pages actually inserted
    fn complete_discovery(
        &mut self,
        id: &str,
        pages: &[NewPage],
        partial: bool,
    ) -> StorageResult<usize>;

    // ===== Page Management =====

    /// Appends pages in order, skipping normalized URLs already stored
    ///
    /// Terminal discoveries are immutable and reject new pages.
    ///
    /// # Returns
    ///
    /// The number of pages actually inserted
    fn add_pages(&mut self, discovery_id: &str, pages: &[NewPage]) -> StorageResult<usize>;

    /// Gets the pages of a discovery in insertion order
    fn get_pages(&self, discovery_id: &str) -> StorageResult<Vec<DiscoveredPage>>;

    fn count_pages(&self, discovery_id: &str) -> StorageResult<u64>;

    // ===== Job Queue =====

    /// Queues a job for a discovery, due immediately
    ///
    /// Idempotent per discovery: returns false if a job already exists.
    fn enqueue_job(&mut self, request: &JobRequest) -> StorageResult<bool>;

    /// Claims the oldest due job and increments its attempt counter
    fn claim_next_job(&mut self, now: DateTime<Utc>) -> StorageResult<Option<QueuedJob>>;

    /// Puts a claimed job back in the queue until `run_at`
    fn reschedule_job(
        &mut self,
        discovery_id: &str,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> StorageResult<()>;

    /// Marks a job as finished (`Succeeded` or `Failed`)
    fn finish_job(
        &mut self,
        discovery_id: &str,
        state: JobState,
        error: Option<&str>,
    ) -> StorageResult<()>;

    /// Returns jobs left `running` by a crashed worker to the queue
    fn requeue_interrupted_jobs(&mut self) -> StorageResult<usize>;

    /// Earliest `run_at` among queued jobs
    fn next_job_due(&self) -> StorageResult<Option<DateTime<Utc>>>;

    fn get_job(&self, discovery_id: &str) -> StorageResult<Option<QueuedJob>>;
}
