//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::queue::{JobRequest, QueuedJob};
use crate::state::{DiscoveryStatus, ExecutionMode, PageSource, Phase};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{Discovery, DiscoveredPage, ErrorDetails, JobState, NewDiscovery, NewPage};
use crate::url::normalize;
use crate::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use uuid::Uuid;

const DISCOVERY_COLUMNS: &str = "id, homepage_url, mode, status, current_phase, max_pages, \
     max_depth, partial_results, session_id, error_message, error_code, created_at, \
     updated_at, completed_at";

const PAGE_COLUMNS: &str = "id, discovery_id, url, normalized_url, title, source, depth, \
     http_status, content_type, created_at";

/// Matches discoveries that may still be written to
const OPEN_STATUS_FILTER: &str = "status IN ('PENDING', 'RUNNING')";

const JOB_COLUMNS: &str =
    "discovery_id, homepage_url, mode, session_id, max_pages, max_depth, state, attempts, \
     run_at_ms, last_error";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path` and applies the schema
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn status_of(&self, id: &str) -> StorageResult<DiscoveryStatus> {
        self.find_discovery(id)?
            .map(|discovery| discovery.status)
            .ok_or_else(|| StorageError::DiscoveryNotFound(id.to_string()))
    }

    /// Explains why a guarded write to a discovery changed no row
    fn refused_write(&self, id: &str) -> StorageError {
        match self.status_of(id) {
            Ok(status) => StorageError::AlreadyFinished {
                id: id.to_string(),
                status,
            },
            Err(err) => err,
        }
    }
}

/// Appends pages after the discovery's current last position
fn insert_pages(
    tx: &Transaction<'_>,
    discovery_id: &str,
    pages: &[NewPage],
    now: &str,
) -> StorageResult<usize> {
    let mut position: i64 = tx.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM discovered_pages WHERE discovery_id = ?1",
        params![discovery_id],
        |row| row.get(0),
    )?;

    let mut stmt = tx.prepare(
        "INSERT INTO discovered_pages
         (id, discovery_id, url, normalized_url, title, source, depth, http_status,
          content_type, position, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(discovery_id, normalized_url) DO NOTHING",
    )?;

    let mut inserted = 0;
    for page in pages {
        let changed = stmt.execute(params![
            Uuid::new_v4().to_string(),
            discovery_id,
            page.url,
            normalize(&page.url),
            page.title,
            page.source.to_db_string(),
            page.depth,
            page.http_status,
            page.content_type,
            position,
            now,
        ])?;

        if changed > 0 {
            inserted += 1;
            position += 1;
        }
    }

    Ok(inserted)
}

fn now_string() -> String {
    Utc::now().to_rfc3339()
}

fn discovery_from_row(row: &Row<'_>) -> rusqlite::Result<Discovery> {
    Ok(Discovery {
        id: row.get(0)?,
        homepage_url: row.get(1)?,
        mode: ExecutionMode::from_db_string(&row.get::<_, String>(2)?).unwrap_or_default(),
        status: DiscoveryStatus::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(DiscoveryStatus::Failed),
        current_phase: row
            .get::<_, Option<String>>(4)?
            .as_deref()
            .and_then(Phase::from_db_string),
        max_pages: row.get(5)?,
        max_depth: row.get(6)?,
        partial_results: row.get(7)?,
        session_id: row.get(8)?,
        error_message: row.get(9)?,
        error_code: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        completed_at: row.get(13)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<DiscoveredPage> {
    Ok(DiscoveredPage {
        id: row.get(0)?,
        discovery_id: row.get(1)?,
        url: row.get(2)?,
        normalized_url: row.get(3)?,
        title: row.get(4)?,
        source: PageSource::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(PageSource::Crawled),
        depth: row.get(6)?,
        http_status: row.get(7)?,
        content_type: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<QueuedJob> {
    Ok(QueuedJob {
        request: JobRequest {
            discovery_id: row.get(0)?,
            homepage_url: row.get(1)?,
            mode: ExecutionMode::from_db_string(&row.get::<_, String>(2)?).unwrap_or_default(),
            session_id: row.get(3)?,
            max_pages: row.get(4)?,
            max_depth: row.get(5)?,
        },
        state: JobState::from_db_string(&row.get::<_, String>(6)?).unwrap_or(JobState::Failed),
        attempts: row.get(7)?,
        run_at: DateTime::<Utc>::from_timestamp_millis(row.get(8)?).unwrap_or_default(),
        last_error: row.get(9)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Discovery Management =====

    fn create_discovery(&mut self, new: &NewDiscovery) -> StorageResult<Discovery> {
        let id = Uuid::new_v4().to_string();
        let now = now_string();

        self.conn.execute(
            "INSERT INTO discoveries
             (id, homepage_url, mode, status, max_pages, max_depth, partial_results,
              session_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?8)",
            params![
                id,
                new.homepage_url,
                new.mode.to_db_string(),
                DiscoveryStatus::Pending.to_db_string(),
                new.max_pages,
                new.max_depth,
                new.session_id,
                now,
            ],
        )?;

        self.find_discovery(&id)?
            .ok_or(StorageError::DiscoveryNotFound(id))
    }

    fn find_discovery(&self, id: &str) -> StorageResult<Option<Discovery>> {
        let discovery = self
            .conn
            .query_row(
                &format!("SELECT {} FROM discoveries WHERE id = ?1", DISCOVERY_COLUMNS),
                params![id],
                discovery_from_row,
            )
            .optional()?;

        Ok(discovery)
    }

    fn update_status(
        &mut self,
        id: &str,
        status: DiscoveryStatus,
        error: Option<&ErrorDetails>,
    ) -> StorageResult<()> {
        let current = self.status_of(id)?;
        if !current.can_transition_to(status) {
            return Err(StorageError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        let now = now_string();
        let completed_at = status.is_terminal().then(|| now.clone());

        let changed = self.conn.execute(
            "UPDATE discoveries
             SET status = ?1, updated_at = ?2, completed_at = COALESCE(?3, completed_at),
                 error_message = ?4, error_code = ?5
             WHERE id = ?6 AND status = ?7",
            params![
                status.to_db_string(),
                now,
                completed_at,
                error.map(|e| e.message.as_str()),
                error.map(|e| e.code.as_str()),
                id,
                current.to_db_string(),
            ],
        )?;

        if changed == 0 {
            // Lost a race with another writer; report what won
            return Err(StorageError::InvalidTransition {
                from: self.status_of(id)?,
                to: status,
            });
        }

        Ok(())
    }

    fn set_phase(&mut self, id: &str, phase: Option<Phase>) -> StorageResult<()> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE discoveries SET current_phase = ?1, updated_at = ?2
                 WHERE id = ?3 AND {}",
                OPEN_STATUS_FILTER
            ),
            params![phase.map(|p| p.to_db_string()), now_string(), id],
        )?;

        if changed == 0 {
            return Err(self.refused_write(id));
        }
        Ok(())
    }

    fn set_partial_results(&mut self, id: &str, partial: bool) -> StorageResult<()> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE discoveries SET partial_results = ?1, updated_at = ?2
                 WHERE id = ?3 AND {}",
                OPEN_STATUS_FILTER
            ),
            params![partial, now_string(), id],
        )?;

        if changed == 0 {
            return Err(self.refused_write(id));
        }
        Ok(())
    }

    fn complete_discovery(
        &mut self,
        id: &str,
        pages: &[NewPage],
        partial: bool,
    ) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let now = now_string();

        let changed = tx.execute(
            "UPDATE discoveries
             SET status = ?1, partial_results = ?2, current_phase = NULL, updated_at = ?3,
                 completed_at = ?3, error_message = NULL, error_code = NULL
             WHERE id = ?4 AND status = ?5",
            params![
                DiscoveryStatus::Completed.to_db_string(),
                partial,
                now,
                id,
                DiscoveryStatus::Running.to_db_string(),
            ],
        )?;

        if changed == 0 {
            // Dropping the transaction rolls it back
            drop(tx);
            return Err(StorageError::InvalidTransition {
                from: self.status_of(id)?,
                to: DiscoveryStatus::Completed,
            });
        }

        let inserted = insert_pages(&tx, id, pages, &now)?;
        tx.commit()?;

        Ok(inserted)
    }

    // ===== Page Management =====

    fn add_pages(&mut self, discovery_id: &str, pages: &[NewPage]) -> StorageResult<usize> {
        let status = self.status_of(discovery_id)?;
        if status.is_terminal() {
            return Err(StorageError::AlreadyFinished {
                id: discovery_id.to_string(),
                status,
            });
        }

        let tx = self.conn.transaction()?;
        let inserted = insert_pages(&tx, discovery_id, pages, &now_string())?;
        tx.commit()?;

        Ok(inserted)
    }

    fn get_pages(&self, discovery_id: &str) -> StorageResult<Vec<DiscoveredPage>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM discovered_pages WHERE discovery_id = ?1 ORDER BY position",
            PAGE_COLUMNS
        ))?;

        let pages = stmt
            .query_map(params![discovery_id], page_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(pages)
    }

    fn count_pages(&self, discovery_id: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM discovered_pages WHERE discovery_id = ?1",
            params![discovery_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Job Queue =====

    fn enqueue_job(&mut self, request: &JobRequest) -> StorageResult<bool> {
        let now = Utc::now();
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO jobs
             (discovery_id, homepage_url, mode, session_id, max_pages, max_depth, state,
              attempts, run_at_ms, enqueued_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?9)",
            params![
                request.discovery_id,
                request.homepage_url,
                request.mode.to_db_string(),
                request.session_id,
                request.max_pages,
                request.max_depth,
                JobState::Queued.to_db_string(),
                now.timestamp_millis(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(changed > 0)
    }

    fn claim_next_job(&mut self, now: DateTime<Utc>) -> StorageResult<Option<QueuedJob>> {
        let tx = self.conn.transaction()?;

        let candidate: Option<String> = tx
            .query_row(
                "SELECT discovery_id FROM jobs
                 WHERE state = ?1 AND run_at_ms <= ?2
                 ORDER BY run_at_ms, enqueued_at
                 LIMIT 1",
                params![JobState::Queued.to_db_string(), now.timestamp_millis()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(discovery_id) = candidate else {
            return Ok(None);
        };

        let claimed = tx.execute(
            "UPDATE jobs SET state = ?1, attempts = attempts + 1, updated_at = ?2
             WHERE discovery_id = ?3 AND state = ?4",
            params![
                JobState::Running.to_db_string(),
                now.to_rfc3339(),
                discovery_id,
                JobState::Queued.to_db_string(),
            ],
        )?;

        if claimed == 0 {
            return Ok(None);
        }

        let job = tx.query_row(
            &format!("SELECT {} FROM jobs WHERE discovery_id = ?1", JOB_COLUMNS),
            params![discovery_id],
            job_from_row,
        )?;
        tx.commit()?;

        Ok(Some(job))
    }

    fn reschedule_job(
        &mut self,
        discovery_id: &str,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE jobs SET state = ?1, run_at_ms = ?2, last_error = ?3, updated_at = ?4
             WHERE discovery_id = ?5",
            params![
                JobState::Queued.to_db_string(),
                run_at.timestamp_millis(),
                error,
                now_string(),
                discovery_id,
            ],
        )?;
        Ok(())
    }

    fn finish_job(
        &mut self,
        discovery_id: &str,
        state: JobState,
        error: Option<&str>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE jobs SET state = ?1, last_error = COALESCE(?2, last_error), updated_at = ?3
             WHERE discovery_id = ?4",
            params![state.to_db_string(), error, now_string(), discovery_id],
        )?;
        Ok(())
    }

    fn requeue_interrupted_jobs(&mut self) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "UPDATE jobs SET state = ?1, updated_at = ?2 WHERE state = ?3",
            params![
                JobState::Queued.to_db_string(),
                now_string(),
                JobState::Running.to_db_string(),
            ],
        )?;
        Ok(changed)
    }

    fn next_job_due(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let due: Option<i64> = self.conn.query_row(
            "SELECT MIN(run_at_ms) FROM jobs WHERE state = ?1",
            params![JobState::Queued.to_db_string()],
            |row| row.get(0),
        )?;

        Ok(due.and_then(DateTime::<Utc>::from_timestamp_millis))
    }

    fn get_job(&self, discovery_id: &str) -> StorageResult<Option<QueuedJob>> {
        let job = self
            .conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE discovery_id = ?1", JOB_COLUMNS),
                params![discovery_id],
                job_from_row,
            )
            .optional()?;

        Ok(job)
    }
}
