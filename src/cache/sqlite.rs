//! Snapshot cache stored in the discovery database
//!
//! Lets the worker and a separate `status` process share cached snapshots.
//! Rows carry their expiry time; expired rows are misses and are swept on
//! every write.

use super::{snapshot_key, CacheError, CacheResult, DiscoverySnapshot, SnapshotCache};
use crate::storage::schema::initialize_schema;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Snapshot cache backed by the `snapshot_cache` table
pub struct SqliteSnapshotCache {
    conn: Mutex<Connection>,
    ttl: Duration,
}

impl SqliteSnapshotCache {
    /// Opens the cache in the database at `path`, creating the schema if needed
    pub fn open(path: &Path, ttl: Duration) -> CacheResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        Self::from_connection(conn, ttl)
    }

    pub fn open_in_memory(ttl: Duration) -> CacheResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, ttl)
    }

    fn from_connection(conn: Connection, ttl: Duration) -> CacheResult<Self> {
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl,
        })
    }

    /// Number of stored rows, including expired ones not yet swept
    pub fn row_count(&self) -> CacheResult<usize> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM snapshot_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".to_string()))
    }
}

impl SnapshotCache for SqliteSnapshotCache {
    fn put(&self, snapshot: &DiscoverySnapshot) -> CacheResult<()> {
        let json = serde_json::to_string(snapshot)?;
        let now = Utc::now();
        let conn = self.lock()?;

        conn.execute(
            "DELETE FROM snapshot_cache WHERE expires_at_ms <= ?1",
            params![now.timestamp_millis()],
        )?;
        conn.execute(
            "INSERT INTO snapshot_cache (cache_key, snapshot, expires_at_ms)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE
             SET snapshot = excluded.snapshot, expires_at_ms = excluded.expires_at_ms",
            params![
                snapshot_key(&snapshot.discovery.id),
                json,
                (now + self.ttl).timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn get(&self, discovery_id: &str) -> CacheResult<Option<DiscoverySnapshot>> {
        let json: Option<String> = self
            .lock()?
            .query_row(
                "SELECT snapshot FROM snapshot_cache WHERE cache_key = ?1 AND expires_at_ms > ?2",
                params![snapshot_key(discovery_id), Utc::now().timestamp_millis()],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(CacheError::from)
    }

    fn invalidate(&self, discovery_id: &str) -> CacheResult<()> {
        self.lock()?.execute(
            "DELETE FROM snapshot_cache WHERE cache_key = ?1",
            params![snapshot_key(discovery_id)],
        )?;
        Ok(())
    }
}
