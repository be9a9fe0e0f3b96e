//! Result cache for finished discoveries
//!
//! Snapshots of a discovery and its pages are cached under
//! `discovery:{id}:result` so status readers do not hit the database. The
//! cache is advisory: every write failure is logged by the caller and never
//! fails a job.

mod memory;
mod sqlite;

pub use memory::MemorySnapshotCache;
pub use sqlite::SqliteSnapshotCache;

use crate::storage::{DiscoveredPage, Discovery, Storage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by cache backends
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// A discovery with its pages, as served to readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySnapshot {
    pub discovery: Discovery,
    pub pages: Vec<DiscoveredPage>,
    pub cached_at: DateTime<Utc>,
}

impl DiscoverySnapshot {
    pub fn new(discovery: Discovery, pages: Vec<DiscoveredPage>) -> Self {
        Self {
            discovery,
            pages,
            cached_at: Utc::now(),
        }
    }
}

/// Cache key of a discovery's result snapshot
pub fn snapshot_key(discovery_id: &str) -> String {
    format!("discovery:{}:result", discovery_id)
}

/// Trait for snapshot cache backends
pub trait SnapshotCache: Send + Sync {
    /// Stores a snapshot under its discovery's key, replacing any previous one
    fn put(&self, snapshot: &DiscoverySnapshot) -> CacheResult<()>;

    /// Returns the cached snapshot; expired entries are misses
    fn get(&self, discovery_id: &str) -> CacheResult<Option<DiscoverySnapshot>>;

    fn invalidate(&self, discovery_id: &str) -> CacheResult<()>;
}

/// Reads a discovery snapshot, preferring the cache
///
/// On a miss the snapshot is built from storage. Only discoveries in a
/// terminal status are written back, so a running discovery is never served
/// stale.
pub fn load_snapshot(
    storage: &dyn Storage,
    cache: &dyn SnapshotCache,
    discovery_id: &str,
) -> crate::Result<Option<DiscoverySnapshot>> {
    match cache.get(discovery_id) {
        Ok(Some(snapshot)) => return Ok(Some(snapshot)),
        Ok(None) => {}
        Err(e) => tracing::warn!("Cache read failed for {}: {}", discovery_id, e),
    }

    let Some(discovery) = storage.find_discovery(discovery_id)? else {
        return Ok(None);
    };
    let pages = storage.get_pages(discovery_id)?;
    let snapshot = DiscoverySnapshot::new(discovery, pages);

    if snapshot.discovery.status.is_terminal() {
        if let Err(e) = cache.put(&snapshot) {
            tracing::warn!("Cache write failed for {}: {}", discovery_id, e);
        }
    }

    Ok(Some(snapshot))
}
