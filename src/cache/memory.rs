//! In-process snapshot cache with expiry
//!
//! Entries are stored as serialized JSON under their snapshot key and expire
//! after a fixed TTL. Expired entries are dropped on read and swept on every
//! write.

use super::{snapshot_key, CacheError, CacheResult, DiscoverySnapshot, SnapshotCache};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A cached snapshot together with the time it was stored
#[derive(Debug, Clone)]
struct CachedEntry {
    json: String,
    stored_at: DateTime<Utc>,
}

impl CachedEntry {
    fn is_stale(&self, ttl: Duration) -> bool {
        Utc::now() - self.stored_at > ttl
    }
}

/// Snapshot cache held in process memory
#[derive(Debug)]
pub struct MemorySnapshotCache {
    entries: Mutex<HashMap<String, CachedEntry>>,
    ttl: Duration,
}

impl MemorySnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn with_ttl_hours(hours: u64) -> Self {
        Self::new(Duration::hours(hours as i64))
    }

    /// Number of entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, HashMap<String, CachedEntry>>> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".to_string()))
    }
}

impl SnapshotCache for MemorySnapshotCache {
    fn put(&self, snapshot: &DiscoverySnapshot) -> CacheResult<()> {
        let entry = CachedEntry {
            json: serde_json::to_string(snapshot)?,
            stored_at: Utc::now(),
        };

        let ttl = self.ttl;
        let mut entries = self.lock()?;
        entries.retain(|_, cached| !cached.is_stale(ttl));
        entries.insert(snapshot_key(&snapshot.discovery.id), entry);
        Ok(())
    }

    fn get(&self, discovery_id: &str) -> CacheResult<Option<DiscoverySnapshot>> {
        let key = snapshot_key(discovery_id);
        let mut entries = self.lock()?;

        let Some(entry) = entries.get(&key) else {
            return Ok(None);
        };

        if entry.is_stale(self.ttl) {
            entries.remove(&key);
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&entry.json)?))
    }

    fn invalidate(&self, discovery_id: &str) -> CacheResult<()> {
        self.lock()?.remove(&snapshot_key(discovery_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DiscoveryStatus, ExecutionMode};
    use crate::storage::Discovery;

    fn snapshot(id: &str) -> DiscoverySnapshot {
        DiscoverySnapshot::new(
            Discovery {
                id: id.to_string(),
                homepage_url: "https://example.com".to_string(),
                mode: ExecutionMode::Auto,
                status: DiscoveryStatus::Completed,
                current_phase: None,
                max_pages: 10,
                max_depth: 1,
                partial_results: false,
                session_id: None,
                error_message: None,
                error_code: None,
                created_at: "2024-01-01T00:00:00+00:00".to_string(),
                updated_at: "2024-01-01T00:00:00+00:00".to_string(),
                completed_at: Some("2024-01-01T00:00:00+00:00".to_string()),
            },
            Vec::new(),
        )
    }

    #[test]
    fn test_put_and_get() {
        let cache = MemorySnapshotCache::with_ttl_hours(24);
        let snap = snapshot("d1");

        cache.put(&snap).unwrap();
        assert_eq!(cache.get("d1").unwrap(), Some(snap));
        assert_eq!(cache.get("d2").unwrap(), None);
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let cache = MemorySnapshotCache::new(Duration::milliseconds(-1));
        cache.put(&snapshot("d1")).unwrap();
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.get("d1").unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_sweeps_expired_entries() {
        let cache = MemorySnapshotCache::new(Duration::milliseconds(-1));
        for i in 0..100 {
            cache.put(&snapshot(&format!("d{}", i))).unwrap();
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate() {
        let cache = MemorySnapshotCache::with_ttl_hours(1);
        cache.put(&snapshot("d1")).unwrap();
        cache.invalidate("d1").unwrap();
        assert_eq!(cache.get("d1").unwrap(), None);

        // Invalidating a missing key is not an error
        cache.invalidate("d1").unwrap();
    }
}
