//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the discovery database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per requested discovery
CREATE TABLE IF NOT EXISTS discoveries (
    id TEXT PRIMARY KEY,
    homepage_url TEXT NOT NULL,
    mode TEXT NOT NULL,
    status TEXT NOT NULL,
    current_phase TEXT,
    max_pages INTEGER NOT NULL,
    max_depth INTEGER NOT NULL,
    partial_results INTEGER NOT NULL DEFAULT 0,
    session_id TEXT,
    error_message TEXT,
    error_code TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_discoveries_status ON discoveries(status);
CREATE INDEX IF NOT EXISTS idx_discoveries_session ON discoveries(session_id);

-- Pages found for a discovery; at most one row per normalized URL
CREATE TABLE IF NOT EXISTS discovered_pages (
    id TEXT PRIMARY KEY,
    discovery_id TEXT NOT NULL REFERENCES discoveries(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    normalized_url TEXT NOT NULL,
    title TEXT,
    source TEXT NOT NULL,
    depth INTEGER NOT NULL,
    http_status INTEGER,
    content_type TEXT,
    position INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(discovery_id, normalized_url)
);

CREATE INDEX IF NOT EXISTS idx_pages_discovery ON discovered_pages(discovery_id, position);

-- Durable job queue, one job per discovery
CREATE TABLE IF NOT EXISTS jobs (
    discovery_id TEXT PRIMARY KEY REFERENCES discoveries(id) ON DELETE CASCADE,
    homepage_url TEXT NOT NULL,
    mode TEXT NOT NULL,
    session_id TEXT,
    max_pages INTEGER NOT NULL,
    max_depth INTEGER NOT NULL,
    state TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    run_at_ms INTEGER NOT NULL,
    last_error TEXT,
    enqueued_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs(state, run_at_ms);

-- Cached result snapshots keyed `discovery:{id}:result`
CREATE TABLE IF NOT EXISTS snapshot_cache (
    cache_key TEXT PRIMARY KEY,
    snapshot TEXT NOT NULL,
    expires_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshot_cache_expiry ON snapshot_cache(expires_at_ms);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
