//! Storage module for persisting discovery data
//!
//! This module handles all database operations for discovery, including:
//! - SQLite database initialization and schema management
//! - Discovery lifecycle records with guarded status transitions
//! - Discovered page persistence, unique per normalized URL
//! - The durable job queue consumed by workers

pub(crate) mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{DiscoveryStatus, ExecutionMode, PageSource, Phase};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage> {
    SqliteStorage::new(path)
}

/// One request to map a site's structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    pub id: String,
    pub homepage_url: String,
    pub mode: ExecutionMode,
    pub status: DiscoveryStatus,
    pub current_phase: Option<Phase>,
    pub max_pages: u32,
    pub max_depth: u32,
    pub partial_results: bool,
    pub session_id: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// Fields supplied when a discovery is requested
#[derive(Debug, Clone)]
pub struct NewDiscovery {
    pub homepage_url: String,
    pub mode: ExecutionMode,
    pub max_pages: u32,
    pub max_depth: u32,
    pub session_id: Option<String>,
}

/// A page persisted for a discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPage {
    pub id: String,
    pub discovery_id: String,
    pub url: String,
    pub normalized_url: String,
    pub title: Option<String>,
    pub source: PageSource,
    pub depth: u32,
    pub http_status: Option<u16>,
    pub content_type: Option<String>,
    pub created_at: String,
}

/// A page candidate produced by a discovery phase, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewPage {
    pub url: String,
    pub title: Option<String>,
    pub source: PageSource,
    pub depth: u32,
    pub http_status: Option<u16>,
    pub content_type: Option<String>,
}

impl NewPage {
    pub fn new(url: impl Into<String>, source: PageSource, depth: u32) -> Self {
        Self {
            url: url.into(),
            title: None,
            source,
            depth,
            http_status: None,
            content_type: None,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title.filter(|t| !t.is_empty());
        self
    }
}

/// Error recorded on a failed discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetails {
    pub message: String,
    pub code: String,
}

/// State of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for its `run_at` time
    Queued,
    /// Claimed by a worker
    Running,
    Succeeded,
    /// Permanently failed (retries exhausted or non-retryable error)
    Failed,
}

impl JobState {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
