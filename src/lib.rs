//! Skeleton discovery: maps a website's structure from its homepage
//!
//! This crate implements the background discovery pipeline that, given a
//! homepage URL, combines sitemap parsing, robots.txt compliance and
//! navigation-link extraction into a deduplicated, prioritized page list,
//! defending against SSRF and persisting partial progress under failure.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod discovery;
pub mod queue;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for discovery operations
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Discovery not found: {0}")]
    NotFound(String),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("URL rejected: {0}")]
    Rejected(#[from] crate::url::UrlRejection),

    #[error("{phase} phase failed: {reason}")]
    PhaseFailed { phase: state::Phase, reason: String },

    #[error("All discovery phases failed")]
    AllPhasesFailed,

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl DiscoveryError {
    /// Stable error code persisted on failed discoveries
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::NotFound(_) => "DISCOVERY_NOT_FOUND",
            Self::Reqwest(_) => "HTTP_ERROR",
            Self::Database(_) | Self::StorageError(_) | Self::LockPoisoned => "STORAGE_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::UrlError(_) | Self::UrlParse(_) => "INVALID_URL",
            Self::Rejected(_) => "URL_REJECTED",
            Self::PhaseFailed { .. } => "PHASE_FAILED",
            Self::AllPhasesFailed => "ALL_PHASES_FAILED",
            Self::Json(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Returns true if another attempt of the same job could succeed
    ///
    /// Missing discoveries, bad input and rejected status transitions are
    /// permanent; everything else (network, database, phase failures) is
    /// subject to the retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound(_)
            | Self::Config(_)
            | Self::UrlError(_)
            | Self::UrlParse(_)
            | Self::Rejected(_) => false,
            Self::StorageError(e) => e.is_retryable(),
            _ => true,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use discovery::Coordinator;
pub use queue::{JobRequest, JobResult, Worker};
pub use state::{DiscoveryStatus, ExecutionMode, PageSource, Phase};
pub use crate::url::{dedupe, is_private_host, normalize, validate_url, UrlRejection};
