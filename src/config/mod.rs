//! Configuration module for skeleton discovery
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Only the `[user-agent]` and `[output]` sections are required; every tuning
//! section falls back to the documented defaults.
//!
//! # Example
//!
//! ```no_run
//! use skeleton_discovery::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("discovery.toml")).unwrap();
//! println!("Default page cap: {}", config.discovery.default_max_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheConfig, Config, DiscoveryConfig, FetchConfig, OutputConfig, RateLimitConfig,
    RetryConfig, UserAgentConfig, WorkerConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
