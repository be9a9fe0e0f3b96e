//! State module for discovery lifecycle tracking
//!
//! # Components
//!
//! - `DiscoveryStatus`: lifecycle of a discovery (pending, running, terminal states)
//! - `Phase`: the sitemap and navigation phases of a run
//! - `PageSource`: where a discovered page came from
//! - `ExecutionMode`: automatic or manual discovery

mod discovery_state;

// Re-export main types
pub use discovery_state::{DiscoveryStatus, ExecutionMode, PageSource, Phase};
