//! Discovery pipeline
//!
//! Orchestrates the sitemap and navigation phases of a discovery job,
//! merges their output and applies the retry policy.

mod coordinator;
mod merge;
mod phases;
mod retry;

pub use coordinator::{Coordinator, JobProgress};
pub use merge::{homepage_page, merge_pages, prioritize};
pub use phases::{
    run_navigation_phase, run_sitemap_phase, sitemap_candidates, NavigationOutput, PhaseContext,
    SITEMAP_PATHS,
};
pub use retry::{Attempt, RetryPolicy};
