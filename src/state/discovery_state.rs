//! Discovery lifecycle and page classification enums
//!
//! This module defines the states a discovery moves through, the phases of a
//! discovery run, and where each discovered page came from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryStatus {
    /// Created by the service layer, waiting for a worker
    Pending,

    /// Picked up by a worker
    Running,

    // ===== Terminal States =====
    /// Finished, possibly with partial results
    Completed,

    /// Exhausted retries without collecting any page
    Failed,

    /// Cancelled by an external actor
    Cancelled,
}

impl DiscoveryStatus {
    /// Returns true if no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Checks whether the lifecycle allows moving from `self` to `next`
    ///
    /// `Running -> Running` is accepted so a retried attempt can re-enter the
    /// state it left behind.
    pub fn can_transition_to(&self, next: DiscoveryStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Cancelled | Self::Failed),
            Self::Running => matches!(
                next,
                Self::Running | Self::Completed | Self::Failed | Self::Cancelled
            ),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Running,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for DiscoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// How the discovery was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    #[default]
    Auto,
    Manual,
}

impl ExecutionMode {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Manual => "MANUAL",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "AUTO" => Some(Self::Auto),
            "MANUAL" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// An independently fault-tolerant discovery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Sitemap,
    Navigation,
}

impl Phase {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Sitemap => "sitemap",
            Self::Navigation => "navigation",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "sitemap" => Some(Self::Sitemap),
            "navigation" => Some(Self::Navigation),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Where a discovered page came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageSource {
    Sitemap,
    Navigation,
    Crawled,
    Manual,
}

impl PageSource {
    /// Merge precedence (lower wins a tie on equal depth)
    pub fn rank(&self) -> u8 {
        match self {
            Self::Sitemap => 0,
            Self::Navigation => 1,
            Self::Crawled => 2,
            Self::Manual => 3,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Sitemap => "SITEMAP",
            Self::Navigation => "NAVIGATION",
            Self::Crawled => "CRAWLED",
            Self::Manual => "MANUAL",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "SITEMAP" => Some(Self::Sitemap),
            "NAVIGATION" => Some(Self::Navigation),
            "CRAWLED" => Some(Self::Crawled),
            "MANUAL" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for PageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!DiscoveryStatus::Pending.is_terminal());
        assert!(!DiscoveryStatus::Running.is_terminal());

        assert!(DiscoveryStatus::Completed.is_terminal());
        assert!(DiscoveryStatus::Failed.is_terminal());
        assert!(DiscoveryStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_lifecycle_transitions() {
        use DiscoveryStatus::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));

        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Cancelled));
        assert!(!Running.can_transition_to(Pending));
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        for from in [
            DiscoveryStatus::Completed,
            DiscoveryStatus::Failed,
            DiscoveryStatus::Cancelled,
        ] {
            for to in DiscoveryStatus::all_statuses() {
                assert!(
                    !from.can_transition_to(to),
                    "{:?} -> {:?} should be rejected",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_roundtrip_db_string() {
        for status in DiscoveryStatus::all_statuses() {
            let db_str = status.to_db_string();
            assert_eq!(Some(status), DiscoveryStatus::from_db_string(db_str));
        }
        assert_eq!(DiscoveryStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_source_rank_prefers_sitemap() {
        assert!(PageSource::Sitemap.rank() < PageSource::Navigation.rank());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&DiscoveryStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
        assert_eq!(
            serde_json::to_string(&PageSource::Navigation).unwrap(),
            "\"NAVIGATION\""
        );
        assert_eq!(serde_json::to_string(&Phase::Sitemap).unwrap(), "\"sitemap\"");
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", DiscoveryStatus::Running), "RUNNING");
        assert_eq!(format!("{}", Phase::Navigation), "navigation");
        assert_eq!(format!("{}", PageSource::Sitemap), "SITEMAP");
    }
}
