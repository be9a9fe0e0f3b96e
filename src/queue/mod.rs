//! Job queue module
//!
//! Discovery work is submitted as a [`JobRequest`], persisted in the `jobs`
//! table and executed by a [`Worker`]. Each run reports a [`JobResult`].

mod worker;

pub use worker::{JobOutcome, Worker};

use crate::state::{DiscoveryStatus, ExecutionMode};
use crate::storage::{Discovery, JobState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of a discovery job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub discovery_id: String,
    pub homepage_url: String,
    pub mode: ExecutionMode,
    pub session_id: Option<String>,
    pub max_pages: u32,
    pub max_depth: u32,
}

impl JobRequest {
    pub fn from_discovery(discovery: &Discovery) -> Self {
        Self {
            discovery_id: discovery.id.clone(),
            homepage_url: discovery.homepage_url.clone(),
            mode: discovery.mode,
            session_id: discovery.session_id.clone(),
            max_pages: discovery.max_pages,
            max_depth: discovery.max_depth,
        }
    }
}

/// Outcome reported by a finished job run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub discovery_id: String,
    pub status: DiscoveryStatus,
    pub page_count: u64,
    pub partial_results: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobResult {
    pub fn from_discovery(discovery: &Discovery, page_count: u64) -> Self {
        Self {
            discovery_id: discovery.id.clone(),
            status: discovery.status,
            page_count,
            partial_results: discovery.partial_results,
            error_message: discovery.error_message.clone(),
        }
    }
}

/// A job row of the durable queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub request: JobRequest,
    pub state: JobState,
    /// Attempts started so far, including the current one once claimed
    pub attempts: u32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_result_json_is_camel_case() {
        let result = JobResult {
            discovery_id: "abc".to_string(),
            status: DiscoveryStatus::Completed,
            page_count: 3,
            partial_results: true,
            error_message: None,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["discoveryId"], "abc");
        assert_eq!(json["status"], "COMPLETED");
        assert_eq!(json["pageCount"], 3);
        assert_eq!(json["partialResults"], true);
        assert!(json.get("errorMessage").is_none());
    }

    #[test]
    fn test_job_request_json() {
        let json = r#"{
            "discoveryId": "d1",
            "homepageUrl": "https://example.com",
            "mode": "MANUAL",
            "sessionId": null,
            "maxPages": 5,
            "maxDepth": 1
        }"#;
        let request: JobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.mode, ExecutionMode::Manual);
        assert_eq!(request.max_pages, 5);
    }
}
