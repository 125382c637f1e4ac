//! API request and response types

use deepfake_common::{AnalysisStatus, Verdict};
use serde::{Deserialize, Serialize};

/// Source of the video to analyze
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaSource {
    /// URL to download the video from (hosting-site links included)
    #[serde(rename = "url")]
    Url { location: String },
    /// File already uploaded (local path)
    #[serde(rename = "upload")]
    Upload { location: String },
}

/// Analysis request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Requesting user
    pub user_id: i64,
    /// Video source
    pub source: MediaSource,
}

/// Analysis submission response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    /// Always "pending" on a successful dispatch
    pub status: String,
    /// Job handle to poll with
    pub task_id: String,
}

/// Poll response for a submitted analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Domain-level status name
    pub status: String,
    /// Job handle this response describes
    pub task_id: String,
    /// Verdict, present once the status is "success"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Verdict>,
    /// Failure reason or queue error info
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    /// Shape a domain status into the wire response
    #[must_use]
    pub fn from_status(task_id: String, status: AnalysisStatus) -> Self {
        let name = status.name().to_string();
        let (result, error) = match status {
            AnalysisStatus::Success { result } => (Some(result), None),
            AnalysisStatus::Failed { reason } => (None, Some(reason)),
            AnalysisStatus::Error { info } => (None, Some(info)),
            AnalysisStatus::Pending | AnalysisStatus::Processing => (None, None),
        };

        Self {
            status: name,
            task_id,
            result,
            error,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}
