/// Common types and utilities for the deepfake analysis pipeline
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Embedding dimension produced by the EfficientNet-B4 backbone
pub const EMBEDDING_DIM: usize = 1792;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("File format is invalid: {0}. Please upload a .mp4 or .mov file")]
    InvalidFormat(String),

    #[error("File too large: {size} bytes (max: {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Downloaded video is too small ({size} bytes) - likely a broken download")]
    BrokenDownload { size: u64 },

    #[error("Failed to download video: {0}")]
    DownloadFailed(String),

    #[error("Failed to extract frames from video")]
    NoFramesExtracted,

    #[error("Invalid feature shape: expected [N, {EMBEDDING_DIM}], got [{rows}, {cols}]")]
    InvalidFeatureShape { rows: usize, cols: usize },

    #[error("No video stream found")]
    NoVideoStream,

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Job queue error: {0}")]
    QueueError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Classification outcome for a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prediction {
    #[serde(rename = "REAL")]
    Real,
    #[serde(rename = "FAKE")]
    Fake,
}

impl Prediction {
    /// Database / wire representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Prediction::Real => "REAL",
            Prediction::Fake => "FAKE",
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final output of a classification job
///
/// Produced exactly once per job by the classifier worker; immutable after
/// that. Artifact paths are present only when the extended rendering path
/// ran and succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// REAL or FAKE
    pub prediction: Prediction,
    /// Probability mass assigned to the winning class, as a percentage
    /// rounded to two decimals (50.0 to 100.0)
    pub confidence: f64,
    /// Raw sigmoid output of the classifier head
    pub probability: f64,
    /// Human-readable explanation of the result
    pub comment: String,
    /// Per-frame probability heat strip image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heatmap_path: Option<String>,
    /// Side-by-side snapshot of the most-REAL and most-FAKE frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extremes_path: Option<String>,
    /// Sparse gallery of sampled frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gallery_path: Option<String>,
}

/// Domain-level status of an analysis job as seen by a poller
///
/// Maps 1:1 from the queue states PENDING / STARTED / SUCCESS / FAILURE /
/// anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// Job submitted, not yet picked up by a worker
    Pending,
    /// Job picked up and executing
    Processing,
    /// Job finished with a verdict
    Success { result: Verdict },
    /// Job finished with an error
    Failed { reason: String },
    /// Queue reported a state outside the known lifecycle
    Error { info: String },
}

impl AnalysisStatus {
    /// Get human-readable status name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
            Self::Error { .. } => "error",
        }
    }

    /// Check if this status is terminal (no further transitions)
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success { .. } | Self::Failed { .. } | Self::Error { .. }
        )
    }
}
