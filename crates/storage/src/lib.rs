//! Storage layer for the deepfake analysis system
//!
//! This module provides interfaces and implementations for the two
//! persistence collaborators the pipeline core talks to:
//! - **Object storage (S3/MinIO)**: resolved video files
//! - **Record store (`PostgreSQL`)**: video and analysis-result records
//!
//! The core never touches storage rows or buckets directly; these traits are
//! its sole persistence boundary. Tests substitute the in-memory backends
//! from [`memory`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod object_storage;
pub mod record_store;

pub use memory::{MemoryObjectStorage, MemoryRecordStore};
pub use object_storage::{ObjectStorage, S3Config, S3ObjectStorage};
pub use record_store::{PostgresConfig, PostgresRecordStore, RecordStore};

/// Prediction value stored for a not-yet-finalized analysis record
pub const PENDING_PREDICTION: &str = "pending";

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3Error(String),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Complete storage configuration for both backends
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// S3/MinIO configuration for object storage
    #[serde(default)]
    pub s3: S3Config,

    /// `PostgreSQL` configuration for the record store
    #[serde(default)]
    pub postgres: PostgresConfig,
}

/// New video row, created after upload and before dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVideo {
    pub user_id: i64,
    pub file_url: String,
    pub file_name: String,
}

/// Stored video record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: i64,
    pub user_id: i64,
    pub file_url: String,
    pub file_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// New analysis row; always created in the pending state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAnalysis {
    pub video_id: i64,
    pub job_id: String,
}

/// Stored analysis record
///
/// `prediction` holds [`PENDING_PREDICTION`] until the result tracker
/// finalizes the record, and "REAL" or "FAKE" afterwards. A finalized record
/// is never written again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub video_id: i64,
    pub job_id: String,
    pub prediction: String,
    pub confidence: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl AnalysisRecord {
    /// Whether the verdict write-back has not happened yet
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.prediction == PENDING_PREDICTION
    }
}

/// Joined video + analysis row for a user's analysis history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisHistoryEntry {
    pub file_name: String,
    pub prediction: String,
    pub confidence: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
