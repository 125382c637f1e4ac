//! Record store implementation using `PostgreSQL`
//!
//! Holds the video and analysis-result records the pipeline creates around
//! dispatch, and implements the one-time verdict write-back as a single
//! conditional UPDATE guarded by the pending predicate.

use crate::{
    AnalysisHistoryEntry, AnalysisRecord, NewAnalysis, NewVideo, StorageError, StorageResult,
    PENDING_PREDICTION,
};
use serde::{Deserialize, Serialize};
use tokio_postgres::{Client, NoTls};

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub database: String,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("POSTGRES_DB")
                .unwrap_or_else(|_| "deepfake_analysis".to_string()),
            user: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("POSTGRES_PASSWORD").unwrap_or_default(),
        }
    }
}

impl PostgresConfig {
    /// Build connection string
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

/// Record store trait
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Initialize database schema (create tables if not exist)
    async fn init_schema(&self) -> StorageResult<()>;

    /// Store a video record, returning its id
    async fn create_video(&self, video: &NewVideo) -> StorageResult<i64>;

    /// Store an analysis record in the pending state, returning its id
    async fn create_analysis(&self, analysis: &NewAnalysis) -> StorageResult<i64>;

    /// Retrieve the analysis record for a job handle
    async fn get_analysis_by_job(&self, job_id: &str) -> StorageResult<Option<AnalysisRecord>>;

    /// Finalize a pending analysis record with its verdict
    ///
    /// Must be implemented as one conditional update guarded by the pending
    /// predicate, not a separate read followed by a write. Returns whether a
    /// row actually transitioned; `false` means the record was already
    /// finalized (or the job is unknown) and nothing changed.
    async fn finalize_analysis(
        &self,
        job_id: &str,
        prediction: &str,
        confidence: f64,
    ) -> StorageResult<bool>;

    /// Per-user analysis history (joined with video records, newest first)
    async fn history_for_user(&self, user_id: i64) -> StorageResult<Vec<AnalysisHistoryEntry>>;
}

/// `PostgreSQL` record store implementation
pub struct PostgresRecordStore {
    client: Client,
}

impl PostgresRecordStore {
    /// Create a new `PostgreSQL` record store client
    pub async fn new(config: PostgresConfig) -> StorageResult<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        // Spawn connection in background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl RecordStore for PostgresRecordStore {
    async fn init_schema(&self) -> StorageResult<()> {
        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS videos (
                    id BIGSERIAL PRIMARY KEY,
                    user_id BIGINT NOT NULL,
                    file_url TEXT NOT NULL,
                    file_name TEXT NOT NULL,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS analysis_results (
                    id BIGSERIAL PRIMARY KEY,
                    video_id BIGINT NOT NULL REFERENCES videos(id),
                    job_id TEXT NOT NULL UNIQUE,
                    prediction TEXT NOT NULL,
                    confidence DOUBLE PRECISION NOT NULL,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_videos_user_id ON videos(user_id)",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tracing::info!("PostgreSQL schema initialized");

        Ok(())
    }

    async fn create_video(&self, video: &NewVideo) -> StorageResult<i64> {
        let row = self
            .client
            .query_one(
                r"
                INSERT INTO videos (user_id, file_url, file_name)
                VALUES ($1, $2, $3)
                RETURNING id
                ",
                &[&video.user_id, &video.file_url, &video.file_name],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(row.get(0))
    }

    async fn create_analysis(&self, analysis: &NewAnalysis) -> StorageResult<i64> {
        let row = self
            .client
            .query_one(
                r"
                INSERT INTO analysis_results (video_id, job_id, prediction, confidence)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                ",
                &[
                    &analysis.video_id,
                    &analysis.job_id,
                    &PENDING_PREDICTION,
                    &0.0f64,
                ],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(row.get(0))
    }

    async fn get_analysis_by_job(&self, job_id: &str) -> StorageResult<Option<AnalysisRecord>> {
        let row = self
            .client
            .query_opt(
                r"
                SELECT id, video_id, job_id, prediction, confidence, created_at
                FROM analysis_results
                WHERE job_id = $1
                ",
                &[&job_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(row.map(|row| AnalysisRecord {
            id: row.get(0),
            video_id: row.get(1),
            job_id: row.get(2),
            prediction: row.get(3),
            confidence: row.get(4),
            created_at: row.get(5),
        }))
    }

    async fn finalize_analysis(
        &self,
        job_id: &str,
        prediction: &str,
        confidence: f64,
    ) -> StorageResult<bool> {
        // One guarded statement: concurrent pollers race on the pending
        // predicate inside the database, and at most one of them wins
        let rows = self
            .client
            .execute(
                r"
                UPDATE analysis_results
                SET prediction = $2, confidence = $3
                WHERE job_id = $1 AND prediction = $4
                ",
                &[&job_id, &prediction, &confidence, &PENDING_PREDICTION],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(rows > 0)
    }

    async fn history_for_user(&self, user_id: i64) -> StorageResult<Vec<AnalysisHistoryEntry>> {
        let rows = self
            .client
            .query(
                r"
                SELECT v.file_name, a.prediction, a.confidence, a.created_at
                FROM analysis_results a
                JOIN videos v ON v.id = a.video_id
                WHERE v.user_id = $1
                ORDER BY a.created_at DESC
                ",
                &[&user_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        let entries = rows
            .into_iter()
            .map(|row| AnalysisHistoryEntry {
                file_name: row.get(0),
                prediction: row.get(1),
                confidence: row.get(2),
                created_at: row.get(3),
            })
            .collect();

        Ok(entries)
    }
}
