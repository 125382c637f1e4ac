//! In-memory storage backends
//!
//! Drop-in stand-ins for the S3 and `PostgreSQL` implementations, used by
//! tests and local development. The record store applies the same
//! pending-guarded compare-and-set as the SQL implementation, atomically
//! under a single lock.

use crate::{
    AnalysisHistoryEntry, AnalysisRecord, NewAnalysis, NewVideo, ObjectStorage, RecordStore,
    StorageError, StorageResult, VideoRecord, PENDING_PREDICTION,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory object storage
#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(&self, key: &str, data: &[u8]) -> StorageResult<String> {
        let mut objects = self.objects.write().await;
        objects.insert(key.to_string(), data.to_vec());
        Ok(format!("memory://{key}"))
    }

    async fn retrieve(&self, key: &str) -> StorageResult<Vec<u8>> {
        let objects = self.objects.read().await;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut objects = self.objects.write().await;
        objects.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let objects = self.objects.read().await;
        Ok(objects.contains_key(key))
    }
}

#[derive(Default)]
struct RecordTables {
    next_id: i64,
    videos: Vec<VideoRecord>,
    analyses: Vec<AnalysisRecord>,
}

impl RecordTables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory record store
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<RecordTables>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn init_schema(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn create_video(&self, video: &NewVideo) -> StorageResult<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.allocate_id();
        tables.videos.push(VideoRecord {
            id,
            user_id: video.user_id,
            file_url: video.file_url.clone(),
            file_name: video.file_name.clone(),
            created_at: chrono::Utc::now(),
        });
        Ok(id)
    }

    async fn create_analysis(&self, analysis: &NewAnalysis) -> StorageResult<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.allocate_id();
        tables.analyses.push(AnalysisRecord {
            id,
            video_id: analysis.video_id,
            job_id: analysis.job_id.clone(),
            prediction: PENDING_PREDICTION.to_string(),
            confidence: 0.0,
            created_at: chrono::Utc::now(),
        });
        Ok(id)
    }

    async fn get_analysis_by_job(&self, job_id: &str) -> StorageResult<Option<AnalysisRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .analyses
            .iter()
            .find(|record| record.job_id == job_id)
            .cloned())
    }

    async fn finalize_analysis(
        &self,
        job_id: &str,
        prediction: &str,
        confidence: f64,
    ) -> StorageResult<bool> {
        // Check-and-write under one lock, matching the SQL guarded UPDATE
        let mut tables = self.tables.write().await;
        let Some(record) = tables
            .analyses
            .iter_mut()
            .find(|record| record.job_id == job_id)
        else {
            return Ok(false);
        };

        if record.prediction != PENDING_PREDICTION {
            return Ok(false);
        }

        record.prediction = prediction.to_string();
        record.confidence = confidence;
        Ok(true)
    }

    async fn history_for_user(&self, user_id: i64) -> StorageResult<Vec<AnalysisHistoryEntry>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<AnalysisHistoryEntry> = tables
            .analyses
            .iter()
            .filter_map(|analysis| {
                tables
                    .videos
                    .iter()
                    .find(|video| video.id == analysis.video_id && video.user_id == user_id)
                    .map(|video| AnalysisHistoryEntry {
                        file_name: video.file_name.clone(),
                        prediction: analysis.prediction.clone(),
                        confidence: analysis.confidence,
                        created_at: analysis.created_at,
                    })
            })
            .collect();

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_object_storage_round_trip() {
        let storage = MemoryObjectStorage::new();

        let url = storage.upload("user/video.mp4", b"bytes").await.unwrap();
        assert_eq!(url, "memory://user/video.mp4");
        assert!(storage.exists("user/video.mp4").await.unwrap());
        assert_eq!(storage.retrieve("user/video.mp4").await.unwrap(), b"bytes");

        storage.delete("user/video.mp4").await.unwrap();
        assert!(!storage.exists("user/video.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let store = MemoryRecordStore::new();

        let video_id = store
            .create_video(&NewVideo {
                user_id: 1,
                file_url: "memory://a.mp4".to_string(),
                file_name: "a.mp4".to_string(),
            })
            .await
            .unwrap();
        store
            .create_analysis(&NewAnalysis {
                video_id,
                job_id: "job-1".to_string(),
            })
            .await
            .unwrap();

        // First finalize wins
        assert!(store.finalize_analysis("job-1", "FAKE", 91.2).await.unwrap());

        // Second write is skipped and changes nothing
        assert!(!store.finalize_analysis("job-1", "REAL", 55.0).await.unwrap());

        let record = store.get_analysis_by_job("job-1").await.unwrap().unwrap();
        assert_eq!(record.prediction, "FAKE");
        assert_eq!(record.confidence, 91.2);
        assert!(!record.is_pending());
    }

    #[tokio::test]
    async fn test_finalize_unknown_job_is_noop() {
        let store = MemoryRecordStore::new();
        assert!(!store.finalize_analysis("ghost", "REAL", 60.0).await.unwrap());
    }

    #[tokio::test]
    async fn test_history_joins_video_records() {
        let store = MemoryRecordStore::new();

        let video_id = store
            .create_video(&NewVideo {
                user_id: 42,
                file_url: "memory://clip.mp4".to_string(),
                file_name: "clip.mp4".to_string(),
            })
            .await
            .unwrap();
        store
            .create_analysis(&NewAnalysis {
                video_id,
                job_id: "job-9".to_string(),
            })
            .await
            .unwrap();
        store.finalize_analysis("job-9", "REAL", 88.3).await.unwrap();

        let history = store.history_for_user(42).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].file_name, "clip.mp4");
        assert_eq!(history[0].prediction, "REAL");

        assert!(store.history_for_user(7).await.unwrap().is_empty());
    }
}
