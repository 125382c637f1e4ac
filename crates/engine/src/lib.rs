//! Deepfake analysis engine
//!
//! Coordinates the video analysis pipeline: source resolution, upload,
//! record creation, frame sampling, feature encoding, and dispatch to the
//! classification job queue, plus the poll-side result tracking with its
//! idempotent verdict write-back.
//!
//! The synchronous half (download, decode, encode) runs inside one
//! `spawn_blocking` section per request; everything after the dispatch is
//! non-blocking from the caller's perspective.

pub mod resolver;
pub mod tracker;

use async_trait::async_trait;
use deepfake_common::{AnalysisError, AnalysisStatus, Result};
use deepfake_encoder::{EncoderConfig, FeatureEncoder};
use deepfake_queue::{ClassificationJob, JobQueue};
use deepfake_sampler::SamplerConfig;
use deepfake_storage::{NewAnalysis, NewVideo, ObjectStorage, RecordStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub use resolver::{ResolvedVideo, VideoSource};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of frames sampled per video
    pub max_frames: usize,
    /// Classifier model identifier submitted with each job
    pub model: String,
    /// Render explanatory artifacts alongside the verdict
    pub render_artifacts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_frames: 60,
            model: "deepfake_mlp".to_string(),
            render_artifacts: false,
        }
    }
}

/// Receipt for a dispatched analysis; the job starts out pending
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSubmission {
    pub job_id: String,
}

/// Polymorphic interface over the analysis capability set
///
/// One concrete implementation is selected at process start; tests
/// substitute stubs.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Resolve, validate, persist and encode a video, then dispatch its
    /// classification; returns as soon as the job is queued
    async fn analyze_video(&self, user_id: i64, source: VideoSource)
        -> Result<AnalysisSubmission>;

    /// Non-blocking status check with the one-time verdict write-back
    async fn get_result(&self, job_id: &str) -> Result<AnalysisStatus>;
}

/// Blocking frame-sampling + encoding step
///
/// Separated behind a trait so engine tests can substitute a stub; the
/// production implementation is [`PipelineFeatureExtractor`]. Implementors
/// are blocking and must be called via `spawn_blocking`.
pub trait FeatureExtractor: Send + Sync {
    /// Sample frames from the video file and encode them
    ///
    /// When `save_frames` is set, sampled frames are additionally written as
    /// JPEGs into a fresh temp directory whose path is returned for the
    /// worker's artifact rendering.
    fn extract(
        &self,
        video_path: &Path,
        save_frames: bool,
    ) -> Result<(Vec<Vec<f32>>, Option<PathBuf>)>;
}

/// Production extractor: FFmpeg sampling into the frozen backbone
pub struct PipelineFeatureExtractor {
    sampler: SamplerConfig,
    encoder: FeatureEncoder,
}

impl PipelineFeatureExtractor {
    #[must_use]
    pub fn new(sampler: SamplerConfig, encoder_config: EncoderConfig) -> Self {
        Self {
            sampler,
            encoder: FeatureEncoder::new(encoder_config),
        }
    }
}

impl FeatureExtractor for PipelineFeatureExtractor {
    fn extract(
        &self,
        video_path: &Path,
        save_frames: bool,
    ) -> Result<(Vec<Vec<f32>>, Option<PathBuf>)> {
        let frames = deepfake_sampler::sample_frames(video_path, &self.sampler)?;

        let frame_dir = if save_frames {
            Some(persist_frames(&frames)?)
        } else {
            None
        };

        let features = self
            .encoder
            .encode(&frames)
            .map_err(|e| AnalysisError::InferenceError(e.to_string()))?;

        let features = features.outer_iter().map(|row| row.to_vec()).collect();
        Ok((features, frame_dir))
    }
}

/// Write sampled frames to a per-job temp directory for artifact rendering
///
/// The worker removes the directory once it is done with it.
fn persist_frames(frames: &[image::RgbImage]) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("deepfake_frames_{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir)?;

    for (i, frame) in frames.iter().enumerate() {
        frame
            .save(dir.join(format!("frame_{i:04}.jpg")))
            .map_err(|e| AnalysisError::Other(format!("Failed to save frame {i}: {e}")))?;
    }

    debug!("Persisted {} sampled frames to {:?}", frames.len(), dir);
    Ok(dir)
}

/// Concrete analysis engine over injected collaborators
pub struct DeepfakeEngine {
    config: EngineConfig,
    extractor: Arc<dyn FeatureExtractor>,
    storage: Arc<dyn ObjectStorage>,
    records: Arc<dyn RecordStore>,
    queue: Arc<dyn JobQueue>,
}

impl DeepfakeEngine {
    /// Create an engine with the production extractor
    #[must_use]
    pub fn new(
        config: EngineConfig,
        encoder_config: EncoderConfig,
        storage: Arc<dyn ObjectStorage>,
        records: Arc<dyn RecordStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let sampler = SamplerConfig {
            max_frames: config.max_frames,
        };
        Self {
            config,
            extractor: Arc::new(PipelineFeatureExtractor::new(sampler, encoder_config)),
            storage,
            records,
            queue,
        }
    }

    /// Create an engine with a custom extractor
    #[must_use]
    pub fn with_extractor(
        config: EngineConfig,
        extractor: Arc<dyn FeatureExtractor>,
        storage: Arc<dyn ObjectStorage>,
        records: Arc<dyn RecordStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            config,
            extractor,
            storage,
            records,
            queue,
        }
    }
}

#[async_trait]
impl InferenceEngine for DeepfakeEngine {
    async fn analyze_video(
        &self,
        user_id: i64,
        source: VideoSource,
    ) -> Result<AnalysisSubmission> {
        // Resolve and validate the source; nothing is persisted on failure
        let resolved = resolver::resolve(source).await?;

        let key = format!("{user_id}/{}", resolved.file_name);
        let file_url = self
            .storage
            .upload(&key, &resolved.data)
            .await
            .map_err(|e| AnalysisError::StorageError(e.to_string()))?;

        let video_id = self
            .records
            .create_video(&NewVideo {
                user_id,
                file_url: file_url.clone(),
                file_name: resolved.file_name.clone(),
            })
            .await
            .map_err(|e| AnalysisError::StorageError(e.to_string()))?;

        info!(
            "Stored video {} for user {} at {}",
            video_id, user_id, file_url
        );

        // Blocking media + inference section, off the request loop
        let extractor = self.extractor.clone();
        let render_artifacts = self.config.render_artifacts;
        let data = resolved.data;
        let file_name = resolved.file_name;
        let (features, frame_dir) = tokio::task::spawn_blocking(move || {
            let temp_file = resolver::spill_to_temp_file(&data, &file_name)?;
            extractor.extract(temp_file.path(), render_artifacts)
        })
        .await
        .map_err(|e| AnalysisError::Other(format!("Analysis task failed: {e}")))??;

        // Dispatch, then create the pending record keyed by the job handle
        let job_id = self
            .queue
            .submit(ClassificationJob {
                model: self.config.model.clone(),
                features,
                frame_dir,
            })
            .await?;

        self.records
            .create_analysis(&NewAnalysis {
                video_id,
                job_id: job_id.clone(),
            })
            .await
            .map_err(|e| AnalysisError::StorageError(e.to_string()))?;

        info!("Dispatched classification job {} for video {}", job_id, video_id);

        Ok(AnalysisSubmission { job_id })
    }

    async fn get_result(&self, job_id: &str) -> Result<AnalysisStatus> {
        tracker::poll(self.queue.as_ref(), self.records.as_ref(), job_id).await
    }
}
