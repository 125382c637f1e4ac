//! Worker-side job handler
//!
//! Bridges the queue boundary to the classifier: deserializes the wire
//! payload, validates the feature matrix, produces the verdict, and renders
//! artifacts when the payload names a frame directory. Runs on the worker
//! pool's blocking threads; any returned error becomes the job's FAILURE
//! payload.

use crate::{artifacts, validate_features, MlpClassifier};
use anyhow::{Context, Result};
use deepfake_common::Verdict;
use deepfake_queue::{ClassificationJob, JobHandler};
use serde_json::Value;
use tracing::warn;

/// Queue handler that owns verdict production
pub struct ClassificationHandler {
    classifier: MlpClassifier,
}

impl ClassificationHandler {
    #[must_use]
    pub fn new(classifier: MlpClassifier) -> Self {
        Self { classifier }
    }
}

impl JobHandler for ClassificationHandler {
    fn run(&self, payload: &Value) -> Result<Verdict> {
        let job: ClassificationJob = serde_json::from_value(payload.clone())
            .context("Failed to deserialize job payload")?;

        let features = validate_features(&job.features)?;
        let mut verdict = self.classifier.classify(&features)?;

        if let Some(frame_dir) = job.frame_dir.as_deref() {
            // Artifact rendering is best-effort; the verdict stands either way
            match self.classifier.frame_probabilities(&features) {
                Ok(probs) => {
                    let config = self.classifier.config();
                    let paths = artifacts::render_artifacts(
                        frame_dir,
                        &probs,
                        &config.artifacts_dir,
                        config.gallery_stride,
                    );
                    verdict.heatmap_path = paths.heatmap;
                    verdict.extremes_path = paths.extremes;
                    verdict.gallery_path = paths.gallery;
                }
                Err(e) => warn!("Skipping artifact rendering: {e}"),
            }

            if let Err(e) = std::fs::remove_dir_all(frame_dir) {
                warn!("Failed to remove frame directory {:?}: {}", frame_dir, e);
            }
        }

        Ok(verdict)
    }
}
