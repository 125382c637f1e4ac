//! Deepfake classifier worker module
//!
//! Scores a batch of frame embeddings with the trained feed-forward head and
//! derives the verdict, confidence, and explanatory comment. The extended
//! variant additionally renders visual artifacts from per-frame
//! probabilities (see [`artifacts`]).

pub mod artifacts;
pub mod worker;

use anyhow::{Context, Result};
use deepfake_common::{AnalysisError, Prediction, Verdict, EMBEDDING_DIM};
use ndarray::{Array2, Axis};
use once_cell::sync::OnceCell;
use ort::{session::Session, value::TensorRef};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

/// Cached classifier head session, initialized on first use
static CLASSIFIER_SESSION: OnceCell<Mutex<Session>> = OnceCell::new();

/// Uncertainty band around the decision boundary
const UNCERTAIN_LOW: f64 = 0.4;
const UNCERTAIN_HIGH: f64 = 0.6;

/// Classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Path to the MLP head ONNX export
    /// (1792 -> 1024 -> 512 -> 128 -> 1, ReLU + batch norm, dropout inactive)
    pub model_path: String,
    /// Output directory for rendered artifacts
    pub artifacts_dir: PathBuf,
    /// Keep every Nth sampled frame in the gallery artifact
    pub gallery_stride: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: std::env::var("CLASSIFIER_MODEL_PATH")
                .unwrap_or_else(|_| "models/classifier/deepfake_mlp.onnx".to_string()),
            artifacts_dir: PathBuf::from("artifacts"),
            gallery_stride: 5,
        }
    }
}

/// Derive the verdict for a raw classifier probability
///
/// `FAKE` iff `p > 0.5`; exactly at the boundary the video is called REAL.
/// Confidence is the probability mass assigned to the winning class as a
/// percentage, rounded to two decimals, so it lies in [50, 100] except at
/// the boundary where it is exactly 50.
#[must_use]
pub fn verdict_from_probability(p: f64) -> Verdict {
    let prediction = if p > 0.5 {
        Prediction::Fake
    } else {
        Prediction::Real
    };

    let winning = match prediction {
        Prediction::Fake => p,
        Prediction::Real => 1.0 - p,
    };
    let confidence = (winning * 10_000.0).round() / 100.0;

    Verdict {
        prediction,
        confidence,
        probability: p,
        comment: comment_for(prediction, p),
        heatmap_path: None,
        extremes_path: None,
        gallery_path: None,
    }
}

/// Explanatory comment for a prediction
///
/// The uncertainty band is symmetric around the decision boundary and
/// overrides the per-class comments on both sides of it.
fn comment_for(prediction: Prediction, p: f64) -> String {
    if p > UNCERTAIN_LOW && p < UNCERTAIN_HIGH {
        "The model is uncertain about the result. We recommend further verification for greater confidence."
            .to_string()
    } else {
        match prediction {
            Prediction::Real => {
                "Based on the analysis, the model considers this video to be authentic with high confidence."
                    .to_string()
            }
            Prediction::Fake => {
                "Based on the analysis, the model considers this video to be manipulated with high confidence."
                    .to_string()
            }
        }
    }
}

/// Validate and shape a wire-format feature matrix
///
/// # Errors
///
/// Returns `InvalidFeatureShape` unless the matrix is `[N, 1792]` with
/// `N >= 1` and all rows of equal length.
pub fn validate_features(features: &[Vec<f32>]) -> deepfake_common::Result<Array2<f32>> {
    let rows = features.len();
    if rows == 0 {
        return Err(AnalysisError::InvalidFeatureShape { rows: 0, cols: 0 });
    }

    let cols = features[0].len();
    if cols != EMBEDDING_DIM || features.iter().any(|row| row.len() != cols) {
        return Err(AnalysisError::InvalidFeatureShape { rows, cols });
    }

    let mut flat = Vec::with_capacity(rows * cols);
    for row in features {
        flat.extend_from_slice(row);
    }

    Array2::from_shape_vec((rows, cols), flat)
        .map_err(|_| AnalysisError::InvalidFeatureShape { rows, cols })
}

/// MLP scoring head over frame embeddings
pub struct MlpClassifier {
    config: ClassifierConfig,
}

impl MlpClassifier {
    /// Create a new classifier
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Get the process-wide classifier session, loading it on first use
    fn session(&self) -> Result<&'static Mutex<Session>> {
        CLASSIFIER_SESSION.get_or_try_init(|| {
            info!("Loading classifier model from: {}", self.config.model_path);

            let session = Session::builder()
                .context("Failed to create session builder")?
                .commit_from_file(&self.config.model_path)
                .with_context(|| {
                    format!("Failed to load ONNX model from {}", self.config.model_path)
                })?;

            Ok(Mutex::new(session))
        })
    }

    /// Run the head over a `[M, 1792]` batch, returning one probability per row
    fn score_batch(&self, batch: &Array2<f32>) -> Result<Vec<f64>> {
        let session = self.session()?;
        let mut session = session
            .lock()
            .map_err(|_| anyhow::anyhow!("Classifier session lock poisoned"))?;

        let input = TensorRef::from_array_view(batch.view())
            .context("Failed to convert features to ort::TensorRef")?;

        let outputs = session
            .run(ort::inputs!["features" => input])
            .context("Failed to run ONNX inference")?;

        // One logit per row, squashed through a sigmoid
        let (_shape, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract logits tensor")?;

        if logits.len() < batch.nrows() {
            anyhow::bail!(
                "Classifier produced {} logits for {} rows",
                logits.len(),
                batch.nrows()
            );
        }

        Ok(logits[..batch.nrows()]
            .iter()
            .map(|&logit| sigmoid(f64::from(logit)))
            .collect())
    }

    /// Classify a validated `[N, 1792]` feature matrix
    ///
    /// Averages the embeddings across frames and scores the mean vector.
    /// Deterministic for identical features and weights.
    pub fn classify(&self, features: &Array2<f32>) -> Result<Verdict> {
        let mean = features
            .mean_axis(Axis(0))
            .context("Failed to average embeddings")?;
        let mean = mean.insert_axis(Axis(0));

        let p = self.score_batch(&mean)?[0];
        debug!("Classifier probability: {:.4}", p);

        Ok(verdict_from_probability(p))
    }

    /// Score every frame individually (artifact rendering input)
    pub fn frame_probabilities(&self, features: &Array2<f32>) -> Result<Vec<f64>> {
        self.score_batch(features)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
