//! Visual feature extraction module
//!
//! Runs sampled frames through a frozen EfficientNet-B4 backbone (ONNX
//! export with the classification head removed) to produce one fixed-length
//! embedding per frame. The backbone is loaded once per process and reused
//! read-only across requests.

use anyhow::{Context, Result};
use deepfake_common::EMBEDDING_DIM;
use image::RgbImage;
use ndarray::{Array2, Array4};
use once_cell::sync::OnceCell;
use ort::{session::Session, value::TensorRef};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info};

/// Cached backbone session, initialized on first use
static BACKBONE_SESSION: OnceCell<Mutex<Session>> = OnceCell::new();

/// Feature encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Path to the backbone ONNX model file
    pub model_path: String,
    /// Input image size expected by the backbone (380 for EfficientNet-B4)
    pub image_size: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model_path: std::env::var("BACKBONE_MODEL_PATH")
                .unwrap_or_else(|_| "models/encoder/efficientnet_b4_backbone.onnx".to_string()),
            image_size: 380,
        }
    }
}

/// Frame feature extractor over the frozen backbone
pub struct FeatureEncoder {
    config: EncoderConfig,
}

impl FeatureEncoder {
    /// Create a new feature encoder
    #[must_use]
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Get the process-wide backbone session, loading it on first use
    fn session(&self) -> Result<&'static Mutex<Session>> {
        BACKBONE_SESSION.get_or_try_init(|| {
            info!("Loading backbone model from: {}", self.config.model_path);

            let session = Session::builder()
                .context("Failed to create session builder")?
                .commit_from_file(&self.config.model_path)
                .with_context(|| {
                    format!("Failed to load ONNX model from {}", self.config.model_path)
                })?;

            Ok(Mutex::new(session))
        })
    }

    /// Extract embeddings from frames
    ///
    /// Blocking and CPU/GPU-bound; callers on an async runtime must run this
    /// via `spawn_blocking`.
    ///
    /// # Arguments
    /// * `frames` - Sampled RGB frames to encode
    ///
    /// # Returns
    /// Embedding matrix of shape `[frame_count, 1792]`
    pub fn encode(&self, frames: &[RgbImage]) -> Result<Array2<f32>> {
        if frames.is_empty() {
            anyhow::bail!("No frames to encode");
        }

        debug!("Encoding {} frames", frames.len());

        // Preprocess frames into a batched NCHW tensor
        let input_tensor = Self::preprocess_frames(&self.config, frames)?;

        let session = self.session()?;
        let mut session = session
            .lock()
            .map_err(|_| anyhow::anyhow!("Backbone session lock poisoned"))?;

        // Convert to ort::TensorRef
        let pixel_values = TensorRef::from_array_view(input_tensor.view())
            .context("Failed to convert input to ort::TensorRef")?;

        // Run inference
        let outputs = session
            .run(ort::inputs!["pixel_values" => pixel_values])
            .context("Failed to run ONNX inference")?;

        // Extract pooled features [N, 1792]
        let (_shape, features) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract features tensor")?;

        let expected = frames.len() * EMBEDDING_DIM;
        if features.len() < expected {
            anyhow::bail!(
                "Backbone produced {} values, expected {}",
                features.len(),
                expected
            );
        }

        let matrix = Array2::from_shape_vec(
            (frames.len(), EMBEDDING_DIM),
            features[..expected].to_vec(),
        )
        .context("Failed to shape embedding matrix")?;

        debug!("Extracted {} embeddings ({}-dim)", matrix.nrows(), EMBEDDING_DIM);
        Ok(matrix)
    }

    /// Preprocess frames for the backbone
    fn preprocess_frames(config: &EncoderConfig, frames: &[RgbImage]) -> Result<Array4<f32>> {
        let size = config.image_size;
        let batch_size = frames.len();

        // Create tensor with shape [batch_size, 3, height, width]
        let mut tensor = Array4::<f32>::zeros((batch_size, 3, size as usize, size as usize));

        for (i, frame) in frames.iter().enumerate() {
            // Resize frame to the backbone input size
            let img =
                image::imageops::resize(frame, size, size, image::imageops::FilterType::Lanczos3);

            // Convert to tensor format (NCHW) with ImageNet normalization
            // mean = [0.485, 0.456, 0.406], std = [0.229, 0.224, 0.225]
            for y in 0..size as usize {
                for x in 0..size as usize {
                    let pixel = img.get_pixel(x as u32, y as u32);
                    tensor[[i, 0, y, x]] = (f32::from(pixel[0]) / 255.0 - 0.485) / 0.229;
                    tensor[[i, 1, y, x]] = (f32::from(pixel[1]) / 255.0 - 0.456) / 0.224;
                    tensor[[i, 2, y, x]] = (f32::from(pixel[2]) / 255.0 - 0.406) / 0.225;
                }
            }
        }

        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncoderConfig::default();
        assert_eq!(config.image_size, 380);
        assert!(config.model_path.ends_with(".onnx"));
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let config = EncoderConfig {
            model_path: String::new(),
            image_size: 380,
        };

        let white = RgbImage::from_pixel(64, 48, image::Rgb([255, 255, 255]));
        let black = RgbImage::from_pixel(64, 48, image::Rgb([0, 0, 0]));

        let tensor = FeatureEncoder::preprocess_frames(&config, &[white, black]).unwrap();
        assert_eq!(tensor.shape(), &[2, 3, 380, 380]);

        // White pixel, red channel: (1.0 - 0.485) / 0.229
        assert!((tensor[[0, 0, 0, 0]] - (1.0 - 0.485) / 0.229).abs() < 1e-5);
        // Black pixel, blue channel: (0.0 - 0.406) / 0.225
        assert!((tensor[[1, 2, 0, 0]] - (-0.406 / 0.225)).abs() < 1e-5);
    }

    #[test]
    fn test_encode_rejects_empty_batch() {
        let encoder = FeatureEncoder::new(EncoderConfig::default());
        assert!(encoder.encode(&[]).is_err());
    }

    #[test]
    #[ignore] // Requires the EfficientNet-B4 ONNX export on disk
    fn test_encode_real_model() {
        let encoder = FeatureEncoder::new(EncoderConfig::default());
        let frame = RgbImage::from_pixel(380, 380, image::Rgb([128, 64, 32]));

        let features = encoder.encode(&[frame.clone(), frame]).expect("inference failed");
        assert_eq!(features.shape(), &[2, EMBEDDING_DIM]);

        // Identical frames must produce identical embeddings
        let row0 = features.row(0);
        let row1 = features.row(1);
        for (a, b) in row0.iter().zip(row1.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
