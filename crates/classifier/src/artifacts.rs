//! Explanatory artifact rendering
//!
//! Renders a per-frame probability heat strip, a side-by-side snapshot of
//! the most-REAL and most-FAKE sampled frames, and a sparse frame gallery.
//! All rendering is best-effort: a failed artifact is logged and its path
//! omitted from the verdict, never escalated to a classification failure.

use anyhow::{Context, Result};
use image::{imageops, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HEAT_CELL_WIDTH: u32 = 24;
const HEAT_STRIP_HEIGHT: u32 = 32;
const GALLERY_TILE_HEIGHT: u32 = 180;

/// Rendered artifact locations; a `None` slot means that artifact was not
/// produced
#[derive(Debug, Default, Clone)]
pub struct ArtifactPaths {
    pub heatmap: Option<String>,
    pub extremes: Option<String>,
    pub gallery: Option<String>,
}

/// Render all artifacts for a job, tolerating per-artifact failures
#[must_use]
pub fn render_artifacts(
    frame_dir: &Path,
    probs: &[f64],
    out_dir: &Path,
    gallery_stride: usize,
) -> ArtifactPaths {
    let tag = frame_dir
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("job")
        .to_string();

    if let Err(e) = std::fs::create_dir_all(out_dir) {
        warn!("Failed to create artifacts dir {:?}: {}", out_dir, e);
        return ArtifactPaths::default();
    }

    let mut paths = ArtifactPaths::default();

    let heatmap_path = out_dir.join(format!("{tag}_heatmap.png"));
    match render_heat_strip(probs, &heatmap_path) {
        Ok(()) => paths.heatmap = Some(heatmap_path.display().to_string()),
        Err(e) => warn!("Heat strip rendering failed: {e}"),
    }

    let extremes_path = out_dir.join(format!("{tag}_extremes.jpg"));
    match render_extremes(frame_dir, probs, &extremes_path) {
        Ok(()) => paths.extremes = Some(extremes_path.display().to_string()),
        Err(e) => warn!("Extreme-frame rendering failed: {e}"),
    }

    let gallery_path = out_dir.join(format!("{tag}_gallery.jpg"));
    match render_gallery(frame_dir, gallery_stride, &gallery_path) {
        Ok(()) => paths.gallery = Some(gallery_path.display().to_string()),
        Err(e) => warn!("Gallery rendering failed: {e}"),
    }

    debug!(
        "Rendered artifacts for {}: heatmap={}, extremes={}, gallery={}",
        tag,
        paths.heatmap.is_some(),
        paths.extremes.is_some(),
        paths.gallery.is_some()
    );

    paths
}

/// Color for a fake-probability: green for REAL shading to red for FAKE
fn heat_color(p: f64) -> Rgb<u8> {
    let p = p.clamp(0.0, 1.0);
    Rgb([(255.0 * p) as u8, (255.0 * (1.0 - p)) as u8, 40])
}

/// Render a one-row strip with one colored cell per sampled frame
pub fn render_heat_strip(probs: &[f64], out_path: &Path) -> Result<()> {
    anyhow::ensure!(!probs.is_empty(), "No per-frame probabilities to render");

    let width = probs.len() as u32 * HEAT_CELL_WIDTH;
    let mut strip = RgbImage::new(width, HEAT_STRIP_HEIGHT);

    for (i, &p) in probs.iter().enumerate() {
        let color = heat_color(p);
        let x0 = i as u32 * HEAT_CELL_WIDTH;
        for x in x0..x0 + HEAT_CELL_WIDTH {
            for y in 0..HEAT_STRIP_HEIGHT {
                strip.put_pixel(x, y, color);
            }
        }
    }

    strip
        .save(out_path)
        .with_context(|| format!("Failed to save heat strip to {}", out_path.display()))?;
    Ok(())
}

/// List sampled-frame JPEGs in a directory, in frame order
fn sorted_frame_paths(frame_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(frame_dir)
        .with_context(|| format!("Failed to read frame dir {}", frame_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("jpg"))
        .collect();

    // Frame files are named frame_0000.jpg .. frame_NNNN.jpg
    paths.sort();
    Ok(paths)
}

/// Render the most-REAL and most-FAKE frames side by side
pub fn render_extremes(frame_dir: &Path, probs: &[f64], out_path: &Path) -> Result<()> {
    let frames = sorted_frame_paths(frame_dir)?;
    anyhow::ensure!(!frames.is_empty(), "No sampled frames on disk");

    let count = frames.len().min(probs.len());
    anyhow::ensure!(count > 0, "No per-frame probabilities to rank");

    let mut most_real = 0;
    let mut most_fake = 0;
    for i in 1..count {
        if probs[i] < probs[most_real] {
            most_real = i;
        }
        if probs[i] > probs[most_fake] {
            most_fake = i;
        }
    }

    let real_img = image::open(&frames[most_real])
        .with_context(|| format!("Failed to load frame {}", frames[most_real].display()))?
        .to_rgb8();
    let fake_img = image::open(&frames[most_fake])
        .with_context(|| format!("Failed to load frame {}", frames[most_fake].display()))?
        .to_rgb8();

    let width = real_img.width() + fake_img.width();
    let height = real_img.height().max(fake_img.height());
    let mut canvas = RgbImage::new(width, height);
    imageops::replace(&mut canvas, &real_img, 0, 0);
    imageops::replace(&mut canvas, &fake_img, i64::from(real_img.width()), 0);

    canvas
        .save(out_path)
        .with_context(|| format!("Failed to save extremes to {}", out_path.display()))?;
    Ok(())
}

/// Render every Nth sampled frame into a single horizontal gallery
pub fn render_gallery(frame_dir: &Path, stride: usize, out_path: &Path) -> Result<()> {
    let frames = sorted_frame_paths(frame_dir)?;
    anyhow::ensure!(!frames.is_empty(), "No sampled frames on disk");

    let stride = stride.max(1);
    let mut tiles = Vec::with_capacity(frames.len() / stride + 1);
    for path in frames.iter().step_by(stride) {
        let img = image::open(path)
            .with_context(|| format!("Failed to load frame {}", path.display()))?
            .to_rgb8();

        // Scale to a common tile height, preserving aspect ratio
        let scale = f64::from(GALLERY_TILE_HEIGHT) / f64::from(img.height());
        let tile_width = ((f64::from(img.width()) * scale) as u32).max(1);
        tiles.push(imageops::resize(
            &img,
            tile_width,
            GALLERY_TILE_HEIGHT,
            imageops::FilterType::Triangle,
        ));
    }

    let width: u32 = tiles.iter().map(RgbImage::width).sum();
    let mut canvas = RgbImage::new(width, GALLERY_TILE_HEIGHT);
    let mut x = 0i64;
    for tile in &tiles {
        imageops::replace(&mut canvas, tile, x, 0);
        x += i64::from(tile.width());
    }

    canvas
        .save(out_path)
        .with_context(|| format!("Failed to save gallery to {}", out_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_frames(dir: &Path, count: usize) {
        for i in 0..count {
            let img = RgbImage::from_pixel(40, 30, Rgb([i as u8 * 20, 80, 120]));
            img.save(dir.join(format!("frame_{i:04}.jpg"))).unwrap();
        }
    }

    #[test]
    fn test_heat_color_endpoints() {
        assert_eq!(heat_color(0.0), Rgb([0, 255, 40]));
        assert_eq!(heat_color(1.0), Rgb([255, 0, 40]));
        // Out-of-range inputs are clamped
        assert_eq!(heat_color(2.0), Rgb([255, 0, 40]));
    }

    #[test]
    fn test_render_heat_strip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("strip.png");

        render_heat_strip(&[0.1, 0.5, 0.9], &out).unwrap();

        let strip = image::open(&out).unwrap().to_rgb8();
        assert_eq!(strip.width(), 3 * HEAT_CELL_WIDTH);
        assert_eq!(strip.height(), HEAT_STRIP_HEIGHT);
    }

    #[test]
    fn test_render_heat_strip_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(render_heat_strip(&[], &dir.path().join("strip.png")).is_err());
    }

    #[test]
    fn test_render_extremes() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 4);
        let out = dir.path().join("extremes.jpg");

        render_extremes(dir.path(), &[0.2, 0.9, 0.1, 0.5], &out).unwrap();

        let img = image::open(&out).unwrap().to_rgb8();
        assert_eq!(img.width(), 80);
        assert_eq!(img.height(), 30);
    }

    #[test]
    fn test_render_gallery_stride() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 10);
        let out = dir.path().join("gallery.jpg");

        render_gallery(dir.path(), 5, &out).unwrap();

        // Frames 0 and 5, each scaled to tile height
        let img = image::open(&out).unwrap().to_rgb8();
        assert_eq!(img.height(), GALLERY_TILE_HEIGHT);
        assert_eq!(img.width(), 2 * 240);
    }

    #[test]
    fn test_render_artifacts_is_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("artifacts");
        let frame_dir = dir.path().join("missing_frames");

        // Frame dir does not exist: frame-based artifacts fail, heat strip
        // still renders
        let paths = render_artifacts(&frame_dir, &[0.3, 0.7], &out_dir, 5);
        assert!(paths.heatmap.is_some());
        assert!(paths.extremes.is_none());
        assert!(paths.gallery.is_none());
    }
}
