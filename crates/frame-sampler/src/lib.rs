//! Frame sampling module using `FFmpeg`
//!
//! Decodes a video container and extracts an evenly spaced subset of frames,
//! approximately one frame per second of source video, converted to RGB.

use deepfake_common::{AnalysisError, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::Path;
use tracing::{debug, info};

/// Frame sampler configuration
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Maximum number of frames to collect per video
    pub max_frames: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { max_frames: 60 }
    }
}

/// Initialize `FFmpeg` library
fn init_ffmpeg() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        ffmpeg::init().expect("Failed to initialize FFmpeg");
    });
}

/// Sampling interval in frames for a declared frame rate
///
/// One frame is kept per rounded second of source video; a missing or
/// bogus frame rate falls back to keeping every frame.
#[must_use]
pub fn sampling_interval(fps: f64) -> u64 {
    if fps > 0.0 {
        (fps.round() as u64).max(1)
    } else {
        1
    }
}

/// Whether the frame at `frame_number` falls on the sampling grid
#[must_use]
pub fn should_sample(frame_number: u64, interval: u64) -> bool {
    frame_number % interval == 0
}

/// Extract an evenly spaced subset of RGB frames from a video file
///
/// Reads the stream's declared frame rate, keeps every `interval`-th frame
/// until `max_frames` frames are collected or the stream is exhausted.
///
/// # Errors
///
/// Returns an error if:
/// - The input file cannot be opened
/// - No video stream is found
/// - The decoder or scaler cannot be created
/// - No frames could be decoded at all
#[allow(clippy::cast_precision_loss)]
pub fn sample_frames(input_path: &Path, config: &SamplerConfig) -> Result<Vec<RgbImage>> {
    init_ffmpeg();

    debug!("Sampling frames from: {:?}", input_path);

    // Open input file
    let mut ictx = ffmpeg::format::input(&input_path)
        .map_err(|e| AnalysisError::FFmpegError(format!("Failed to open input file: {e}")))?;

    // Find video stream
    let video_stream = ictx
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or(AnalysisError::NoVideoStream)?;

    let stream_index = video_stream.index();

    // Read declared frame rate and derive the sampling interval
    let rate = video_stream.avg_frame_rate();
    let fps = if rate.1 > 0 {
        f64::from(rate.0) / f64::from(rate.1)
    } else {
        0.0
    };
    let interval = sampling_interval(fps);

    // Get codec parameters and create decoder
    let codec_params = video_stream.parameters();
    let mut decoder = ffmpeg::codec::context::Context::from_parameters(codec_params)
        .map_err(|e| AnalysisError::FFmpegError(format!("Failed to create context: {e}")))?
        .decoder()
        .video()
        .map_err(|e| AnalysisError::FFmpegError(format!("Failed to create decoder: {e}")))?;

    let width = decoder.width();
    let height = decoder.height();
    let src_format = decoder.format();

    // Setup software scaler for RGB conversion
    let mut scaler = ffmpeg::software::scaling::Context::get(
        src_format,
        width,
        height,
        ffmpeg::format::Pixel::RGB24,
        width,
        height,
        ffmpeg::software::scaling::Flags::BILINEAR,
    )
    .map_err(|e| AnalysisError::FFmpegError(format!("Failed to create scaler: {e}")))?;

    let mut frames = Vec::with_capacity(config.max_frames);
    let mut frame_number = 0u64;
    let mut decoded_frame = ffmpeg::util::frame::video::Video::empty();
    let mut converted_frame = ffmpeg::util::frame::video::Video::empty();

    // Process packets
    'packets: for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }

        if decoder.send_packet(&packet).is_ok() {
            while decoder.receive_frame(&mut decoded_frame).is_ok() {
                if should_sample(frame_number, interval) {
                    scaler.run(&decoded_frame, &mut converted_frame).map_err(|e| {
                        AnalysisError::FFmpegError(format!("Failed to convert frame: {e}"))
                    })?;

                    frames.push(rgb_image_from_frame(&converted_frame)?);

                    if frames.len() >= config.max_frames {
                        break 'packets;
                    }
                }

                frame_number += 1;
            }
        }
    }

    // Flush decoder
    if frames.len() < config.max_frames {
        decoder.send_eof().ok();
        while decoder.receive_frame(&mut decoded_frame).is_ok() {
            if should_sample(frame_number, interval) {
                scaler.run(&decoded_frame, &mut converted_frame).map_err(|e| {
                    AnalysisError::FFmpegError(format!("Failed to convert frame: {e}"))
                })?;

                frames.push(rgb_image_from_frame(&converted_frame)?);

                if frames.len() >= config.max_frames {
                    break;
                }
            }

            frame_number += 1;
        }
    }

    if frames.is_empty() {
        return Err(AnalysisError::NoFramesExtracted);
    }

    info!(
        "Sampled {} frames from {:?} (fps={:.2}, interval={} frames)",
        frames.len(),
        input_path,
        fps,
        interval
    );

    Ok(frames)
}

/// Copy an RGB24 frame into a contiguous `RgbImage`, respecting row stride
fn rgb_image_from_frame(frame: &ffmpeg::util::frame::video::Video) -> Result<RgbImage> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let plane_data = frame.data(0);

    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row_start = y * stride;
        let row_end = row_start + (width * 3);
        data.extend_from_slice(&plane_data[row_start..row_end]);
    }

    RgbImage::from_vec(frame.width(), frame.height(), data)
        .ok_or_else(|| AnalysisError::FFmpegError("Invalid RGB24 frame data".to_string()))
}
