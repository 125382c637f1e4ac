//! Source resolution module
//!
//! Turns a user-supplied video reference (uploaded bytes or a URL, including
//! video-hosting-site links) into validated local bytes plus a normalized
//! file name. Hosting-site links are resolved through the external `yt-dlp`
//! downloader; everything else is a direct HTTP GET. Temporary files are
//! cleaned up on every exit path.

use deepfake_common::{AnalysisError, Result};
use std::io::Write;
use std::process::Command;
use tracing::{debug, info};

/// Maximum accepted size for direct HTTP downloads
pub const MAX_FILE_SIZE_MB: u64 = 100;
const MAX_FILE_SIZE_BYTES: u64 = MAX_FILE_SIZE_MB * 1024 * 1024;

/// Minimum plausible size for a hosting-site download
const MIN_HOSTED_DOWNLOAD_BYTES: u64 = 100_000;

/// Accepted video extensions
pub const VALID_EXTENSIONS: [&str; 2] = [".mp4", ".mov"];

/// Video source supplied by a caller
#[derive(Debug, Clone)]
pub enum VideoSource {
    /// Raw bytes from an upload, with the caller-supplied file name
    Upload { data: Vec<u8>, file_name: String },
    /// Remote URL, including video-hosting-site links
    Url(String),
}

/// A resolved, validated video ready for upload and decoding
#[derive(Debug)]
pub struct ResolvedVideo {
    pub data: Vec<u8>,
    pub file_name: String,
}

/// Check a file name against the accepted video extensions
#[must_use]
pub fn has_valid_extension(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    VALID_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Derive a file name from a URL path
///
/// Takes the percent-decoded last path segment with the query string
/// stripped. A segment without any extension gets `.mp4` appended (hosted
/// downloads are resolved to progressive mp4); a segment with an extension
/// is kept as-is and left to extension validation.
#[must_use]
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    let basename = path.split('/').next_back().unwrap_or_default();

    let decoded = urlencoding::decode(basename)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| basename.to_string());

    let decoded = if decoded.is_empty() {
        "video".to_string()
    } else {
        decoded
    };

    if decoded.contains('.') {
        decoded
    } else {
        format!("{decoded}.mp4")
    }
}

/// Whether a URL points at a known video-hosting site
#[must_use]
pub fn is_hosting_url(url: &str) -> bool {
    url.contains("youtube.com") || url.contains("youtu.be")
}

/// Reject payloads over the direct-download size limit
fn ensure_within_limit(size: u64) -> Result<()> {
    if size > MAX_FILE_SIZE_BYTES {
        return Err(AnalysisError::FileTooLarge {
            size,
            max: MAX_FILE_SIZE_BYTES,
        });
    }
    Ok(())
}

/// Resolve a video source into validated bytes plus a normalized file name
///
/// # Errors
///
/// Returns an error on network failures, non-200 responses, oversize or
/// undersized payloads, and disallowed extensions. No partial state is
/// persisted on any failure path.
pub async fn resolve(source: VideoSource) -> Result<ResolvedVideo> {
    match source {
        VideoSource::Upload { data, file_name } => {
            if !has_valid_extension(&file_name) {
                return Err(AnalysisError::InvalidFormat(file_name));
            }
            Ok(ResolvedVideo { data, file_name })
        }
        VideoSource::Url(url) => {
            let file_name = file_name_from_url(&url);
            if !has_valid_extension(&file_name) {
                return Err(AnalysisError::InvalidFormat(file_name));
            }

            let data = if is_hosting_url(&url) {
                let hosted_url = url.clone();
                tokio::task::spawn_blocking(move || download_hosted(&hosted_url))
                    .await
                    .map_err(|e| AnalysisError::Other(format!("Download task failed: {e}")))??
            } else {
                download_direct(&url).await?
            };

            Ok(ResolvedVideo { data, file_name })
        }
    }
}

/// Resolve a hosting-site URL through yt-dlp into a temporary file
///
/// Blocking: shells out and reads the result back from disk. The temp file
/// is removed when the handle drops, on success and failure alike.
fn download_hosted(url: &str) -> Result<Vec<u8>> {
    info!("Downloading hosted video via yt-dlp: {}", url);

    let temp_file = tempfile::Builder::new()
        .suffix(".mp4")
        .tempfile()
        .map_err(AnalysisError::IoError)?;

    let output = Command::new("yt-dlp")
        .args([
            "--format",
            "18/best[ext=mp4]/best",
            "--no-playlist",
            "--quiet",
            "--no-warnings",
            "--force-overwrites",
            "--output",
        ])
        .arg(temp_file.path())
        .arg(url)
        .output()
        .map_err(|e| AnalysisError::DownloadFailed(format!("Failed to execute yt-dlp: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AnalysisError::DownloadFailed(format!(
            "yt-dlp failed: {}",
            stderr.trim()
        )));
    }

    let data = std::fs::read(temp_file.path())?;
    debug!("yt-dlp produced {} bytes", data.len());

    if (data.len() as u64) < MIN_HOSTED_DOWNLOAD_BYTES {
        return Err(AnalysisError::BrokenDownload {
            size: data.len() as u64,
        });
    }

    Ok(data)
}

/// Download a video over plain HTTP, bounded by the size limit
async fn download_direct(url: &str) -> Result<Vec<u8>> {
    debug!("Downloading video from URL: {}", url);

    let response = reqwest::get(url)
        .await
        .map_err(|e| AnalysisError::DownloadFailed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(AnalysisError::DownloadFailed(format!(
            "HTTP {}",
            response.status()
        )));
    }

    // Reject a declared oversize payload before reading the body
    if let Some(length) = response.content_length() {
        ensure_within_limit(length)?;
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AnalysisError::DownloadFailed(e.to_string()))?;

    ensure_within_limit(bytes.len() as u64)?;

    info!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(bytes.to_vec())
}

/// Write resolved bytes to a temp file for decoding, keeping the extension
pub(crate) fn spill_to_temp_file(
    data: &[u8],
    file_name: &str,
) -> Result<tempfile::NamedTempFile> {
    let suffix = file_name
        .rfind('.')
        .map_or(".mp4", |idx| &file_name[idx..]);

    let mut temp_file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .map_err(AnalysisError::IoError)?;
    temp_file.write_all(data).map_err(AnalysisError::IoError)?;
    temp_file.flush().map_err(AnalysisError::IoError)?;

    Ok(temp_file)
}
