//! HTTP request handlers for API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{error, info};

use crate::{
    types::{AnalyzeRequest, AnalyzeResponse, HealthResponse, MediaSource, StatusResponse},
    ApiState,
};
use deepfake_common::AnalysisError;
use deepfake_engine::VideoSource;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Submit a video for analysis
///
/// Resolves and validates the source, runs the synchronous half of the
/// pipeline, and returns as soon as the classification job is queued.
pub async fn analyze(
    State(state): State<ApiState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    info!("Analysis request from user {}", request.user_id);

    let source = match request.source {
        MediaSource::Url { location } => VideoSource::Url(location),
        MediaSource::Upload { location } => {
            let path = std::path::PathBuf::from(&location);
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("upload.mp4")
                .to_string();
            let data = tokio::fs::read(&path).await.map_err(|e| {
                error!("Failed to read upload {}: {}", location, e);
                (
                    StatusCode::BAD_REQUEST,
                    format!("Failed to read upload: {e}"),
                )
            })?;
            VideoSource::Upload { data, file_name }
        }
    };

    let submission = state
        .engine
        .analyze_video(request.user_id, source)
        .await
        .map_err(|e| {
            error!("Analysis dispatch failed: {}", e);
            (error_status(&e), e.to_string())
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            status: "pending".to_string(),
            task_id: submission.job_id,
        }),
    ))
}

/// Poll the status of a submitted analysis
pub async fn get_analysis(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let status = state.engine.get_result(&task_id).await.map_err(|e| {
        error!("Status poll for {} failed: {}", task_id, e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(StatusResponse::from_status(task_id, status)))
}

/// Per-user analysis history (joined with video records)
pub async fn get_user_history(
    State(state): State<ApiState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let history = state.records.history_for_user(user_id).await.map_err(|e| {
        error!("History query for user {} failed: {}", user_id, e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(history))
}

/// Map a pipeline error to the HTTP status the caller should see
fn error_status(error: &AnalysisError) -> StatusCode {
    match error {
        AnalysisError::InvalidFormat(_)
        | AnalysisError::FileTooLarge { .. }
        | AnalysisError::BrokenDownload { .. }
        | AnalysisError::DownloadFailed(_)
        | AnalysisError::NoFramesExtracted
        | AnalysisError::NoVideoStream => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
