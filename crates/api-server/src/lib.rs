//! REST API server for the deepfake analysis pipeline
//!
//! Exposes the two entry points the core requires from any front end:
//! submit a video for analysis and poll a job's status, plus health and
//! per-user history.

mod handlers;
mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use deepfake_engine::InferenceEngine;
use deepfake_storage::RecordStore;

pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// Analysis engine (pipeline + result tracking)
    pub engine: Arc<dyn InferenceEngine>,
    /// Record store, for history queries
    pub records: Arc<dyn RecordStore>,
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Analysis pipeline
        .route("/api/v1/analyze", post(analyze))
        .route("/api/v1/analysis/{task_id}", get(get_analysis))
        // User history
        .route("/api/v1/users/{user_id}/history", get(get_user_history))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await
}
