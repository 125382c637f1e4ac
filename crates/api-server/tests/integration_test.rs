//! Integration tests for the API server
//!
//! These tests start the server with stubbed pipeline collaborators, send
//! real HTTP requests, and verify the responses end to end: submit through
//! to job completion, result retrieval, and history.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use deepfake_api_server::{start_server, ApiState};
use deepfake_common::EMBEDDING_DIM;
use deepfake_engine::{DeepfakeEngine, EngineConfig, FeatureExtractor};
use deepfake_queue::{JobHandler, LocalJobQueue};
use deepfake_storage::{MemoryObjectStorage, MemoryRecordStore};

/// Extractor stub standing in for media decode and the backbone
struct StubExtractor;

impl FeatureExtractor for StubExtractor {
    fn extract(
        &self,
        _video_path: &Path,
        _save_frames: bool,
    ) -> deepfake_common::Result<(Vec<Vec<f32>>, Option<PathBuf>)> {
        Ok((vec![vec![0.2; EMBEDDING_DIM]; 3], None))
    }
}

/// Worker stub: real shape validation and verdict policy, fixed probability
fn stub_handler() -> Arc<dyn JobHandler> {
    Arc::new(
        |payload: &serde_json::Value| -> anyhow::Result<deepfake_common::Verdict> {
            let job: deepfake_queue::ClassificationJob =
                serde_json::from_value(payload.clone())?;
            deepfake_classifier::validate_features(&job.features)?;
            Ok(deepfake_classifier::verdict_from_probability(0.9731))
        },
    )
}

/// Start a server with stubbed collaborators on the given port
async fn spawn_server(port: u16) -> String {
    let records = Arc::new(MemoryRecordStore::new());
    let engine = DeepfakeEngine::with_extractor(
        EngineConfig::default(),
        Arc::new(StubExtractor),
        Arc::new(MemoryObjectStorage::new()),
        records.clone(),
        Arc::new(LocalJobQueue::new(stub_handler(), 2)),
    );

    let state = ApiState {
        engine: Arc::new(engine),
        records,
    };

    let addr = format!("127.0.0.1:{port}");
    tokio::spawn(async move {
        start_server(&addr, state)
            .await
            .expect("Failed to start server");
    });

    // Give server time to start
    sleep(Duration::from_millis(100)).await;

    format!("http://127.0.0.1:{port}")
}

/// Write a dummy upload file with the given name into a temp dir
fn write_upload(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("Failed to create upload");
    file.write_all(&[0u8; 2048]).expect("Failed to write upload");
    path
}

#[tokio::test]
async fn test_health_endpoint() {
    let base = spawn_server(18091).await;

    let response = reqwest::get(format!("{base}/health"))
        .await
        .expect("Health request failed");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Invalid health body");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_analyze_and_poll_to_success() {
    let base = spawn_server(18092).await;
    let dir = tempfile::tempdir().unwrap();
    let upload = write_upload(&dir, "clip.mp4");

    let client = reqwest::Client::new();

    // Submit
    let response = client
        .post(format!("{base}/api/v1/analyze"))
        .json(&serde_json::json!({
            "user_id": 7,
            "source": { "type": "upload", "location": upload.display().to_string() }
        }))
        .send()
        .await
        .expect("Analyze request failed");
    assert_eq!(response.status(), 202);

    let body: serde_json::Value = response.json().await.expect("Invalid analyze body");
    assert_eq!(body["status"], "pending");
    let task_id = body["task_id"].as_str().expect("Missing task_id").to_string();

    // Poll until terminal
    let mut status = serde_json::Value::Null;
    for _ in 0..100 {
        let response = client
            .get(format!("{base}/api/v1/analysis/{task_id}"))
            .send()
            .await
            .expect("Poll request failed");
        assert_eq!(response.status(), 200);

        status = response.json().await.expect("Invalid poll body");
        if status["status"] == "success" || status["status"] == "failed" {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(status["status"], "success");
    assert_eq!(status["result"]["prediction"], "FAKE");
    assert_eq!(status["result"]["confidence"], 97.31);

    // History reflects the finalized analysis
    let response = client
        .get(format!("{base}/api/v1/users/7/history"))
        .send()
        .await
        .expect("History request failed");
    assert_eq!(response.status(), 200);

    let history: serde_json::Value = response.json().await.expect("Invalid history body");
    assert_eq!(history[0]["file_name"], "clip.mp4");
    assert_eq!(history[0]["prediction"], "FAKE");
}

#[tokio::test]
async fn test_analyze_rejects_invalid_extension() {
    let base = spawn_server(18093).await;
    let dir = tempfile::tempdir().unwrap();
    let upload = write_upload(&dir, "clip.avi");

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/v1/analyze"))
        .json(&serde_json::json!({
            "user_id": 7,
            "source": { "type": "upload", "location": upload.display().to_string() }
        }))
        .send()
        .await
        .expect("Analyze request failed");

    assert_eq!(response.status(), 400);
    let body = response.text().await.expect("Missing error body");
    assert!(body.contains("invalid"));
}

#[tokio::test]
async fn test_poll_unknown_job_reports_error_status() {
    let base = spawn_server(18094).await;

    let response = reqwest::get(format!("{base}/api/v1/analysis/no-such-job"))
        .await
        .expect("Poll request failed");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Invalid poll body");
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().contains("no-such-job"));
}
