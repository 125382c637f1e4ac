//! Integration tests for storage backends
//!
//! These tests require live instances of `MinIO` and `PostgreSQL`.
//! Start services with: `docker-compose up -d`
//!
//! Run with: `cargo test --package deepfake-storage --test storage_integration_test -- --ignored --nocapture`
//!
//! All tests are marked with #[ignore] to prevent running in CI without live
//! services.

use deepfake_storage::*;

/// Check if `MinIO` is available
async fn is_minio_available() -> bool {
    tokio::net::TcpStream::connect("127.0.0.1:9000")
        .await
        .is_ok()
}

/// Check if `PostgreSQL` is available
async fn is_postgres_available() -> bool {
    tokio::net::TcpStream::connect("127.0.0.1:5432")
        .await
        .is_ok()
}

fn minio_config() -> S3Config {
    S3Config {
        bucket: "deepfake-analysis".to_string(),
        region: "us-east-1".to_string(),
        endpoint: Some("http://localhost:9000".to_string()),
        access_key_id: "minioadmin".to_string(),
        secret_access_key: "minioadmin".to_string(),
        prefix: "test/".to_string(),
    }
}

// ============================================================================
// MinIO Object Storage Integration Tests
// ============================================================================

#[tokio::test]
#[ignore] // Requires MinIO running on localhost:9000
async fn test_minio_upload_and_retrieve() {
    if !is_minio_available().await {
        eprintln!("MinIO not available on 127.0.0.1:9000");
        eprintln!("Start with: docker-compose up -d minio");
        eprintln!("Skipping test_minio_upload_and_retrieve");
        return;
    }

    let storage = S3ObjectStorage::new(minio_config())
        .await
        .expect("Failed to create S3 storage client");

    let test_key = "7/sample.mp4";
    let test_data = b"not really a video, but bytes are bytes";

    let url = storage
        .upload(test_key, test_data)
        .await
        .expect("Failed to upload file");
    assert!(url.contains("deepfake-analysis"));
    assert!(url.ends_with("test/7/sample.mp4"));

    let retrieved = storage
        .retrieve(test_key)
        .await
        .expect("Failed to retrieve file");
    assert_eq!(retrieved, test_data);

    assert!(storage.exists(test_key).await.expect("exists check failed"));

    storage.delete(test_key).await.expect("Failed to delete");
    assert!(!storage.exists(test_key).await.expect("exists check failed"));
}

// ============================================================================
// PostgreSQL Record Store Integration Tests
// ============================================================================

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_postgres_record_lifecycle() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Start with: docker-compose up -d postgres");
        eprintln!("Skipping test_postgres_record_lifecycle");
        return;
    }

    let store = PostgresRecordStore::new(PostgresConfig::default())
        .await
        .expect("Failed to connect to PostgreSQL");

    store.init_schema().await.expect("Failed to init schema");

    let job_id = format!("it-job-{}", std::process::id());

    let video_id = store
        .create_video(&NewVideo {
            user_id: 1,
            file_url: "http://localhost:9000/deepfake-analysis/1/clip.mp4".to_string(),
            file_name: "clip.mp4".to_string(),
        })
        .await
        .expect("Failed to create video record");

    store
        .create_analysis(&NewAnalysis {
            video_id,
            job_id: job_id.clone(),
        })
        .await
        .expect("Failed to create analysis record");

    let record = store
        .get_analysis_by_job(&job_id)
        .await
        .expect("Lookup failed")
        .expect("Record missing");
    assert!(record.is_pending());
    assert_eq!(record.confidence, 0.0);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_postgres_finalize_is_idempotent() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Skipping test_postgres_finalize_is_idempotent");
        return;
    }

    let store = PostgresRecordStore::new(PostgresConfig::default())
        .await
        .expect("Failed to connect to PostgreSQL");
    store.init_schema().await.expect("Failed to init schema");

    let job_id = format!("it-finalize-{}", std::process::id());

    let video_id = store
        .create_video(&NewVideo {
            user_id: 2,
            file_url: "http://localhost:9000/deepfake-analysis/2/clip.mp4".to_string(),
            file_name: "clip.mp4".to_string(),
        })
        .await
        .expect("Failed to create video record");
    store
        .create_analysis(&NewAnalysis {
            video_id,
            job_id: job_id.clone(),
        })
        .await
        .expect("Failed to create analysis record");

    // First finalize transitions the record
    let updated = store
        .finalize_analysis(&job_id, "FAKE", 93.7)
        .await
        .expect("Finalize failed");
    assert!(updated);

    // Second finalize must be a no-op, even with different values
    let updated = store
        .finalize_analysis(&job_id, "REAL", 51.0)
        .await
        .expect("Finalize failed");
    assert!(!updated);

    let record = store
        .get_analysis_by_job(&job_id)
        .await
        .expect("Lookup failed")
        .expect("Record missing");
    assert_eq!(record.prediction, "FAKE");
    assert_eq!(record.confidence, 93.7);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_postgres_history_for_user() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Skipping test_postgres_history_for_user");
        return;
    }

    let store = PostgresRecordStore::new(PostgresConfig::default())
        .await
        .expect("Failed to connect to PostgreSQL");
    store.init_schema().await.expect("Failed to init schema");

    // Unique user id per run keeps the assertion stable across reruns
    let user_id = i64::from(std::process::id());
    let job_id = format!("it-history-{user_id}");

    let video_id = store
        .create_video(&NewVideo {
            user_id,
            file_url: format!("http://localhost:9000/deepfake-analysis/{user_id}/clip.mp4"),
            file_name: "clip.mp4".to_string(),
        })
        .await
        .expect("Failed to create video record");
    store
        .create_analysis(&NewAnalysis {
            video_id,
            job_id: job_id.clone(),
        })
        .await
        .expect("Failed to create analysis record");
    store
        .finalize_analysis(&job_id, "REAL", 88.1)
        .await
        .expect("Finalize failed");

    let history = store
        .history_for_user(user_id)
        .await
        .expect("History query failed");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].file_name, "clip.mp4");
    assert_eq!(history[0].prediction, "REAL");
    assert_eq!(history[0].confidence, 88.1);
}
