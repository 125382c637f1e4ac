/// Main API server binary
use std::sync::Arc;
use tracing::{error, info};

use deepfake_api_server::{start_server, ApiState};
use deepfake_classifier::{worker::ClassificationHandler, ClassifierConfig, MlpClassifier};
use deepfake_encoder::EncoderConfig;
use deepfake_engine::{DeepfakeEngine, EngineConfig};
use deepfake_queue::LocalJobQueue;
use deepfake_storage::{PostgresRecordStore, RecordStore, S3ObjectStorage, StorageConfig};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Deepfake Analysis API v{}", env!("CARGO_PKG_VERSION"));

    let storage_config = StorageConfig::default();

    let object_storage = match S3ObjectStorage::new(storage_config.s3).await {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            error!("Failed to initialize object storage: {}", e);
            std::process::exit(1);
        }
    };

    let records: Arc<dyn RecordStore> =
        match PostgresRecordStore::new(storage_config.postgres).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("Failed to connect to PostgreSQL: {}", e);
                std::process::exit(1);
            }
        };

    if let Err(e) = records.init_schema().await {
        error!("Failed to initialize database schema: {}", e);
        std::process::exit(1);
    }

    // Worker pool for the out-of-request classification jobs
    let workers = std::env::var("CLASSIFIER_WORKERS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(2);
    let classifier = MlpClassifier::new(ClassifierConfig::default());
    let queue = Arc::new(LocalJobQueue::new(
        Arc::new(ClassificationHandler::new(classifier)),
        workers,
    ));

    let engine_config = EngineConfig {
        render_artifacts: matches!(
            std::env::var("RENDER_ARTIFACTS").as_deref(),
            Ok("1") | Ok("true")
        ),
        ..EngineConfig::default()
    };

    let engine = Arc::new(DeepfakeEngine::new(
        engine_config,
        EncoderConfig::default(),
        object_storage,
        records.clone(),
        queue,
    ));

    let state = ApiState { engine, records };

    let addr = std::env::var("API_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    if let Err(e) = start_server(&addr, state).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
