//! Asynchronous classification job queue
//!
//! Defines the queue collaborator contract (submit / state / result) and an
//! in-process worker-pool implementation. Payloads cross the async boundary
//! as serialized JSON, so the queue stays agnostic to backbone versions and
//! worker internals, and a brokered backend can replace `LocalJobQueue`
//! without touching the contract.

use async_trait::async_trait;
use deepfake_common::{AnalysisError, Verdict};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Queue-level lifecycle state of a classification job
///
/// Transitions are monotonic: `Pending -> Started -> {Success | Failure}`.
/// `Success` and `Failure` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Submitted, waiting for a worker
    Pending,
    /// Picked up by a worker and executing
    Started,
    /// Finished; result payload available
    Success,
    /// Finished with the captured error as payload
    Failure(String),
    /// Handle the queue has never seen
    Unknown,
}

/// Unit of work crossing the async boundary
///
/// Carries the embedding matrix as nested numeric lists, never frames.
/// When artifact rendering is requested the payload additionally names a
/// directory of sampled-frame JPEGs the worker may read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationJob {
    /// Identifier of the classifier model to apply
    pub model: String,
    /// Embedding matrix, one row per sampled frame
    pub features: Vec<Vec<f32>>,
    /// Directory of sampled-frame JPEGs for artifact rendering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_dir: Option<PathBuf>,
}

/// Handler executed by the worker pool for each job
///
/// Runs on a blocking thread; any returned error transitions the job to
/// `Failure` with the error text as payload.
pub trait JobHandler: Send + Sync {
    fn run(&self, payload: &Value) -> anyhow::Result<Verdict>;
}

impl<F> JobHandler for F
where
    F: Fn(&Value) -> anyhow::Result<Verdict> + Send + Sync,
{
    fn run(&self, payload: &Value) -> anyhow::Result<Verdict> {
        self(payload)
    }
}

/// Job queue collaborator contract
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a job; returns immediately with a queue-assigned handle
    async fn submit(&self, job: ClassificationJob) -> deepfake_common::Result<String>;

    /// Non-blocking state check
    async fn state(&self, handle: &str) -> JobState;

    /// Result payload; present only once the job reached `Success`
    async fn result(&self, handle: &str) -> Option<Verdict>;
}

/// Bookkeeping entry for one submitted job
struct JobEntry {
    state: JobState,
    result: Option<Verdict>,
}

/// In-process job queue backed by a bounded blocking worker pool
///
/// Jobs wait in `Pending` until one of the `workers` permits frees up, run
/// `Started` on a blocking thread, and land in a terminal state. Entries are
/// retained for the process lifetime.
pub struct LocalJobQueue {
    jobs: Arc<RwLock<HashMap<String, JobEntry>>>,
    permits: Arc<Semaphore>,
    handler: Arc<dyn JobHandler>,
}

impl LocalJobQueue {
    /// Create a queue draining into `workers` concurrent blocking workers
    #[must_use]
    pub fn new(handler: Arc<dyn JobHandler>, workers: usize) -> Self {
        info!("Starting local job queue with {} workers", workers);
        Self {
            jobs: Arc::new(RwLock::new(HashMap::with_capacity(32))),
            permits: Arc::new(Semaphore::new(workers)),
            handler,
        }
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn submit(&self, job: ClassificationJob) -> deepfake_common::Result<String> {
        let handle = Uuid::new_v4().to_string();

        // Serialize at the boundary; workers only ever see the wire form
        let payload = serde_json::to_value(&job)
            .map_err(|e| AnalysisError::QueueError(format!("Failed to serialize job: {e}")))?;

        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(
                handle.clone(),
                JobEntry {
                    state: JobState::Pending,
                    result: None,
                },
            );
        }

        debug!(
            "Submitted job {} ({} feature rows)",
            handle,
            job.features.len()
        );

        let jobs = self.jobs.clone();
        let permits = self.permits.clone();
        let handler = self.handler.clone();
        let job_id = handle.clone();

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let mut jobs = jobs.write().await;
                    if let Some(entry) = jobs.get_mut(&job_id) {
                        entry.state = JobState::Failure("Worker pool shut down".to_string());
                    }
                    return;
                }
            };

            {
                let mut jobs = jobs.write().await;
                if let Some(entry) = jobs.get_mut(&job_id) {
                    entry.state = JobState::Started;
                }
            }

            let worker_handler = handler.clone();
            let outcome =
                tokio::task::spawn_blocking(move || worker_handler.run(&payload)).await;

            let mut jobs = jobs.write().await;
            let Some(entry) = jobs.get_mut(&job_id) else {
                return;
            };
            match outcome {
                Ok(Ok(verdict)) => {
                    debug!("Job {} completed successfully", job_id);
                    entry.result = Some(verdict);
                    entry.state = JobState::Success;
                }
                Ok(Err(e)) => {
                    error!("Job {} failed: {}", job_id, e);
                    entry.state = JobState::Failure(e.to_string());
                }
                Err(e) => {
                    error!("Job {} worker panicked: {}", job_id, e);
                    entry.state = JobState::Failure(format!("Worker panicked: {e}"));
                }
            }
        });

        Ok(handle)
    }

    async fn state(&self, handle: &str) -> JobState {
        let jobs = self.jobs.read().await;
        jobs.get(handle)
            .map_or(JobState::Unknown, |entry| entry.state.clone())
    }

    async fn result(&self, handle: &str) -> Option<Verdict> {
        let jobs = self.jobs.read().await;
        jobs.get(handle).and_then(|entry| entry.result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepfake_common::Prediction;

    fn stub_verdict() -> Verdict {
        Verdict {
            prediction: Prediction::Fake,
            confidence: 87.5,
            probability: 0.875,
            comment: "manipulated".to_string(),
            heatmap_path: None,
            extremes_path: None,
            gallery_path: None,
        }
    }

    fn job() -> ClassificationJob {
        ClassificationJob {
            model: "mlp".to_string(),
            features: vec![vec![0.0; 4]],
            frame_dir: None,
        }
    }

    async fn wait_terminal(queue: &LocalJobQueue, handle: &str) -> JobState {
        for _ in 0..200 {
            let state = queue.state(handle).await;
            if matches!(state, JobState::Success | JobState::Failure(_)) {
                return state;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        queue.state(handle).await
    }

    #[test]
    fn test_payload_round_trip() {
        let job = ClassificationJob {
            model: "mlp".to_string(),
            features: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            frame_dir: None,
        };

        let value = serde_json::to_value(&job).unwrap();
        // Nested numeric lists, no frame data
        assert!(value["features"].is_array());
        assert_eq!(value["features"][1][0], 3.0);
        assert!(value.get("frame_dir").is_none());

        let parsed: ClassificationJob = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.features.len(), 2);
    }

    #[tokio::test]
    async fn test_job_reaches_success() {
        let handler: Arc<dyn JobHandler> = Arc::new(|_: &Value| -> anyhow::Result<Verdict> { Ok(stub_verdict()) });
        let queue = LocalJobQueue::new(handler, 2);

        let handle = queue.submit(job()).await.unwrap();
        let state = wait_terminal(&queue, &handle).await;

        assert_eq!(state, JobState::Success);
        let verdict = queue.result(&handle).await.unwrap();
        assert_eq!(verdict.prediction, Prediction::Fake);
        assert_eq!(verdict.confidence, 87.5);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_failure() {
        let handler: Arc<dyn JobHandler> =
            Arc::new(|_: &Value| -> anyhow::Result<Verdict> { anyhow::bail!("Invalid feature shape") });
        let queue = LocalJobQueue::new(handler, 1);

        let handle = queue.submit(job()).await.unwrap();
        let state = wait_terminal(&queue, &handle).await;

        match state {
            JobState::Failure(reason) => assert!(reason.contains("Invalid feature shape")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(queue.result(&handle).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let handler: Arc<dyn JobHandler> = Arc::new(|_: &Value| -> anyhow::Result<Verdict> { Ok(stub_verdict()) });
        let queue = LocalJobQueue::new(handler, 1);

        assert_eq!(queue.state("no-such-job").await, JobState::Unknown);
        assert!(queue.result("no-such-job").await.is_none());
    }

    #[tokio::test]
    async fn test_job_pending_without_workers() {
        // Zero permits: the job can never be picked up and must stay pending
        let handler: Arc<dyn JobHandler> = Arc::new(|_: &Value| -> anyhow::Result<Verdict> { Ok(stub_verdict()) });
        let queue = LocalJobQueue::new(handler, 0);

        let handle = queue.submit(job()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(queue.state(&handle).await, JobState::Pending);
        assert!(queue.result(&handle).await.is_none());
    }
}
