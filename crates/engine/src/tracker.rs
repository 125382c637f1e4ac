//! Result tracker
//!
//! Maps queue state to the domain-level analysis status and performs the
//! one-time write-back of the finalized verdict into the pending analysis
//! record. Each call is one non-blocking state check plus, at most, one
//! conditional write; it never waits for completion.

use deepfake_common::{AnalysisError, AnalysisStatus, Result};
use deepfake_queue::{JobQueue, JobState};
use deepfake_storage::RecordStore;
use tracing::debug;

/// Poll a job and, on its first observed success, finalize the record
///
/// The write-back is a compare-and-set against the pending predicate inside
/// the record store; losing that race to an earlier poller is the expected
/// idempotent outcome and still reports success to the caller.
pub async fn poll(
    queue: &dyn JobQueue,
    records: &dyn RecordStore,
    job_id: &str,
) -> Result<AnalysisStatus> {
    match queue.state(job_id).await {
        JobState::Pending => Ok(AnalysisStatus::Pending),
        JobState::Started => Ok(AnalysisStatus::Processing),
        JobState::Failure(reason) => Ok(AnalysisStatus::Failed { reason }),
        JobState::Unknown => Ok(AnalysisStatus::Error {
            info: format!("Unknown job: {job_id}"),
        }),
        JobState::Success => {
            let verdict = queue.result(job_id).await.ok_or_else(|| {
                AnalysisError::QueueError(format!("Missing result payload for job {job_id}"))
            })?;

            let updated = records
                .finalize_analysis(job_id, verdict.prediction.as_str(), verdict.confidence)
                .await
                .map_err(|e| AnalysisError::StorageError(e.to_string()))?;

            if updated {
                debug!("Finalized analysis record for job {}", job_id);
            }

            Ok(AnalysisStatus::Success { result: verdict })
        }
    }
}
