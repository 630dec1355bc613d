//! Status queries and cancellation.

use chrono::{TimeZone, Utc};

use crate::db::JobRow;
use crate::error::{Error, Result};
use crate::types::{CancelResponse, JobId, JobResult, JobStatus, JobStatusResponse};

use super::ArchiveService;

impl ArchiveService {
    /// Query the current state of a job.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if no job exists under `job_id` (including jobs
    ///   already pruned or cancelled)
    /// - [`Error::AccessDenied`] if `user_id` does not own the job
    pub async fn job_status(&self, job_id: &JobId, user_id: &str) -> Result<JobStatusResponse> {
        let row = self
            .queue
            .get(job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {} not found", job_id)))?;

        if row.user_id != user_id {
            return Err(Error::AccessDenied(format!(
                "job {} belongs to another user",
                job_id
            )));
        }

        Ok(status_response(row)?)
    }

    /// Cancel a job.
    ///
    /// Cancellation is cooperative and intentionally never a hard failure:
    /// - an absent job is treated as already resolved (`success: true`),
    ///   since completed-and-pruned jobs are indistinguishable from
    ///   never-existed ones;
    /// - a terminal job cannot be cancelled (`success: false` with a message
    ///   naming the status);
    /// - otherwise the queue record is removed, the active task's token (if
    ///   any) is cancelled, and in-flight per-file fetches run out to their
    ///   own timeouts.
    ///
    /// # Errors
    ///
    /// Only [`Error::AccessDenied`] for an ownership mismatch. Unexpected
    /// internal errors are folded into a `{success: false}` response.
    pub async fn cancel_job(&self, job_id: &JobId, user_id: &str) -> Result<CancelResponse> {
        let row = match self.queue.get(job_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                return Ok(CancelResponse {
                    success: true,
                    message: "Job not found; it may have completed and been removed".to_string(),
                });
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Cancellation lookup failed");
                return Ok(CancelResponse {
                    success: false,
                    message: format!("Cancellation failed: {}", e),
                });
            }
        };

        if row.user_id != user_id {
            return Err(Error::AccessDenied(format!(
                "job {} belongs to another user",
                job_id
            )));
        }

        let status = JobStatus::from_i32(row.status);
        if status.is_terminal() {
            return Ok(CancelResponse {
                success: false,
                message: format!("Cannot cancel a {} job", status),
            });
        }

        // Signal the running task first so it stops at the next batch
        // boundary, then drop the record to prevent result delivery.
        self.worker_state.cancel_active(job_id).await;

        match self.queue.remove(job_id).await {
            Ok(_) => {
                tracing::info!(job_id = %job_id, status = %status, "Job cancelled");
                Ok(CancelResponse {
                    success: true,
                    message: "Job cancelled".to_string(),
                })
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Cancellation removal failed");
                Ok(CancelResponse {
                    success: false,
                    message: format!("Cancellation failed: {}", e),
                })
            }
        }
    }
}

/// Map a persisted job row to the caller-facing status response
fn status_response(row: JobRow) -> Result<JobStatusResponse> {
    let status = JobStatus::from_i32(row.status);

    let result: Option<JobResult> = match (&status, &row.result_json) {
        (JobStatus::Completed, Some(json)) => Some(serde_json::from_str(json)?),
        _ => None,
    };

    Ok(JobStatusResponse {
        job_id: JobId(row.id),
        status,
        processed_files: row.processed_files as u32,
        total_files: row.total_files as u32,
        progress: row.progress as u8,
        download_url: result.as_ref().map(|r| r.download_url.clone()),
        expires_at: result.as_ref().map(|r| r.expires_at),
        error: match status {
            JobStatus::Failed => row.error_message,
            _ => None,
        },
        created_at: Utc
            .timestamp_opt(row.created_at, 0)
            .single()
            .unwrap_or_else(Utc::now),
        completed_at: result.as_ref().map(|r| r.completed_at),
    })
}
