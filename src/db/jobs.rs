//! Job queue CRUD, claiming, retry scheduling, and retention pruning.

use crate::error::DatabaseError;
use crate::types::QueueStats;
use crate::{Error, Result};

use super::{Database, JobRow, NewJob};

/// Column list shared by job SELECTs
const JOB_COLUMNS: &str = r#"
    id, user_id, project_id, asset_ids, zip_filename, content_hash,
    status, processed_files, total_files, progress, current_file,
    attempts, max_attempts, backoff_initial_ms, backoff_multiplier,
    next_run_at, result_json, error_message,
    created_at, started_at, completed_at
"#;

impl Database {
    /// Insert a new job in PENDING status, runnable immediately
    pub async fn insert_job(&self, job: &NewJob) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let asset_ids = serde_json::to_string(&job.asset_ids)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, user_id, project_id, asset_ids, zip_filename, content_hash,
                status, processed_files, total_files, progress,
                attempts, max_attempts, backoff_initial_ms, backoff_multiplier,
                next_run_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.user_id)
        .bind(&job.project_id)
        .bind(&asset_ids)
        .bind(&job.zip_filename)
        .bind(&job.content_hash)
        .bind(crate::types::JobStatus::Pending.to_i32())
        .bind(0i64) // processed_files
        .bind(job.total_files as i64)
        .bind(0i64) // progress
        .bind(0i64) // attempts
        .bind(job.max_attempts as i64)
        .bind(job.backoff_initial_ms as i64)
        .bind(job.backoff_multiplier)
        .bind(now) // next_run_at: runnable immediately
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert job: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a job by id
    pub async fn get_job(&self, id: &str) -> Result<Option<JobRow>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get job: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Atomically claim the oldest due PENDING job, flipping it to ACTIVE.
    ///
    /// The conditional UPDATE guards against double-claiming: if another
    /// worker got there first, `rows_affected` is zero and we retry with the
    /// next candidate. Claiming counts as starting an attempt.
    pub async fn claim_due_job(&self, now: i64) -> Result<Option<JobRow>> {
        loop {
            let candidate: Option<String> = sqlx::query_scalar(
                r#"
                SELECT id FROM jobs
                WHERE status = ? AND next_run_at <= ?
                ORDER BY created_at ASC
                LIMIT 1
                "#,
            )
            .bind(crate::types::JobStatus::Pending.to_i32())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to select due job: {}",
                    e
                )))
            })?;

            let id = match candidate {
                Some(id) => id,
                None => return Ok(None),
            };

            let claimed = sqlx::query(
                r#"
                UPDATE jobs
                SET status = ?, started_at = ?, attempts = attempts + 1
                WHERE id = ? AND status = ?
                "#,
            )
            .bind(crate::types::JobStatus::Active.to_i32())
            .bind(now)
            .bind(&id)
            .bind(crate::types::JobStatus::Pending.to_i32())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to claim job: {}",
                    e
                )))
            })?;

            if claimed.rows_affected() == 0 {
                // Lost the race for this candidate; try the next one
                continue;
            }

            return self.get_job(&id).await;
        }
    }

    /// Return a claimed job to PENDING without consuming an attempt.
    ///
    /// Undoes a claim whose task never started (shutdown arrived between the
    /// claim and dispatch). The attempt counter is rolled back so the job
    /// keeps its full retry budget for the next session.
    pub async fn release_claimed_job(&self, id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, next_run_at = ?, started_at = NULL,
                attempts = MAX(attempts - 1, 0)
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(crate::types::JobStatus::Pending.to_i32())
        .bind(now)
        .bind(id)
        .bind(crate::types::JobStatus::Active.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to release claimed job: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Update a job's progress fields
    pub async fn update_job_progress(
        &self,
        id: &str,
        processed: u32,
        total: u32,
        percent: u8,
        current_file: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET processed_files = ?, total_files = ?, progress = ?, current_file = ?
            WHERE id = ?
            "#,
        )
        .bind(processed as i64)
        .bind(total as i64)
        .bind(percent as i64)
        .bind(current_file)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update job progress: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Mark a job COMPLETED with its serialized terminal result
    pub async fn set_job_completed(&self, id: &str, result_json: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, result_json = ?, completed_at = ?, error_message = NULL
            WHERE id = ?
            "#,
        )
        .bind(crate::types::JobStatus::Completed.to_i32())
        .bind(result_json)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark job completed: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Return a failed job to PENDING for a later retry
    pub async fn reschedule_job(&self, id: &str, next_run_at: i64, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, next_run_at = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(crate::types::JobStatus::Pending.to_i32())
        .bind(next_run_at)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to reschedule job: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Mark a job terminally FAILED with its error message
    pub async fn set_job_failed(&self, id: &str, error: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, error_message = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(crate::types::JobStatus::Failed.to_i32())
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark job failed: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Delete a job record, returning whether a row was removed
    pub async fn delete_job(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete job: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Count jobs per status
    pub async fn job_stats(&self) -> Result<QueueStats> {
        let rows: Vec<(i32, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to count jobs: {}",
                        e
                    )))
                })?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            match crate::types::JobStatus::from_i32(status) {
                crate::types::JobStatus::Pending => stats.pending = count as u64,
                crate::types::JobStatus::Active => stats.active = count as u64,
                crate::types::JobStatus::Completed => stats.completed = count as u64,
                crate::types::JobStatus::Failed => stats.failed = count as u64,
                crate::types::JobStatus::Cancelled => {}
            }
        }

        Ok(stats)
    }

    /// Delete completed jobs past the age cutoff; returns rows removed
    pub async fn prune_completed_by_age(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM jobs WHERE status = ? AND completed_at < ?")
            .bind(crate::types::JobStatus::Completed.to_i32())
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to prune completed jobs by age: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }

    /// Delete completed jobs beyond the newest `keep` entries; returns rows removed
    pub async fn prune_completed_by_count(&self, keep: u64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status = ?
              AND id NOT IN (
                  SELECT id FROM jobs
                  WHERE status = ?
                  ORDER BY completed_at DESC
                  LIMIT ?
              )
            "#,
        )
        .bind(crate::types::JobStatus::Completed.to_i32())
        .bind(crate::types::JobStatus::Completed.to_i32())
        .bind(keep as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to prune completed jobs by count: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }

    /// Delete failed jobs past the age cutoff; returns rows removed
    pub async fn prune_failed_by_age(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM jobs WHERE status = ? AND completed_at < ?")
            .bind(crate::types::JobStatus::Failed.to_i32())
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to prune failed jobs by age: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }

    /// Requeue ACTIVE jobs whose attempt started before `cutoff` (crash
    /// recovery on startup); returns rows requeued
    pub async fn requeue_stalled_jobs(&self, cutoff: i64, now: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, next_run_at = ?
            WHERE status = ? AND started_at < ?
            "#,
        )
        .bind(crate::types::JobStatus::Pending.to_i32())
        .bind(now)
        .bind(crate::types::JobStatus::Active.to_i32())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to requeue stalled jobs: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }
}
