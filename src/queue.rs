//! Durable job queue with retry and retention policies.
//!
//! [`JobQueue`] is the single authority over job lifecycle transitions. Jobs
//! enter PENDING with their retry policy attached as data; the worker claims
//! them (PENDING → ACTIVE, at-least-once), and reports outcomes back here so
//! backoff scheduling and terminal transitions are applied uniformly rather
//! than branched on in pipeline code.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{RetentionConfig, RetryConfig};
use crate::db::{Database, JobRow, NewJob};
use crate::error::Result;
use crate::retry;
use crate::types::{JobId, JobResult, QueueStats};

/// What the queue decided after a failed attempt
#[derive(Debug)]
pub enum RetryDisposition {
    /// The job was rescheduled; the next attempt runs after `delay`
    Retry {
        /// Backoff delay before the next attempt
        delay: Duration,
    },
    /// All attempts are exhausted; the job is terminally FAILED
    Exhausted,
    /// The job record no longer exists (cancelled while the attempt ran)
    Gone,
}

/// Durable, at-least-once work queue keyed by job id
#[derive(Clone)]
pub struct JobQueue {
    db: Arc<Database>,
    retry: RetryConfig,
    retention: RetentionConfig,
}

impl JobQueue {
    /// Create a queue over an existing database handle
    pub fn new(db: Arc<Database>, retry: RetryConfig, retention: RetentionConfig) -> Self {
        Self {
            db,
            retry,
            retention,
        }
    }

    /// Persist a new PENDING job, runnable immediately
    pub async fn enqueue(&self, job: NewJob) -> Result<()> {
        self.db.insert_job(&job).await?;
        tracing::debug!(job_id = %job.id, total_files = job.total_files, "Job enqueued");
        Ok(())
    }

    /// Fetch a job by id
    pub async fn get(&self, id: &JobId) -> Result<Option<JobRow>> {
        self.db.get_job(&id.0).await
    }

    /// Remove a job record (explicit cancellation); returns whether a row existed
    pub async fn remove(&self, id: &JobId) -> Result<bool> {
        self.db.delete_job(&id.0).await
    }

    /// Claim the oldest due PENDING job, flipping it to ACTIVE
    pub async fn claim_due(&self) -> Result<Option<JobRow>> {
        let now = chrono::Utc::now().timestamp();
        self.db.claim_due_job(now).await
    }

    /// Return a claimed job to PENDING without burning an attempt.
    ///
    /// For claims abandoned before dispatch (shutdown won the race); returns
    /// whether the row was still ACTIVE.
    pub async fn release(&self, id: &JobId) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let released = self.db.release_claimed_job(&id.0, now).await?;
        if released {
            tracing::debug!(job_id = %id, "Claimed job released back to pending");
        }
        Ok(released)
    }

    /// Persist monotonic progress for an ACTIVE job
    pub async fn record_progress(
        &self,
        id: &JobId,
        processed: u32,
        total: u32,
        percent: u8,
        current_file: &str,
    ) -> Result<()> {
        self.db
            .update_job_progress(&id.0, processed, total, percent, current_file)
            .await
    }

    /// Record a successful completion with its terminal result
    pub async fn complete(&self, id: &JobId, result: &JobResult) -> Result<()> {
        let result_json = serde_json::to_string(result)?;
        self.db.set_job_completed(&id.0, &result_json).await
    }

    /// Record a failed attempt, applying the job's stored retry policy.
    ///
    /// Reschedules with exponential backoff while attempts remain, otherwise
    /// transitions the job to terminal FAILED.
    pub async fn fail_attempt(&self, id: &JobId, error: &str) -> Result<RetryDisposition> {
        let row = match self.db.get_job(&id.0).await? {
            Some(row) => row,
            None => return Ok(RetryDisposition::Gone),
        };

        if row.attempts >= row.max_attempts {
            self.db.set_job_failed(&id.0, error).await?;
            tracing::warn!(
                job_id = %id,
                attempts = row.attempts,
                error = %error,
                "Job failed terminally after exhausting retries"
            );
            return Ok(RetryDisposition::Exhausted);
        }

        // Per-job policy columns drive the curve; the queue-wide config only
        // supplies the delay cap and jitter setting.
        let policy = RetryConfig {
            max_attempts: row.max_attempts as u32,
            initial_delay: Duration::from_millis(row.backoff_initial_ms as u64),
            backoff_multiplier: row.backoff_multiplier,
            max_delay: self.retry.max_delay,
            jitter: self.retry.jitter,
        };
        let delay = retry::delay_for_attempt(&policy, row.attempts as u32);
        let next_run_at = chrono::Utc::now().timestamp() + delay.as_secs() as i64;

        self.db.reschedule_job(&id.0, next_run_at, error).await?;
        tracing::warn!(
            job_id = %id,
            attempt = row.attempts,
            max_attempts = row.max_attempts,
            delay_ms = delay.as_millis(),
            error = %error,
            "Job attempt failed, retry scheduled"
        );

        Ok(RetryDisposition::Retry { delay })
    }

    /// Snapshot of job counts per status
    pub async fn stats(&self) -> Result<QueueStats> {
        self.db.job_stats().await
    }

    /// Requeue ACTIVE jobs that have been running longer than `stall_threshold`.
    ///
    /// Called once at worker startup: an ACTIVE row with no live task means a
    /// previous process died mid-attempt, and at-least-once semantics say we
    /// run it again.
    pub async fn requeue_stalled(&self, stall_threshold: Duration) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let cutoff = now - stall_threshold.as_secs() as i64;
        let requeued = self.db.requeue_stalled_jobs(cutoff, now).await?;
        if requeued > 0 {
            tracing::info!(requeued, "Requeued stalled jobs from previous session");
        }
        Ok(requeued)
    }

    /// Apply the retention policy: evict terminal jobs past their count/age
    /// caps and expired cache rows.
    pub async fn prune(&self) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let completed_cutoff = now - self.retention.completed_max_age.as_secs() as i64;
        let by_age = self.db.prune_completed_by_age(completed_cutoff).await?;
        let by_count = self
            .db
            .prune_completed_by_count(self.retention.completed_max_entries)
            .await?;

        let failed_cutoff = now - self.retention.failed_max_age.as_secs() as i64;
        let failed = self.db.prune_failed_by_age(failed_cutoff).await?;

        let cache = self.db.prune_expired_cache(now).await?;

        if by_age + by_count + failed + cache > 0 {
            tracing::debug!(
                completed_by_age = by_age,
                completed_by_count = by_count,
                failed_by_age = failed,
                cache_expired = cache,
                "Retention sweep removed records"
            );
        }

        Ok(())
    }
}
