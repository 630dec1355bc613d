//! Per-job pipeline execution: fetch, archive, upload, notify.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveWriter, EntryNamer};
use crate::db::JobRow;
use crate::error::{JobError, Result};
use crate::queue::RetryDisposition;
use crate::service::ArchiveService;
use crate::types::{
    events, CacheEntry, CompleteEvent, FailedEvent, JobId, JobResult, ProgressEvent,
};

use super::batch;

/// Run one claimed job attempt to its outcome.
///
/// Owns the full lifecycle of the attempt: on success the result is recorded
/// and the completion event pushed; on failure the queue's retry policy is
/// applied and a failure event pushed; on cancellation the attempt stops
/// quietly at the next batch boundary. Always deregisters the job from the
/// active map before returning.
pub(crate) async fn run(service: ArchiveService, row: JobRow, cancel: CancellationToken) {
    let job_id = JobId(row.id.clone());

    match execute(&service, &row, &cancel).await {
        Ok(Some(result)) => {
            tracing::info!(
                job_id = %job_id,
                file_count = result.file_count,
                zip_size = result.zip_size,
                "Job completed"
            );
        }
        Ok(None) => {
            tracing::debug!(job_id = %job_id, "Job attempt stopped by cancellation");
        }
        Err(e) if cancel.is_cancelled() => {
            // The failure is a side effect of cancellation tearing the
            // pipeline down; do not burn a retry attempt or alarm the user.
            tracing::debug!(job_id = %job_id, error = %e, "Job attempt aborted by cancellation");
        }
        Err(e) => {
            let error = e.to_string();
            service
                .notify(
                    &row.user_id,
                    events::FAILED,
                    serde_json::json!(FailedEvent {
                        job_id: job_id.clone(),
                        error: error.clone(),
                        failed_at: Utc::now(),
                    }),
                )
                .await;

            match service.queue.fail_attempt(&job_id, &error).await {
                Ok(RetryDisposition::Retry { delay }) => {
                    tracing::info!(
                        job_id = %job_id,
                        delay_ms = delay.as_millis() as u64,
                        "Job attempt failed, retry scheduled"
                    );
                }
                Ok(RetryDisposition::Exhausted) => {
                    tracing::error!(job_id = %job_id, error = %error, "Job failed terminally");
                }
                Ok(RetryDisposition::Gone) => {
                    tracing::debug!(job_id = %job_id, "Job removed while attempt ran");
                }
                Err(db_err) => {
                    tracing::error!(
                        job_id = %job_id,
                        error = %db_err,
                        "Failed to record job attempt failure"
                    );
                }
            }
        }
    }

    service.worker_state.deregister(&job_id).await;
}

/// Execute the pipeline for one attempt.
///
/// Returns `Ok(Some(result))` on completion, `Ok(None)` when cancellation
/// stopped the attempt cleanly, and `Err` for a failed attempt.
async fn execute(
    service: &ArchiveService,
    row: &JobRow,
    cancel: &CancellationToken,
) -> Result<Option<JobResult>> {
    let job_id = JobId(row.id.clone());
    let asset_ids = row.asset_id_list()?;

    // Re-resolve at execution time: assets may have been deleted between
    // enqueue and claim.
    let resolved = service
        .collaborators
        .catalog
        .resolve_assets(&asset_ids, &row.project_id)
        .await?;
    if resolved.is_empty() {
        return Err(JobError::NoResolvableAssets {
            id: row.id.clone(),
        }
        .into());
    }

    let total = resolved.len() as u32;
    let batch_size = service.config.worker.batch_size.max(1);
    let fetch_timeout = service.config.worker.fetch_timeout;

    let (writer, completion) = ArchiveWriter::spawn();
    let mut namer = EntryNamer::new();
    let mut processed: u32 = 0;

    for chunk in resolved.chunks(batch_size) {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let fetched = batch::fetch_batch(&service.collaborators.store, chunk, fetch_timeout).await;

        for file in fetched {
            let entry_name = namer.unique_name(&file.asset.display_name);
            writer
                .append(entry_name.clone(), file.data)
                .await
                .map_err(|e| JobError::ArchiveFailed {
                    id: row.id.clone(),
                    reason: e.to_string(),
                })?;
            processed += 1;

            let percent = (f64::from(processed) / f64::from(total) * 100.0).round() as u8;
            service
                .queue
                .record_progress(&job_id, processed, total, percent, &entry_name)
                .await?;
            service
                .notify(
                    &row.user_id,
                    events::PROGRESS,
                    serde_json::json!(ProgressEvent {
                        job_id: job_id.clone(),
                        current: processed,
                        total,
                        percent,
                        current_file: entry_name,
                    }),
                )
                .await;
        }
    }

    if processed == 0 {
        return Err(JobError::AllFetchesFailed {
            id: row.id.clone(),
        }
        .into());
    }

    if cancel.is_cancelled() {
        return Ok(None);
    }

    writer.finish().await.map_err(|e| JobError::ArchiveFailed {
        id: row.id.clone(),
        reason: e.to_string(),
    })?;
    let zip_bytes = completion
        .wait()
        .await
        .map_err(|e| JobError::ArchiveFailed {
            id: row.id.clone(),
            reason: e.to_string(),
        })?;
    let zip_size = zip_bytes.len() as u64;

    let storage_key = service
        .collaborators
        .store
        .upload_buffer(
            zip_bytes,
            &row.zip_filename,
            "application/zip",
            &service.config.archive.namespace,
        )
        .await
        .map_err(|e| JobError::UploadFailed {
            id: row.id.clone(),
            reason: e.to_string(),
        })?;

    let url_ttl = service.config.archive.signed_url_ttl;
    let download_url = service
        .collaborators
        .store
        .signed_url(&storage_key, url_ttl.as_secs())
        .await
        .map_err(|e| JobError::SignedUrlFailed {
            id: row.id.clone(),
            reason: e.to_string(),
        })?;

    let now = Utc::now();
    let result = JobResult {
        download_url: download_url.clone(),
        expires_at: now + chrono::Duration::from_std(url_ttl).unwrap_or_default(),
        completed_at: now,
        file_count: processed,
        zip_size,
    };

    // A cancellation that landed after the last batch boundary removed the
    // queue record; delivering a result for it would resurrect the job.
    if cancel.is_cancelled() {
        return Ok(None);
    }
    if service.queue.get(&job_id).await?.is_none() {
        tracing::debug!(job_id = %job_id, "Job removed before completion could be recorded");
        return Ok(None);
    }

    service.queue.complete(&job_id, &result).await?;

    // Cache before announcing: a resubmission racing the completion event
    // must find the entry already present.
    write_cache_entry(service, row, &storage_key, &result).await;

    service
        .notify(
            &row.user_id,
            events::COMPLETE,
            serde_json::json!(CompleteEvent {
                job_id: job_id.clone(),
                download_url: result.download_url.clone(),
                expires_at: result.expires_at,
                file_count: result.file_count,
                zip_size: result.zip_size,
            }),
        )
        .await;

    Ok(Some(result))
}

/// Write-through to the dedup cache, best-effort.
///
/// A cache write failure costs a future dedup hit, not this job's result, so
/// it is logged and swallowed.
async fn write_cache_entry(
    service: &ArchiveService,
    row: &JobRow,
    storage_key: &str,
    result: &JobResult,
) {
    let content_hash = match &row.content_hash {
        Some(hash) => hash.clone(),
        None => return,
    };

    let entry = CacheEntry {
        content_hash: content_hash.clone(),
        storage_key: storage_key.to_string(),
        download_url: result.download_url.clone(),
        file_count: result.file_count,
        zip_size: result.zip_size,
        created_at: result.completed_at,
        expires_at: result.expires_at,
    };

    if let Err(e) = service.cache.put(entry).await {
        tracing::warn!(
            job_id = %row.id,
            content_hash = %content_hash,
            error = %e,
            "Failed to write archive cache entry"
        );
    }
}
