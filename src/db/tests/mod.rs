//! Unit tests for the database layer, run against in-memory SQLite.

use crate::db::{Database, NewJob};
use crate::types::{CacheEntry, JobStatus};
use chrono::{Duration as ChronoDuration, Utc};

fn sample_job(id: &str) -> NewJob {
    NewJob {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        project_id: "project-1".to_string(),
        asset_ids: vec!["a1".to_string(), "a2".to_string(), "a3".to_string()],
        zip_filename: "assets.zip".to_string(),
        content_hash: Some("feedface".to_string()),
        total_files: 3,
        max_attempts: 3,
        backoff_initial_ms: 5000,
        backoff_multiplier: 2.0,
    }
}

fn sample_cache_entry(hash: &str) -> CacheEntry {
    let now = Utc::now();
    CacheEntry {
        content_hash: hash.to_string(),
        storage_key: "downloads/assets.zip".to_string(),
        download_url: "https://storage.example/signed/assets.zip".to_string(),
        file_count: 3,
        zip_size: 1024,
        created_at: now,
        expires_at: now + ChronoDuration::hours(24),
    }
}

#[tokio::test]
async fn insert_and_get_job() {
    let db = Database::in_memory().await.unwrap();
    db.insert_job(&sample_job("job-1")).await.unwrap();

    let row = db.get_job("job-1").await.unwrap().unwrap();
    assert_eq!(row.id, "job-1");
    assert_eq!(row.status, JobStatus::Pending.to_i32());
    assert_eq!(row.total_files, 3);
    assert_eq!(row.processed_files, 0);
    assert_eq!(row.attempts, 0);
    assert_eq!(row.asset_id_list().unwrap(), vec!["a1", "a2", "a3"]);
}

#[tokio::test]
async fn on_disk_database_creates_parents_and_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("jobs.db");

    let db = Database::new(&path).await.unwrap();
    db.insert_job(&sample_job("job-1")).await.unwrap();
    assert!(path.exists());
    drop(db);

    // Reopening re-runs migrations idempotently and keeps the data
    let db = Database::new(&path).await.unwrap();
    assert!(db.get_job("job-1").await.unwrap().is_some());
}

#[tokio::test]
async fn get_missing_job_returns_none() {
    let db = Database::in_memory().await.unwrap();
    assert!(db.get_job("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn claim_flips_pending_to_active_and_counts_attempt() {
    let db = Database::in_memory().await.unwrap();
    db.insert_job(&sample_job("job-1")).await.unwrap();

    let now = Utc::now().timestamp();
    let claimed = db.claim_due_job(now).await.unwrap().unwrap();
    assert_eq!(claimed.id, "job-1");
    assert_eq!(claimed.status, JobStatus::Active.to_i32());
    assert_eq!(claimed.attempts, 1);

    // No second claim while the job is active
    assert!(db.claim_due_job(now).await.unwrap().is_none());
}

#[tokio::test]
async fn claim_respects_next_run_at() {
    let db = Database::in_memory().await.unwrap();
    db.insert_job(&sample_job("job-1")).await.unwrap();

    let now = Utc::now().timestamp();
    db.reschedule_job("job-1", now + 3600, "transient failure")
        .await
        .unwrap();

    assert!(db.claim_due_job(now).await.unwrap().is_none());
    assert!(db.claim_due_job(now + 3601).await.unwrap().is_some());
}

#[tokio::test]
async fn claim_prefers_oldest_job() {
    let db = Database::in_memory().await.unwrap();
    db.insert_job(&sample_job("job-old")).await.unwrap();
    // created_at has second granularity; force ordering explicitly
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    db.insert_job(&sample_job("job-new")).await.unwrap();

    let now = Utc::now().timestamp() + 10;
    let first = db.claim_due_job(now).await.unwrap().unwrap();
    assert_eq!(first.id, "job-old");
}

#[tokio::test]
async fn progress_and_completion_updates_persist() {
    let db = Database::in_memory().await.unwrap();
    db.insert_job(&sample_job("job-1")).await.unwrap();

    db.update_job_progress("job-1", 2, 3, 67, "photo.png")
        .await
        .unwrap();
    let row = db.get_job("job-1").await.unwrap().unwrap();
    assert_eq!(row.processed_files, 2);
    assert_eq!(row.progress, 67);
    assert_eq!(row.current_file.as_deref(), Some("photo.png"));

    db.set_job_completed("job-1", r#"{"download_url":"u"}"#)
        .await
        .unwrap();
    let row = db.get_job("job-1").await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Completed.to_i32());
    assert!(row.completed_at.is_some());
    assert!(row.result_json.is_some());
    assert!(row.error_message.is_none());
}

#[tokio::test]
async fn failed_job_records_error() {
    let db = Database::in_memory().await.unwrap();
    db.insert_job(&sample_job("job-1")).await.unwrap();

    db.set_job_failed("job-1", "upload failed").await.unwrap();
    let row = db.get_job("job-1").await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Failed.to_i32());
    assert_eq!(row.error_message.as_deref(), Some("upload failed"));
}

#[tokio::test]
async fn delete_job_reports_whether_row_existed() {
    let db = Database::in_memory().await.unwrap();
    db.insert_job(&sample_job("job-1")).await.unwrap();

    assert!(db.delete_job("job-1").await.unwrap());
    assert!(!db.delete_job("job-1").await.unwrap());
}

#[tokio::test]
async fn stats_count_jobs_per_status() {
    let db = Database::in_memory().await.unwrap();
    db.insert_job(&sample_job("job-1")).await.unwrap();
    db.insert_job(&sample_job("job-2")).await.unwrap();
    db.set_job_failed("job-2", "boom").await.unwrap();

    let stats = db.job_stats().await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.completed, 0);
}

#[tokio::test]
async fn retention_pruning_by_count_keeps_newest() {
    let db = Database::in_memory().await.unwrap();
    for i in 0..5 {
        let id = format!("job-{}", i);
        db.insert_job(&sample_job(&id)).await.unwrap();
        db.set_job_completed(&id, "{}").await.unwrap();
    }

    let removed = db.prune_completed_by_count(3).await.unwrap();
    assert_eq!(removed, 2);

    let stats = db.job_stats().await.unwrap();
    assert_eq!(stats.completed, 3);
}

#[tokio::test]
async fn retention_pruning_by_age_removes_old_terminal_jobs() {
    let db = Database::in_memory().await.unwrap();
    db.insert_job(&sample_job("job-done")).await.unwrap();
    db.set_job_completed("job-done", "{}").await.unwrap();
    db.insert_job(&sample_job("job-broke")).await.unwrap();
    db.set_job_failed("job-broke", "boom").await.unwrap();

    let future = Utc::now().timestamp() + 1;
    assert_eq!(db.prune_completed_by_age(future).await.unwrap(), 1);
    assert_eq!(db.prune_failed_by_age(future).await.unwrap(), 1);

    let stats = db.job_stats().await.unwrap();
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn stalled_active_jobs_are_requeued() {
    let db = Database::in_memory().await.unwrap();
    db.insert_job(&sample_job("job-1")).await.unwrap();

    let now = Utc::now().timestamp();
    db.claim_due_job(now).await.unwrap().unwrap();

    // A cutoff in the future makes the just-claimed job look stalled
    let requeued = db.requeue_stalled_jobs(now + 1, now).await.unwrap();
    assert_eq!(requeued, 1);

    let row = db.get_job("job-1").await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Pending.to_i32());
}

#[tokio::test]
async fn claim_release_restores_pending_and_attempt_budget() {
    let db = Database::in_memory().await.unwrap();
    db.insert_job(&sample_job("job-1")).await.unwrap();

    let now = Utc::now().timestamp();
    let claimed = db.claim_due_job(now).await.unwrap().unwrap();
    assert_eq!(claimed.attempts, 1);

    assert!(db.release_claimed_job("job-1", now).await.unwrap());
    let row = db.get_job("job-1").await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Pending.to_i32());
    assert_eq!(row.attempts, 0);
    assert!(row.started_at.is_none());

    // The released job is immediately claimable again
    assert!(db.claim_due_job(now).await.unwrap().is_some());
    // Releasing a job that is no longer ACTIVE is a no-op
    db.set_job_failed("job-1", "boom").await.unwrap();
    assert!(!db.release_claimed_job("job-1", now).await.unwrap());
}

#[tokio::test]
async fn cache_entry_roundtrip() {
    let db = Database::in_memory().await.unwrap();
    let entry = sample_cache_entry("hash-1");
    let eviction = Utc::now().timestamp() + 3600;
    db.put_cache_entry(&entry, eviction).await.unwrap();

    let row = db.get_cache_entry("hash-1").await.unwrap().unwrap();
    assert_eq!(row.storage_key, entry.storage_key);
    assert_eq!(row.download_url, entry.download_url);
    assert_eq!(row.file_count, 3);
    assert_eq!(row.zip_size, 1024);
    // Eviction deadline and URL expiry are persisted independently
    assert_eq!(row.expires_at, eviction);
    assert_eq!(row.url_expires_at, entry.expires_at.timestamp());
}

#[tokio::test]
async fn cache_put_replaces_existing_entry() {
    let db = Database::in_memory().await.unwrap();
    let eviction = Utc::now().timestamp() + 3600;
    db.put_cache_entry(&sample_cache_entry("hash-1"), eviction)
        .await
        .unwrap();

    let mut updated = sample_cache_entry("hash-1");
    updated.download_url = "https://storage.example/signed/v2.zip".to_string();
    db.put_cache_entry(&updated, eviction + 3600).await.unwrap();

    let row = db.get_cache_entry("hash-1").await.unwrap().unwrap();
    assert_eq!(row.download_url, updated.download_url);
    assert_eq!(row.expires_at, eviction + 3600);
}

#[tokio::test]
async fn expired_cache_entries_are_pruned() {
    let db = Database::in_memory().await.unwrap();
    let now = Utc::now().timestamp();
    db.put_cache_entry(&sample_cache_entry("fresh"), now + 3600)
        .await
        .unwrap();
    db.put_cache_entry(&sample_cache_entry("stale"), now - 10)
        .await
        .unwrap();

    let removed = db.prune_expired_cache(now).await.unwrap();
    assert_eq!(removed, 1);
    assert!(db.get_cache_entry("stale").await.unwrap().is_none());
    assert!(db.get_cache_entry("fresh").await.unwrap().is_some());
}
