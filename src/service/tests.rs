//! End-to-end pipeline tests over in-memory collaborators.

use std::io::{Cursor, Read};

use crate::error::Error;
use crate::types::{events, JobStatus};
use crate::worker::Worker;

use super::test_helpers::{asset, harness, harness_with_access, harness_with_config, test_config};

#[tokio::test]
async fn submitted_job_runs_to_completion_with_progress() {
    let h = harness(vec![
        asset("a1", "one.txt"),
        asset("a2", "two.txt"),
        asset("a3", "three.txt"),
    ])
    .await;
    let mut worker = Worker::new(h.service.clone());
    worker.start().await.unwrap();

    let ids: Vec<String> = ["a1", "a2", "a3"].iter().map(|s| s.to_string()).collect();
    let descriptor = h
        .service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap();
    assert_eq!(descriptor.status, JobStatus::Pending);
    assert_eq!(descriptor.total_files, 3);
    assert!(descriptor.download_url.is_none());

    let complete = h.notifier.wait_for(events::COMPLETE, 1).await;
    assert_eq!(complete[0].user_id, "user-1");
    assert_eq!(complete[0].payload["file_count"], 3);

    let progress = h.notifier.named(events::PROGRESS);
    let percents: Vec<u64> = progress
        .iter()
        .map(|e| e.payload["percent"].as_u64().unwrap())
        .collect();
    assert_eq!(percents, vec![33, 67, 100]);

    let status = h
        .service
        .job_status(&descriptor.job_id, "user-1")
        .await
        .unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.processed_files, 3);
    assert_eq!(status.progress, 100);
    assert!(status.download_url.as_deref().unwrap().contains("assets.zip"));

    worker.stop().await;
}

#[tokio::test]
async fn resubmission_of_same_assets_hits_the_cache() {
    let h = harness(vec![asset("a1", "one.txt"), asset("a2", "two.txt")]).await;
    let mut worker = Worker::new(h.service.clone());
    worker.start().await.unwrap();

    let ids: Vec<String> = ["a1", "a2"].iter().map(|s| s.to_string()).collect();
    h.service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap();
    h.notifier.wait_for(events::COMPLETE, 1).await;

    // Same set, different order and different user
    let reordered: Vec<String> = ["a2", "a1"].iter().map(|s| s.to_string()).collect();
    let descriptor = h
        .service
        .create_job(&reordered, "project-1", "user-2", None)
        .await
        .unwrap();
    assert_eq!(descriptor.status, JobStatus::Completed);
    assert!(descriptor.job_id.is_cached());
    assert!(descriptor.download_url.is_some());
    assert_eq!(descriptor.total_files, 2);

    // No second job was enqueued
    let stats = h.service.stats().await.unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.completed, 1);

    worker.stop().await;
}

#[tokio::test]
async fn unknown_asset_ids_are_filtered_not_fatal() {
    let h = harness(vec![asset("a1", "one.txt")]).await;

    let ids: Vec<String> = ["a1", "bogus"].iter().map(|s| s.to_string()).collect();
    let descriptor = h
        .service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap();
    assert_eq!(descriptor.total_files, 1);
}

#[tokio::test]
async fn wholly_unresolvable_request_is_not_found() {
    let h = harness(vec![]).await;
    let ids = vec!["ghost".to_string()];
    let err = h
        .service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn empty_and_oversized_requests_fail_validation() {
    let h = harness(vec![asset("a1", "one.txt")]).await;

    let err = h
        .service
        .create_job(&[], "project-1", "user-1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let too_many: Vec<String> = (0..1001).map(|i| format!("a{}", i)).collect();
    let err = h
        .service
        .create_job(&too_many, "project-1", "user-1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn unauthorized_user_is_denied() {
    let h = harness_with_access(vec![asset("a1", "one.txt")], false).await;
    let ids = vec!["a1".to_string()];
    let err = h
        .service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied(_)));
}

#[tokio::test]
async fn duplicate_display_names_get_unique_entries() {
    let h = harness(vec![
        asset("a1", "photo.png"),
        asset("a2", "photo.png"),
    ])
    .await;
    let mut worker = Worker::new(h.service.clone());
    worker.start().await.unwrap();

    let ids: Vec<String> = ["a1", "a2"].iter().map(|s| s.to_string()).collect();
    h.service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap();
    h.notifier.wait_for(events::COMPLETE, 1).await;

    let zip_bytes = h.store.stored("downloads/assets.zip").unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes)).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert!(names.contains(&"photo.png".to_string()));
    assert!(names.contains(&"photo_1.png".to_string()));

    // Each entry carries its own asset's bytes
    let mut contents = String::new();
    archive
        .by_name("photo.png")
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "content of a1");

    worker.stop().await;
}

#[tokio::test]
async fn slow_fetch_times_out_and_the_rest_complete() {
    let h = harness(vec![
        asset("a1", "one.txt"),
        asset("a2", "two.txt"),
        asset("a3", "three.txt"),
    ])
    .await;
    // a2's transfer never yields; the per-file timeout excludes it
    h.store.hang("assets/a2");

    let mut worker = Worker::new(h.service.clone());
    worker.start().await.unwrap();

    let ids: Vec<String> = ["a1", "a2", "a3"].iter().map(|s| s.to_string()).collect();
    let descriptor = h
        .service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap();

    let complete = h.notifier.wait_for(events::COMPLETE, 1).await;
    assert_eq!(complete[0].payload["file_count"], 2);

    let status = h
        .service
        .job_status(&descriptor.job_id, "user-1")
        .await
        .unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.processed_files, 2);

    worker.stop().await;
}

#[tokio::test]
async fn unfetchable_assets_exhaust_retries_into_failure() {
    let h = harness(vec![asset("a1", "one.txt")]).await;
    // The only asset's transfer never yields, so every attempt has zero files
    h.store.hang("assets/a1");

    let mut worker = Worker::new(h.service.clone());
    worker.start().await.unwrap();

    let ids = vec!["a1".to_string()];
    let descriptor = h
        .service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap();

    // One failure event per attempt, three attempts total
    let failed = h.notifier.wait_for(events::FAILED, 3).await;
    assert!(failed[0].payload["error"]
        .as_str()
        .unwrap()
        .contains("all file fetches failed"));

    // The terminal transition lands just after the last failure event
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    let status = loop {
        let status = h
            .service
            .job_status(&descriptor.job_id, "user-1")
            .await
            .unwrap();
        if status.status == JobStatus::Failed {
            break status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job never reached FAILED, stuck at {}",
            status.status
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    };
    assert!(status.error.is_some());

    worker.stop().await;
}

#[tokio::test]
async fn pending_job_can_be_cancelled() {
    // No worker running, so the job stays PENDING
    let h = harness(vec![asset("a1", "one.txt")]).await;
    let ids = vec!["a1".to_string()];
    let descriptor = h
        .service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap();

    let response = h
        .service
        .cancel_job(&descriptor.job_id, "user-1")
        .await
        .unwrap();
    assert!(response.success);

    let err = h
        .service
        .job_status(&descriptor.job_id, "user-1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn active_job_can_be_cancelled_mid_attempt() {
    // Slow the per-file timeout down so the attempt is still running when
    // the cancel arrives
    let mut config = test_config();
    config.worker.fetch_timeout = std::time::Duration::from_secs(1);
    let h = harness_with_config(vec![asset("a1", "one.txt"), asset("a2", "two.txt")], config).await;
    // a2's transfer never yields, pinning the attempt in its fetch phase
    h.store.hang("assets/a2");

    let mut worker = Worker::new(h.service.clone());
    worker.start().await.unwrap();

    let ids: Vec<String> = ["a1", "a2"].iter().map(|s| s.to_string()).collect();
    let descriptor = h
        .service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap();

    // Wait until the worker has actually claimed and started the job
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while h.service.worker_state.active_count().await == 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "job never went active"
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let response = h
        .service
        .cancel_job(&descriptor.job_id, "user-1")
        .await
        .unwrap();
    assert!(response.success);

    let err = h
        .service
        .job_status(&descriptor.job_id, "user-1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // Let the in-flight fetch run out to its timeout; the cancelled task
    // must finish quietly with neither a completion nor a failure event
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert!(h.notifier.named(events::COMPLETE).is_empty());
    assert!(h.notifier.named(events::FAILED).is_empty());

    worker.stop().await;
}

#[tokio::test]
async fn shutdown_is_not_delayed_by_a_saturated_start_window() {
    // One start per 3s window: the second claimed job has to wait on the
    // window, which is exactly where shutdown must be able to interrupt
    let mut config = test_config();
    config.worker.max_starts_per_window = 1;
    config.worker.start_window = std::time::Duration::from_secs(3);
    config.worker.shutdown_timeout = std::time::Duration::from_millis(200);
    let h = harness_with_config(vec![asset("a1", "one.txt"), asset("a2", "two.txt")], config).await;

    let mut worker = Worker::new(h.service.clone());
    worker.start().await.unwrap();

    let first = h
        .service
        .create_job(&["a1".to_string()], "project-1", "user-1", None)
        .await
        .unwrap();
    let second = h
        .service
        .create_job(&["a2".to_string()], "project-1", "user-1", None)
        .await
        .unwrap();

    h.notifier.wait_for(events::COMPLETE, 1).await;
    // Give the poll loop time to claim the second job and park on the window
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let before = tokio::time::Instant::now();
    worker.stop().await;
    let elapsed = before.elapsed();
    assert!(
        elapsed < std::time::Duration::from_secs(2),
        "stop took {:?}, blocked behind the start window",
        elapsed
    );

    // The first job finished; the abandoned claim went back to PENDING with
    // its attempt budget intact, never executing post-shutdown
    assert_eq!(h.notifier.named(events::COMPLETE).len(), 1);
    let row = h.service.queue.get(&second.job_id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Pending.to_i32());
    assert_eq!(row.attempts, 0);

    let status = h.service.job_status(&first.job_id, "user-1").await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
}

#[tokio::test]
async fn cancelling_an_absent_job_is_a_soft_success() {
    let h = harness(vec![]).await;
    let response = h
        .service
        .cancel_job(&crate::types::JobId::from("1700000000-deadbeef"), "user-1")
        .await
        .unwrap();
    assert!(response.success);
    assert!(response.message.contains("not found"));
}

#[tokio::test]
async fn completed_job_cannot_be_cancelled() {
    let h = harness(vec![asset("a1", "one.txt")]).await;
    let mut worker = Worker::new(h.service.clone());
    worker.start().await.unwrap();

    let ids = vec!["a1".to_string()];
    let descriptor = h
        .service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap();
    h.notifier.wait_for(events::COMPLETE, 1).await;

    let response = h
        .service
        .cancel_job(&descriptor.job_id, "user-1")
        .await
        .unwrap();
    assert!(!response.success);
    assert!(response.message.contains("completed"));

    worker.stop().await;
}

#[tokio::test]
async fn foreign_user_cannot_inspect_or_cancel() {
    let h = harness(vec![asset("a1", "one.txt")]).await;
    let ids = vec!["a1".to_string()];
    let descriptor = h
        .service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap();

    let err = h
        .service
        .job_status(&descriptor.job_id, "intruder")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied(_)));

    let err = h
        .service
        .cancel_job(&descriptor.job_id, "intruder")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied(_)));
}

#[tokio::test]
async fn shutdown_stops_intake() {
    let h = harness(vec![asset("a1", "one.txt")]).await;
    let mut worker = Worker::new(h.service.clone());
    worker.start().await.unwrap();
    worker.stop().await;

    let ids = vec!["a1".to_string()];
    let err = h
        .service
        .create_job(&ids, "project-1", "user-1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));
}

#[tokio::test]
async fn custom_zip_filename_is_used_for_upload() {
    let h = harness(vec![asset("a1", "one.txt")]).await;
    let mut worker = Worker::new(h.service.clone());
    worker.start().await.unwrap();

    let ids = vec!["a1".to_string()];
    h.service
        .create_job(&ids, "project-1", "user-1", Some("export"))
        .await
        .unwrap();
    h.notifier.wait_for(events::COMPLETE, 1).await;

    assert!(h.store.stored("downloads/export.zip").is_some());

    worker.stop().await;
}
