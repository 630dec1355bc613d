//! Background worker: queue polling, job execution, and retention sweeps.
//!
//! The worker shares an [`ArchiveService`] clone with the submission side.
//! Two limits bound it: a semaphore caps jobs executing concurrently, and a
//! rolling [`StartWindow`] caps sustained job starts per window. A job is
//! claimed only after a concurrency permit is held. If shutdown arrives while
//! a claimed job waits on the start window, the claim is released back to
//! PENDING with its attempt budget intact.
//!
//! ## Submodules
//!
//! - [`StartWindow`] - rolling-window start limiter
//! - `batch` - concurrent per-batch file fetching with timeouts
//! - `job_task` - the fetch/archive/upload/notify pipeline for one attempt

mod batch;
mod job_task;
mod rate_window;

pub use rate_window::StartWindow;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::service::ArchiveService;
use crate::types::JobId;

/// Worker state shared with the submission service.
///
/// Holds the cancellation tokens of in-flight jobs (so `cancel_job` can reach
/// a running attempt), the intake flag consulted on submission, and both
/// throughput limits.
#[derive(Clone)]
pub struct WorkerState {
    active: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
    accepting: Arc<AtomicBool>,
    concurrency: Arc<Semaphore>,
    start_window: StartWindow,
}

impl WorkerState {
    /// Build worker state from the configured limits
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            accepting: Arc::new(AtomicBool::new(true)),
            concurrency: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            start_window: StartWindow::new(config.max_starts_per_window, config.start_window),
        }
    }

    /// Whether submissions are currently accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting new submissions (shutdown begins here)
    pub fn stop_intake(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Cancel the in-flight attempt for `job_id`, if one is running.
    ///
    /// Returns whether a live task was signalled. The task notices at its
    /// next batch boundary; in-flight per-file fetches run out to their own
    /// timeouts.
    pub async fn cancel_active(&self, job_id: &JobId) -> bool {
        let active = self.active.lock().await;
        match active.get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of jobs currently executing
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    async fn register(&self, job_id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.active.lock().await.insert(job_id, token.clone());
        token
    }

    async fn deregister(&self, job_id: &JobId) {
        self.active.lock().await.remove(job_id);
    }

    async fn cancel_all(&self) {
        for token in self.active.lock().await.values() {
            token.cancel();
        }
    }
}

/// Background worker driving the job queue.
///
/// Owns the poll and prune loops; constructed over a service clone and
/// started once at process boot.
pub struct Worker {
    service: ArchiveService,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Worker {
    /// Create a worker over a service handle (not yet running)
    pub fn new(service: ArchiveService) -> Self {
        Self {
            service,
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Start the worker loops.
    ///
    /// First requeues ACTIVE jobs stranded by a previous process (crash
    /// recovery, at-least-once semantics), then spawns the queue poll loop
    /// and the retention sweep loop.
    pub async fn start(&mut self) -> Result<()> {
        let stalled = self
            .service
            .queue
            .requeue_stalled(self.service.config.worker.stall_threshold)
            .await?;
        tracing::info!(
            max_concurrent = self.service.config.worker.max_concurrent_jobs,
            requeued_stalled = stalled,
            "Worker starting"
        );

        self.handles.push(tokio::spawn(poll_loop(
            self.service.clone(),
            self.shutdown.clone(),
        )));
        self.handles.push(tokio::spawn(prune_loop(
            self.service.clone(),
            self.shutdown.clone(),
        )));

        Ok(())
    }

    /// Gracefully stop the worker.
    ///
    /// Stops intake, lets in-flight jobs drain for up to the configured
    /// shutdown timeout, then cancels whatever is still running. PENDING jobs
    /// stay in the database and resume on the next start.
    pub async fn stop(&mut self) {
        tracing::info!("Worker shutting down");
        self.service.worker_state.stop_intake();
        self.shutdown.cancel();

        let deadline = tokio::time::Instant::now() + self.service.config.worker.shutdown_timeout;
        loop {
            let active = self.service.worker_state.active_count().await;
            if active == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(active, "Shutdown timeout reached, cancelling in-flight jobs");
                self.service.worker_state.cancel_all().await;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        tracing::info!("Worker stopped");
    }
}

/// Claim-and-dispatch loop.
///
/// Order matters: a concurrency permit is acquired before claiming so a
/// claimed job starts immediately, and the start-window slot is taken after
/// the claim so idle polling never consumes throughput budget.
async fn poll_loop(service: ArchiveService, shutdown: CancellationToken) {
    let poll_interval = service.config.worker.poll_interval;

    loop {
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = service.worker_state.concurrency.clone().acquire_owned() => {
                match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                }
            }
        };

        let claimed = match service.queue.claim_due().await {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!(error = %e, "Queue poll failed");
                drop(permit);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
                continue;
            }
        };

        let row = match claimed {
            Some(row) => row,
            None => {
                drop(permit);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
                continue;
            }
        };

        let job_id = JobId(row.id.clone());

        // The window can hold a claimed job for most of a minute; shutdown
        // must not wait behind it. Releasing the claim rolls back the attempt
        // so the job resumes with full retry budget on the next start.
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Err(e) = service.queue.release(&job_id).await {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to release claimed job on shutdown");
                }
                break;
            }
            _ = service.worker_state.start_window.acquire() => {}
        }

        let token = service.worker_state.register(job_id.clone()).await;
        tracing::info!(job_id = %job_id, attempt = row.attempts, "Job attempt starting");

        let task_service = service.clone();
        tokio::spawn(async move {
            let _permit = permit;
            job_task::run(task_service, row, token).await;
        });
    }
}

/// Periodic retention sweep over terminal jobs and expired cache rows
async fn prune_loop(service: ArchiveService, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(service.config.worker.prune_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = service.queue.prune().await {
                    tracing::error!(error = %e, "Retention sweep failed");
                }
            }
        }
    }
}
