//! # bulk-archive
//!
//! Backend library for asynchronous bulk-download archive jobs.
//!
//! Callers submit a set of asset ids; the library enqueues a durable job,
//! fetches the files from object storage in concurrent batches, assembles a
//! ZIP archive, uploads it, and pushes progress/completion events to the
//! requesting user. Identical requests are deduplicated through a
//! content-hash cache so a repeated file-set reuses the archive already
//! produced.
//!
//! ## Design Philosophy
//!
//! bulk-archive is designed to be:
//! - **Library-first** - No HTTP surface, purely a Rust crate for embedding
//! - **Durable** - Jobs survive restarts; interrupted work is requeued
//! - **Bounded** - Concurrency and start-rate limits protect downstream storage
//! - **Event-driven** - Consumers receive push events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use bulk_archive::{ArchiveService, Collaborators, Config, Worker};
//! # fn collaborators() -> Collaborators { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ArchiveService::new(Config::default(), collaborators()).await?;
//!
//!     let mut worker = Worker::new(service.clone());
//!     worker.start().await?;
//!
//!     let asset_ids = vec!["asset-1".to_string(), "asset-2".to_string()];
//!     let descriptor = service
//!         .create_job(&asset_ids, "project-1", "user-1", None)
//!         .await?;
//!     println!("queued: {}", descriptor.job_id);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// In-memory ZIP assembly and entry naming
pub mod archive;
/// Content-hash dedup cache
pub mod cache;
/// Collaborator traits (access control, catalog, object storage, notifier)
pub mod collaborators;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Content hashing and job-id derivation
pub mod hash;
/// Durable job queue with retry and retention
pub mod queue;
/// Exponential backoff calculation
pub mod retry;
/// Core archive service (submission, status, cancellation)
pub mod service;
/// Core types, responses, and event payloads
pub mod types;
/// Background worker loops
pub mod worker;

// Re-export commonly used types
pub use cache::CacheStore;
pub use collaborators::{AccessControl, AssetCatalog, ByteStream, Notifier, ObjectStore};
pub use config::{
    ArchiveConfig, CacheConfig, Config, PersistenceConfig, RetentionConfig, RetryConfig,
    WorkerConfig,
};
pub use db::Database;
pub use error::{DatabaseError, Error, JobError, Result};
pub use queue::{JobQueue, RetryDisposition};
pub use service::{ArchiveService, Collaborators};
pub use types::{
    CacheEntry, CancelResponse, CompleteEvent, FailedEvent, JobDescriptor, JobId, JobResult,
    JobStatus, JobStatusResponse, ProgressEvent, QueueStats, ResolvedAsset,
};
pub use worker::Worker;

/// Helper function to run the worker with graceful signal handling.
///
/// Waits for a termination signal and then calls the worker's `stop()`
/// method, which stops intake, drains in-flight jobs, and cancels stragglers.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use bulk_archive::{ArchiveService, Config, Worker, run_with_shutdown};
/// # use bulk_archive::Collaborators;
/// # fn collaborators() -> Collaborators { unimplemented!() }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = ArchiveService::new(Config::default(), collaborators()).await?;
///     let mut worker = Worker::new(service.clone());
///     worker.start().await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(worker).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(mut worker: Worker) {
    wait_for_signal().await;
    worker.stop().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("SIGTERM received, shutting down");
                }
                _ = sigint.recv() => {
                    tracing::info!("SIGINT received, shutting down");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, listening for SIGINT only");
            sigint.recv().await;
            tracing::info!("SIGINT received, shutting down");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "SIGINT handler unavailable, listening for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("SIGTERM received, shutting down");
        }
        (Err(_), Err(e)) => {
            tracing::error!(error = %e, "No unix signal handlers available, falling back to ctrl_c");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Ctrl+C received, shutting down");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    }
}
