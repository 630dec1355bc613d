//! Error types for bulk-archive
//!
//! This module provides error handling for the library, including:
//! - Caller-facing errors (Validation, AccessDenied, NotFound) surfaced
//!   synchronously from submission/status/cancellation
//! - Pipeline errors (Job, Database) delivered asynchronously via the job's
//!   persisted error field and failure events

use thiserror::Error;

/// Result type alias for bulk-archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bulk-archive
///
/// Only `Validation`, `AccessDenied`, and `NotFound` are returned
/// synchronously to callers of the submission service. Everything else stays
/// inside the pipeline: it is recorded on the job and pushed as a failure
/// event, never raised to an unrelated caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request shape (empty or oversized asset list)
    #[error("validation error: {0}")]
    Validation(String),

    /// Authorization failure on project access or job ownership
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Job or resolvable-asset set not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Job pipeline failure (fatal to the current attempt, retried by the queue)
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Job pipeline errors (archive assembly, fetch fan-out, upload)
#[derive(Debug, Error)]
pub enum JobError {
    /// None of the requested assets could be resolved
    #[error("job {id}: no resolvable assets")]
    NoResolvableAssets {
        /// The job whose asset set resolved to nothing
        id: String,
    },

    /// Every file fetch in the job failed or timed out
    #[error("job {id}: all file fetches failed")]
    AllFetchesFailed {
        /// The job whose fetches all failed
        id: String,
    },

    /// Archive assembly failed (append or finalize)
    #[error("job {id}: archive assembly failed: {reason}")]
    ArchiveFailed {
        /// The job whose archive could not be assembled
        id: String,
        /// The reason assembly failed
        reason: String,
    },

    /// Upload of the finished archive failed
    #[error("job {id}: upload failed: {reason}")]
    UploadFailed {
        /// The job whose archive could not be uploaded
        id: String,
        /// The reason the upload failed
        reason: String,
    },

    /// Signed URL generation failed
    #[error("job {id}: signed URL generation failed: {reason}")]
    SignedUrlFailed {
        /// The job whose download link could not be generated
        id: String,
        /// The reason URL generation failed
        reason: String,
    },
}
