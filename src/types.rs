//! Core types, responses, and event payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a bulk-archive job.
///
/// Derived at enqueue time from the current time plus a content-hash prefix
/// (see [`crate::hash::derive_job_id`]), or prefixed `cached-` for synthetic
/// descriptors returned on cache hits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Whether this id refers to a synthetic cache-hit descriptor rather than
    /// a queued job.
    pub fn is_cached(&self) -> bool {
        self.0.starts_with("cached-")
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Job lifecycle status
///
/// `Completed` and `Failed` are terminal: a job never transitions out of them
/// except by being pruned under the retention policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Enqueued and waiting for a worker slot (or waiting out a retry backoff)
    Pending,
    /// Currently executing the fetch/archive/upload pipeline
    Active,
    /// Successfully completed; result payload available
    Completed,
    /// All retry attempts exhausted; error message recorded
    Failed,
    /// Removed by explicit cancellation
    Cancelled,
}

impl JobStatus {
    /// Convert integer status code to JobStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => JobStatus::Pending,
            1 => JobStatus::Active,
            2 => JobStatus::Completed,
            3 => JobStatus::Failed,
            4 => JobStatus::Cancelled,
            _ => JobStatus::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert JobStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Active => 1,
            JobStatus::Completed => 2,
            JobStatus::Failed => 3,
            JobStatus::Cancelled => 4,
        }
    }

    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// An asset reference resolved against the external data store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAsset {
    /// Asset id as submitted by the caller
    pub id: String,
    /// Object-storage key holding the asset bytes
    pub storage_key: String,
    /// Human-facing filename used for the archive entry
    pub display_name: String,
    /// MIME type of the asset
    pub mime_type: String,
}

/// Terminal result of a successfully completed job
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobResult {
    /// Signed download URL for the produced archive
    pub download_url: String,
    /// When the signed URL expires
    pub expires_at: DateTime<Utc>,
    /// When the job completed
    pub completed_at: DateTime<Utc>,
    /// Number of files actually included in the archive
    pub file_count: u32,
    /// Archive size in bytes
    pub zip_size: u64,
}

/// Response to a job submission request
///
/// Either a freshly enqueued PENDING job, or a synthetic COMPLETED descriptor
/// referencing a cached archive (in which case `download_url`/`expires_at`
/// are populated and no queue entry exists).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Job id (prefixed `cached-` for cache hits)
    pub job_id: JobId,
    /// Current status (PENDING on enqueue, COMPLETED on cache hit)
    pub status: JobStatus,
    /// Number of files the job will process
    pub total_files: u32,
    /// Human-readable explanation of the outcome
    pub message: String,
    /// Download URL (cache hits only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// URL expiry (cache hits only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response to a job status query
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Job id
    pub job_id: JobId,
    /// Current lifecycle status
    pub status: JobStatus,
    /// Files archived so far
    pub processed_files: u32,
    /// Total files the job will process
    pub total_files: u32,
    /// Percent complete (0-100)
    pub progress: u8,
    /// Download URL (completed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// URL expiry (completed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Recorded error message (failed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job completed (completed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Response to a cancellation request
///
/// Cancellation is never a hard failure for the caller: unexpected internal
/// errors are folded into a `{success: false}` response with a message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    /// Whether the job was removed (or was already gone)
    pub success: bool,
    /// Human-readable explanation
    pub message: String,
}

/// Cache entry mapping a content hash to a previously produced archive
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Order-independent digest of the resolved asset-id set
    pub content_hash: String,
    /// Object-storage key of the produced archive
    pub storage_key: String,
    /// Signed download URL
    pub download_url: String,
    /// Number of files in the archive
    pub file_count: u32,
    /// Archive size in bytes
    pub zip_size: u64,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// When the signed URL expires. The cache row itself is evicted earlier,
    /// on the store's shorter TTL, so hits never serve a dead link.
    pub expires_at: DateTime<Utc>,
}

/// Push event names, scoped to the owning user
pub mod events {
    /// Emitted after each file is added to the archive
    pub const PROGRESS: &str = "bulk-download:progress";
    /// Emitted once the archive is uploaded and the result recorded
    pub const COMPLETE: &str = "bulk-download:complete";
    /// Emitted when a job attempt fails (before the queue's retry policy runs)
    pub const FAILED: &str = "bulk-download:failed";
}

/// Progress notification payload, emitted once per archived file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Job this event belongs to
    pub job_id: JobId,
    /// Files archived so far (strictly increasing per event)
    pub current: u32,
    /// Total files the job will process
    pub total: u32,
    /// Percent complete, `round(current / total * 100)`
    pub percent: u8,
    /// Entry name of the file just added
    pub current_file: String,
}

/// Completion notification payload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteEvent {
    /// Job this event belongs to
    pub job_id: JobId,
    /// Signed download URL for the archive
    pub download_url: String,
    /// When the signed URL expires
    pub expires_at: DateTime<Utc>,
    /// Number of files included in the archive
    pub file_count: u32,
    /// Archive size in bytes
    pub zip_size: u64,
}

/// Failure notification payload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailedEvent {
    /// Job this event belongs to
    pub job_id: JobId,
    /// Error message for the failed attempt
    pub error: String,
    /// When the attempt failed
    pub failed_at: DateTime<Utc>,
}

/// Queue statistics snapshot
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs waiting to start (including those waiting out a retry backoff)
    pub pending: u64,
    /// Jobs currently executing
    pub active: u64,
    /// Jobs completed and retained
    pub completed: u64,
    /// Jobs failed and retained
    pub failed: u64,
}
