//! Database layer for bulk-archive
//!
//! Handles SQLite persistence for the durable job queue and the
//! content-hash cache.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`jobs`] - Job queue CRUD, claiming, retry scheduling, retention pruning
//! - [`cache`] - Content-hash cache entries

use sqlx::{sqlite::SqlitePool, FromRow};

mod cache;
mod jobs;
mod migrations;

/// New job to be inserted into the queue
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Job id (time- and hash-derived, globally unique)
    pub id: String,
    /// Requesting user id
    pub user_id: String,
    /// Owning project id
    pub project_id: String,
    /// Resolved asset ids, in request order (JSON-encoded for storage)
    pub asset_ids: Vec<String>,
    /// Desired archive base name
    pub zip_filename: String,
    /// Order-independent digest of the resolved asset-id set
    pub content_hash: Option<String>,
    /// Number of files the job will process
    pub total_files: u32,
    /// Retry policy: maximum attempts before terminal failure
    pub max_attempts: u32,
    /// Retry policy: initial backoff delay in milliseconds
    pub backoff_initial_ms: u64,
    /// Retry policy: exponential backoff multiplier
    pub backoff_multiplier: f64,
}

/// Job record from the database
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    /// Job id
    pub id: String,
    /// Requesting user id
    pub user_id: String,
    /// Owning project id
    pub project_id: String,
    /// JSON-encoded resolved asset ids
    pub asset_ids: String,
    /// Desired archive base name
    pub zip_filename: String,
    /// Order-independent digest of the resolved asset-id set
    pub content_hash: Option<String>,
    /// Current status code (see [`crate::types::JobStatus`])
    pub status: i32,
    /// Files archived so far
    pub processed_files: i64,
    /// Total files the job will process
    pub total_files: i64,
    /// Percent complete (0-100)
    pub progress: i64,
    /// Entry name of the file most recently added
    pub current_file: Option<String>,
    /// Attempts started so far (incremented on claim)
    pub attempts: i64,
    /// Retry policy: maximum attempts before terminal failure
    pub max_attempts: i64,
    /// Retry policy: initial backoff delay in milliseconds
    pub backoff_initial_ms: i64,
    /// Retry policy: exponential backoff multiplier
    pub backoff_multiplier: f64,
    /// Unix timestamp before which the job must not be claimed
    pub next_run_at: i64,
    /// JSON-encoded terminal result (completed jobs only)
    pub result_json: Option<String>,
    /// Error message from the most recent failed attempt
    pub error_message: Option<String>,
    /// Unix timestamp when the job was enqueued
    pub created_at: i64,
    /// Unix timestamp when the current/last attempt started
    pub started_at: Option<i64>,
    /// Unix timestamp when the job reached a terminal status
    pub completed_at: Option<i64>,
}

impl JobRow {
    /// Decode the stored asset-id list.
    pub fn asset_id_list(&self) -> crate::error::Result<Vec<String>> {
        Ok(serde_json::from_str(&self.asset_ids)?)
    }
}

/// Cache entry record from the database
#[derive(Debug, Clone, FromRow)]
pub struct CacheRow {
    /// Order-independent digest of the resolved asset-id set
    pub content_hash: String,
    /// Object-storage key of the produced archive
    pub storage_key: String,
    /// Signed download URL
    pub download_url: String,
    /// Number of files in the archive
    pub file_count: i64,
    /// Archive size in bytes
    pub zip_size: i64,
    /// Unix timestamp when the entry was created
    pub created_at: i64,
    /// Unix timestamp when the entry stops being served (eviction deadline)
    pub expires_at: i64,
    /// Unix timestamp when the signed URL itself expires
    pub url_expires_at: i64,
}

/// Database handle for bulk-archive
pub struct Database {
    pool: SqlitePool,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
