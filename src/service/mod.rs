//! Core archive service split into focused submodules.
//!
//! The `ArchiveService` struct and its methods are organized by domain:
//! - [`submit`] - Job submission, validation, and cache-based deduplication
//! - [`status`] - Status queries and cancellation
//!
//! The worker half of the pipeline lives in [`crate::worker`] and shares this
//! struct via cheap clones (all fields are Arc-wrapped).

mod status;
mod submit;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::collaborators::{AccessControl, AssetCatalog, Notifier, ObjectStore};
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::queue::JobQueue;
use crate::types::QueueStats;
use crate::worker::WorkerState;

/// External collaborator handles injected at construction
#[derive(Clone)]
pub struct Collaborators {
    /// Access-control layer (project authorization)
    pub access: Arc<dyn AccessControl>,
    /// Relational asset lookup
    pub catalog: Arc<dyn AssetCatalog>,
    /// Object storage (source reads, archive writes, signed URLs)
    pub store: Arc<dyn ObjectStore>,
    /// Push-notification transport
    pub notifier: Arc<dyn Notifier>,
}

/// Main archive service instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ArchiveService {
    /// Database instance for persistence (public for integration tests to
    /// query job state directly)
    pub db: Arc<Database>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Durable job queue over the shared database
    pub(crate) queue: JobQueue,
    /// Content-hash dedup cache over the shared database
    pub(crate) cache: CacheStore,
    /// Injected collaborator handles
    pub(crate) collaborators: Collaborators,
    /// Shared worker state (active-job tokens, limits, intake flag)
    pub(crate) worker_state: WorkerState,
}

impl ArchiveService {
    /// Create a new ArchiveService instance
    ///
    /// Opens (or creates) the SQLite database, runs migrations, and wires the
    /// queue and cache over it. The worker is constructed separately via
    /// [`crate::worker::Worker::new`] and started at process boot.
    pub async fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        Self::with_database(config, collaborators, db)
    }

    /// Create a service over an already-open database handle
    ///
    /// Used by tests (in-memory SQLite) and by embedders that manage the
    /// database lifecycle themselves.
    pub fn with_database(
        config: Config,
        collaborators: Collaborators,
        db: Arc<Database>,
    ) -> Result<Self> {
        let queue = JobQueue::new(db.clone(), config.retry.clone(), config.retention.clone());
        let cache = CacheStore::new(db.clone(), config.cache.ttl);
        let worker_state = WorkerState::new(&config.worker);

        Ok(Self {
            db,
            config: Arc::new(config),
            queue,
            cache,
            collaborators,
            worker_state,
        })
    }

    /// Snapshot of job counts per status
    pub async fn stats(&self) -> Result<QueueStats> {
        self.queue.stats().await
    }

    /// Push an event to a user, best-effort.
    ///
    /// Delivery failures are logged and swallowed: the pipeline's correctness
    /// never depends on a notification arriving. Events for one job are
    /// emitted in order because this awaits the transport rather than
    /// spawning.
    pub(crate) async fn notify(&self, user_id: &str, event_name: &str, payload: serde_json::Value) {
        if let Err(e) = self
            .collaborators
            .notifier
            .emit_to_user(user_id, event_name, payload)
            .await
        {
            tracing::warn!(
                user_id = %user_id,
                event = %event_name,
                error = %e,
                "Failed to push notification"
            );
        }
    }
}
