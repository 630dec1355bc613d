//! Collaborator interfaces consumed by the pipeline.
//!
//! These traits are the crate's only view of the surrounding system: the
//! access-control layer, the relational asset store, object storage, and the
//! push-notification transport. Implementations are injected into
//! [`crate::service::ArchiveService`] at construction; tests substitute
//! in-memory fakes.

use crate::error::Result;
use crate::types::ResolvedAsset;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Byte stream for a single source file.
///
/// Dropping the stream aborts the underlying transfer, which is how per-file
/// fetch timeouts cancel network activity rather than merely abandoning it.
pub type ByteStream = BoxStream<'static, std::io::Result<Vec<u8>>>;

/// Access-control collaborator: may `user_id` act on `project_id`?
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Returns true if the user is authorized for the project.
    async fn authorize(&self, user_id: &str, project_id: &str) -> Result<bool>;
}

/// Relational lookup collaborator resolving asset references.
#[async_trait]
pub trait AssetCatalog: Send + Sync {
    /// Resolve `asset_ids` to the subset that exists and belongs to
    /// `project_id`. Unknown or foreign ids are simply absent from the
    /// result; the caller decides how to treat the shrinkage.
    async fn resolve_assets(
        &self,
        asset_ids: &[String],
        project_id: &str,
    ) -> Result<Vec<ResolvedAsset>>;
}

/// Object-storage collaborator for reading source files and writing archives.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a byte stream for the object at `storage_key`.
    async fn fetch_stream(&self, storage_key: &str) -> Result<ByteStream>;

    /// Upload `buffer` under the given namespace and filename, returning the
    /// storage key of the written object.
    async fn upload_buffer(
        &self,
        buffer: Vec<u8>,
        filename: &str,
        mime_type: &str,
        namespace: &str,
    ) -> Result<String>;

    /// Produce a signed, time-limited download URL for a stored object.
    async fn signed_url(&self, storage_key: &str, ttl_seconds: u64) -> Result<String>;
}

/// Push-notification collaborator.
///
/// Delivery is best-effort: the pipeline logs failures and never lets them
/// affect job outcomes. There is no acknowledgement and no backpressure.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Push a named event to the destination associated with `user_id`.
    async fn emit_to_user(
        &self,
        user_id: &str,
        event_name: &str,
        payload: serde_json::Value,
    ) -> Result<()>;
}
