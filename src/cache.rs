//! Content-addressed archive cache.
//!
//! Maps the content hash of a requested file-set to a previously produced
//! archive. Read by the submission service before enqueuing (dedup), written
//! through by the worker after a successful completion.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::db::Database;
use crate::error::Result;
use crate::types::CacheEntry;

/// Cache store over the shared database handle
#[derive(Clone)]
pub struct CacheStore {
    db: Arc<Database>,
    ttl: Duration,
}

impl CacheStore {
    /// Create a cache store with the configured entry TTL
    pub fn new(db: Arc<Database>, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Look up a live cache entry by content hash.
    ///
    /// The store prunes expired rows on its own sweep, but the eviction
    /// deadline is re-checked here against the current clock anyway: clock
    /// skew or a stale serialized row must not hand out a dead download link.
    /// Stale rows are actively evicted and reported as a miss.
    pub async fn get(&self, content_hash: &str) -> Result<Option<CacheEntry>> {
        let row = match self.db.get_cache_entry(content_hash).await? {
            Some(row) => row,
            None => return Ok(None),
        };

        let now = Utc::now().timestamp();
        if row.expires_at <= now {
            tracing::debug!(content_hash = %content_hash, "Evicting expired cache entry on read");
            self.db.delete_cache_entry(content_hash).await?;
            return Ok(None);
        }

        let entry = CacheEntry {
            content_hash: row.content_hash,
            storage_key: row.storage_key,
            download_url: row.download_url,
            file_count: row.file_count as u32,
            zip_size: row.zip_size as u64,
            created_at: Utc
                .timestamp_opt(row.created_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
            expires_at: Utc
                .timestamp_opt(row.url_expires_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        };

        Ok(Some(entry))
    }

    /// Store an entry under the configured TTL.
    ///
    /// The eviction TTL (23h by default) is deliberately shorter than the
    /// signed URL's 24h lifetime, so a hit never references an already-dead
    /// link. The entry's `expires_at` carries the URL's real expiry and is
    /// persisted as-is; hits report that, not the eviction deadline.
    pub async fn put(&self, mut entry: CacheEntry) -> Result<()> {
        let now = Utc::now();
        entry.created_at = now;
        let cache_expires_at =
            (now + chrono::Duration::from_std(self.ttl).unwrap_or_default()).timestamp();
        self.db.put_cache_entry(&entry, cache_expires_at).await
    }
}
