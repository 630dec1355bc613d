//! Content-hash cache entry CRUD.

use crate::error::DatabaseError;
use crate::types::CacheEntry;
use crate::{Error, Result};

use super::{CacheRow, Database};

impl Database {
    /// Get a cache entry by content hash
    pub async fn get_cache_entry(&self, content_hash: &str) -> Result<Option<CacheRow>> {
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT content_hash, storage_key, download_url, file_count,
                   zip_size, created_at, expires_at, url_expires_at
            FROM cache_entries
            WHERE content_hash = ?
            "#,
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get cache entry: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Insert or replace a cache entry.
    ///
    /// `cache_expires_at` is the eviction deadline; the entry's own
    /// `expires_at` (the signed URL expiry) is stored alongside it untouched.
    pub async fn put_cache_entry(&self, entry: &CacheEntry, cache_expires_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cache_entries (
                content_hash, storage_key, download_url, file_count,
                zip_size, created_at, expires_at, url_expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.content_hash)
        .bind(&entry.storage_key)
        .bind(&entry.download_url)
        .bind(entry.file_count as i64)
        .bind(entry.zip_size as i64)
        .bind(entry.created_at.timestamp())
        .bind(cache_expires_at)
        .bind(entry.expires_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to put cache entry: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Delete a single cache entry (active eviction on stale read)
    pub async fn delete_cache_entry(&self, content_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM cache_entries WHERE content_hash = ?")
            .bind(content_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete cache entry: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Delete all expired cache entries; returns rows removed
    pub async fn prune_expired_cache(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to prune expired cache entries: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }
}
