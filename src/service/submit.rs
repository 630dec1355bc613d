//! Job submission, validation, and cache-based deduplication.

use crate::db::NewJob;
use crate::error::{Error, Result};
use crate::hash;
use crate::types::{JobDescriptor, JobStatus};

use super::ArchiveService;

impl ArchiveService {
    /// Submit a bulk-archive request.
    ///
    /// Validates the request shape, authorizes the user against the project,
    /// resolves the asset ids, and then either returns a cached result (no
    /// queue entry created) or enqueues a new PENDING job. Never waits on
    /// the worker.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an empty or oversized asset list
    /// - [`Error::AccessDenied`] if the user cannot act on the project
    /// - [`Error::NotFound`] if none of the requested assets resolve
    /// - [`Error::ShuttingDown`] once worker intake has stopped
    pub async fn create_job(
        &self,
        asset_ids: &[String],
        project_id: &str,
        user_id: &str,
        zip_filename: Option<&str>,
    ) -> Result<JobDescriptor> {
        if asset_ids.is_empty() {
            return Err(Error::Validation("assetIds must not be empty".to_string()));
        }
        let max = self.config.archive.max_assets_per_request;
        if asset_ids.len() > max {
            return Err(Error::Validation(format!(
                "assetIds exceeds the maximum of {} entries",
                max
            )));
        }
        if !self.worker_state.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let authorized = self
            .collaborators
            .access
            .authorize(user_id, project_id)
            .await?;
        if !authorized {
            return Err(Error::AccessDenied(format!(
                "user {} has no access to project {}",
                user_id, project_id
            )));
        }

        let resolved = self
            .collaborators
            .catalog
            .resolve_assets(asset_ids, project_id)
            .await?;
        if resolved.is_empty() {
            return Err(Error::NotFound(
                "none of the requested assets exist in this project".to_string(),
            ));
        }
        if resolved.len() < asset_ids.len() {
            // Invalid ids are dropped, not fatal
            tracing::warn!(
                requested = asset_ids.len(),
                resolved = resolved.len(),
                project_id = %project_id,
                "Some requested assets could not be resolved, proceeding with the valid subset"
            );
        }

        // Preserve request order, filtered to the ids that resolved
        let resolved_ids: Vec<String> = {
            let valid: std::collections::HashSet<&str> =
                resolved.iter().map(|a| a.id.as_str()).collect();
            asset_ids
                .iter()
                .filter(|id| valid.contains(id.as_str()))
                .cloned()
                .collect()
        };

        let content_hash = hash::content_hash(&resolved_ids);

        if let Some(entry) = self.cache.get(&content_hash).await? {
            tracing::info!(
                content_hash = %content_hash,
                user_id = %user_id,
                "Cache hit for requested asset set, returning existing archive"
            );
            return Ok(JobDescriptor {
                job_id: hash::cached_job_id(&content_hash),
                status: JobStatus::Completed,
                total_files: entry.file_count,
                message: "Archive already available".to_string(),
                download_url: Some(entry.download_url),
                expires_at: Some(entry.expires_at),
            });
        }

        let job_id = hash::derive_job_id(&content_hash);
        let total_files = resolved_ids.len() as u32;

        self.queue
            .enqueue(NewJob {
                id: job_id.0.clone(),
                user_id: user_id.to_string(),
                project_id: project_id.to_string(),
                asset_ids: resolved_ids,
                zip_filename: normalize_zip_filename(
                    zip_filename,
                    &self.config.archive.default_zip_filename,
                ),
                content_hash: Some(content_hash),
                total_files,
                max_attempts: self.config.retry.max_attempts,
                backoff_initial_ms: self.config.retry.initial_delay.as_millis() as u64,
                backoff_multiplier: self.config.retry.backoff_multiplier,
            })
            .await?;

        tracing::info!(job_id = %job_id, total_files, user_id = %user_id, "Archive job queued");

        Ok(JobDescriptor {
            job_id,
            status: JobStatus::Pending,
            total_files,
            message: format!("Archive job queued for {} files", total_files),
            download_url: None,
            expires_at: None,
        })
    }
}

/// Ensure the archive filename is non-empty and carries a `.zip` extension
fn normalize_zip_filename(requested: Option<&str>, default: &str) -> String {
    let name = match requested.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => default,
    };
    if name.to_ascii_lowercase().ends_with(".zip") {
        name.to_string()
    } else {
        format!("{}.zip", name)
    }
}
