//! Content hashing and job id derivation.
//!
//! The content hash identifies a requested file-set independently of request
//! order: two submissions naming the same asset ids in any order produce the
//! same digest and therefore hit the same cache entry.

use crate::types::JobId;
use sha2::{Digest, Sha256};

/// Compute the order-independent content hash of an asset-id set.
///
/// Ids are sorted, joined with commas, and digested with SHA-256. The result
/// is a pure function of the set: permutations and duplicates of the same ids
/// hash identically once deduplicated upstream.
pub fn content_hash(asset_ids: &[String]) -> String {
    let mut sorted: Vec<&str> = asset_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let joined = sorted.join(",");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    let digest = hasher.finalize();

    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Derive a fresh job id from the current time and a content-hash prefix.
///
/// The millisecond timestamp makes ids human-traceable and sortable; the hash
/// prefix keeps concurrent submissions of different sets collision-resistant.
pub fn derive_job_id(content_hash: &str) -> JobId {
    let millis = chrono::Utc::now().timestamp_millis();
    let prefix = &content_hash[..content_hash.len().min(8)];
    JobId(format!("{}-{}", millis, prefix))
}

/// Synthetic descriptor id for a cache hit. No queue entry exists under it.
pub fn cached_job_id(content_hash: &str) -> JobId {
    JobId(format!("cached-{}", content_hash))
}
