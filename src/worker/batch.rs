//! Concurrent batched file fetching.
//!
//! Fetches a slice of resolved assets in parallel, applying the per-file
//! timeout. Individual failures are logged and excluded from the result so
//! one slow or missing object never sinks the whole archive; the caller
//! decides whether an entirely empty result is fatal.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::StreamExt;

use crate::collaborators::ObjectStore;
use crate::error::Result;
use crate::types::ResolvedAsset;

/// One successfully fetched file, ready to be appended to the archive
pub(crate) struct FetchedFile {
    /// The asset this data belongs to
    pub asset: ResolvedAsset,
    /// Complete file contents
    pub data: Vec<u8>,
}

/// Fetch `assets` concurrently, preserving slice order among the successes.
///
/// Each fetch runs under `fetch_timeout`; hitting it drops the byte stream,
/// which aborts the underlying transfer rather than leaving it running.
pub(crate) async fn fetch_batch(
    store: &Arc<dyn ObjectStore>,
    assets: &[ResolvedAsset],
    fetch_timeout: Duration,
) -> Vec<FetchedFile> {
    let fetches = assets.iter().map(|asset| {
        let store = store.clone();
        let asset = asset.clone();
        async move {
            match tokio::time::timeout(fetch_timeout, fetch_one(&store, &asset)).await {
                Ok(Ok(data)) => Some(FetchedFile { asset, data }),
                Ok(Err(e)) => {
                    tracing::warn!(
                        asset_id = %asset.id,
                        storage_key = %asset.storage_key,
                        error = %e,
                        "File fetch failed, excluding from archive"
                    );
                    None
                }
                Err(_) => {
                    tracing::warn!(
                        asset_id = %asset.id,
                        storage_key = %asset.storage_key,
                        timeout_ms = fetch_timeout.as_millis() as u64,
                        "File fetch timed out, excluding from archive"
                    );
                    None
                }
            }
        }
    });

    join_all(fetches).await.into_iter().flatten().collect()
}

async fn fetch_one(store: &Arc<dyn ObjectStore>, asset: &ResolvedAsset) -> Result<Vec<u8>> {
    let mut stream = store.fetch_stream(&asset.storage_key).await?;
    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}
