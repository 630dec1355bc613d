//! In-memory collaborator fakes and harness plumbing for service tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::collaborators::{AccessControl, AssetCatalog, ByteStream, Notifier, ObjectStore};
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::ResolvedAsset;

use super::{ArchiveService, Collaborators};

/// Access control that answers the same for everyone
pub(crate) struct StaticAccess {
    pub allow: bool,
}

#[async_trait]
impl AccessControl for StaticAccess {
    async fn authorize(&self, _user_id: &str, _project_id: &str) -> Result<bool> {
        Ok(self.allow)
    }
}

/// Catalog over a fixed asset list; unknown ids silently drop out
pub(crate) struct MemoryCatalog {
    assets: Vec<ResolvedAsset>,
}

impl MemoryCatalog {
    pub fn new(assets: Vec<ResolvedAsset>) -> Self {
        Self { assets }
    }
}

#[async_trait]
impl AssetCatalog for MemoryCatalog {
    async fn resolve_assets(
        &self,
        asset_ids: &[String],
        _project_id: &str,
    ) -> Result<Vec<ResolvedAsset>> {
        Ok(asset_ids
            .iter()
            .filter_map(|id| self.assets.iter().find(|a| &a.id == id).cloned())
            .collect())
    }
}

/// Object store over in-process byte maps.
///
/// Keys registered via `hang` return a stream that never yields, which is how
/// tests exercise the per-file fetch timeout.
pub(crate) struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    hanging: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            hanging: Mutex::new(HashSet::new()),
        }
    }

    pub fn insert_object(&self, storage_key: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert(storage_key.to_string(), data);
    }

    pub fn hang(&self, storage_key: &str) {
        self.hanging.lock().unwrap().insert(storage_key.to_string());
    }

    pub fn stored(&self, storage_key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(storage_key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn fetch_stream(&self, storage_key: &str) -> Result<ByteStream> {
        if self.hanging.lock().unwrap().contains(storage_key) {
            return Ok(futures::stream::pending().boxed());
        }
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(storage_key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object {} not found", storage_key)))?;

        // Split into two chunks so consumers exercise stream accumulation
        let mid = data.len() / 2;
        let chunks: Vec<std::io::Result<Vec<u8>>> =
            vec![Ok(data[..mid].to_vec()), Ok(data[mid..].to_vec())];
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn upload_buffer(
        &self,
        buffer: Vec<u8>,
        filename: &str,
        _mime_type: &str,
        namespace: &str,
    ) -> Result<String> {
        let storage_key = format!("{}/{}", namespace, filename);
        self.insert_object(&storage_key, buffer);
        Ok(storage_key)
    }

    async fn signed_url(&self, storage_key: &str, ttl_seconds: u64) -> Result<String> {
        Ok(format!(
            "https://storage.test/{}?sig=stub&ttl={}",
            storage_key, ttl_seconds
        ))
    }
}

/// A pushed event captured by the recording notifier
#[derive(Clone, Debug)]
pub(crate) struct RecordedEvent {
    pub user_id: String,
    pub name: String,
    pub payload: serde_json::Value,
}

/// Notifier that records every push for later assertions
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn named(&self, name: &str) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Poll until at least `count` events named `name` arrive (5s cap)
    pub async fn wait_for(&self, name: &str, count: usize) -> Vec<RecordedEvent> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let matched = self.named(name);
            if matched.len() >= count {
                return matched;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {} '{}' events, saw {}",
                    count,
                    name,
                    matched.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn emit_to_user(
        &self,
        user_id: &str,
        event_name: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.events.lock().unwrap().push(RecordedEvent {
            user_id: user_id.to_string(),
            name: event_name.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Config tuned for fast test turnaround
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.worker.poll_interval = Duration::from_millis(25);
    config.worker.fetch_timeout = Duration::from_millis(250);
    config.worker.start_window = Duration::from_millis(100);
    config.worker.prune_interval = Duration::from_secs(3600);
    config.worker.shutdown_timeout = Duration::from_secs(5);
    config.retry.initial_delay = Duration::from_millis(50);
    config.retry.jitter = false;
    config
}

/// Service plus handles to its fakes
pub(crate) struct Harness {
    pub service: ArchiveService,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Resolved asset pointing at `assets/<id>` in the fake store
pub(crate) fn asset(id: &str, display_name: &str) -> ResolvedAsset {
    ResolvedAsset {
        id: id.to_string(),
        storage_key: format!("assets/{}", id),
        display_name: display_name.to_string(),
        mime_type: "application/octet-stream".to_string(),
    }
}

/// Build a service over an in-memory database and the given catalog contents.
///
/// Each asset gets a distinct payload (`content of <id>`) seeded into the
/// fake store under its storage key.
pub(crate) async fn harness(assets: Vec<ResolvedAsset>) -> Harness {
    harness_with(assets, test_config(), true).await
}

pub(crate) async fn harness_with_access(assets: Vec<ResolvedAsset>, allow: bool) -> Harness {
    harness_with(assets, test_config(), allow).await
}

pub(crate) async fn harness_with_config(assets: Vec<ResolvedAsset>, config: Config) -> Harness {
    harness_with(assets, config, true).await
}

async fn harness_with(assets: Vec<ResolvedAsset>, config: Config, allow: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    for asset in &assets {
        store.insert_object(&asset.storage_key, format!("content of {}", asset.id).into_bytes());
    }
    let notifier = Arc::new(RecordingNotifier::new());

    let collaborators = Collaborators {
        access: Arc::new(StaticAccess { allow }),
        catalog: Arc::new(MemoryCatalog::new(assets)),
        store: store.clone(),
        notifier: notifier.clone(),
    };

    let db = Arc::new(Database::in_memory().await.unwrap());
    let service = ArchiveService::with_database(config, collaborators, db).unwrap();

    Harness {
        service,
        store,
        notifier,
    }
}
