//! Shared test helpers: configurations, datasets and in-memory wiring.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tmsync_cloud::types::ObjectMetadata;
use tmsync_cloud::{
    Config, DatasetSnapshot, ManualClock, MemoryConfigStore, MemoryDataset, MemoryObjectStore,
    ObjectStore, ObjectSummary, StorageCredentials, StoredObject, SyncEngine, SyncError,
    SyncMode, SyncResult, SyncService,
};
use tokio::sync::{RwLock, watch};

pub const PASSWORD: &str = "correct horse battery staple";

/// Installs a subscriber once so `RUST_LOG=debug` shows engine logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn credentials() -> StorageCredentials {
    StorageCredentials {
        bucket: "tmsync-test".into(),
        region: "us-east-1".into(),
        access_key_id: "test-access".into(),
        secret_access_key: "test-secret".into(),
        endpoint: None,
    }
}

/// A complete configuration in sync mode, unencrypted.
pub fn configured() -> Config {
    Config {
        sync_mode: SyncMode::Sync,
        storage: credentials(),
        ..Config::default()
    }
}

pub fn encrypted(password: &str) -> Config {
    Config {
        encryption_enabled: true,
        encryption_key: password.into(),
        ..configured()
    }
}

/// A dataset with `chats` chat records plus some non-chat entries.
pub fn chat_snapshot(chats: usize, tag: &str) -> DatasetSnapshot {
    let mut indexed_db = Map::new();
    for i in 0..chats {
        indexed_db.insert(
            format!("CHAT_{tag}_{i}"),
            json!({ "id": i, "title": format!("{tag} chat {i}") }),
        );
    }
    indexed_db.insert("SETTINGS".into(), json!({ "theme": "dark" }));

    let mut local_storage = Map::new();
    local_storage.insert("device".into(), Value::String(tag.into()));

    DatasetSnapshot {
        local_storage,
        indexed_db,
    }
}

pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

pub fn engine(
    config: Config,
    store: Arc<dyn ObjectStore>,
    dataset: Arc<MemoryDataset>,
    clock: Arc<ManualClock>,
) -> SyncEngine {
    SyncEngine::new(Arc::new(RwLock::new(config)), store, dataset, clock)
}

/// One device wired to an in-memory bucket.
pub struct Device {
    pub dataset: Arc<MemoryDataset>,
    pub config_store: Arc<MemoryConfigStore>,
    pub service: Arc<SyncService>,
}

pub fn device(
    config: Config,
    store: Arc<dyn ObjectStore>,
    clock: Arc<ManualClock>,
    snapshot: DatasetSnapshot,
    modified_at: Option<i64>,
) -> Device {
    let dataset = Arc::new(MemoryDataset::new(snapshot, modified_at));
    let config_store = Arc::new(MemoryConfigStore::new(config));
    let service = SyncService::builder(config_store.clone(), dataset.clone())
        .store(store)
        .clock(clock)
        .build()
        .unwrap();
    Device {
        dataset,
        config_store,
        service,
    }
}

/// Every call fails with a storage error.
pub struct FailingStore;

#[async_trait]
impl ObjectStore for FailingStore {
    async fn put(&self, key: &str, _: Vec<u8>, _: ObjectMetadata) -> SyncResult<()> {
        Err(SyncError::Storage(format!("put {key}: connection refused")))
    }

    async fn get(&self, key: &str) -> SyncResult<Option<StoredObject>> {
        Err(SyncError::Storage(format!("get {key}: connection refused")))
    }

    async fn list(&self, prefix: &str) -> SyncResult<Vec<ObjectSummary>> {
        Err(SyncError::Storage(format!("list {prefix}: connection refused")))
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        Err(SyncError::Storage(format!("delete {key}: connection refused")))
    }
}

/// Holds every `put` until the gate is opened.
pub struct GatedStore {
    pub inner: MemoryObjectStore,
    gate: watch::Receiver<bool>,
}

impl GatedStore {
    pub fn new() -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                inner: MemoryObjectStore::new(),
                gate: rx,
            },
            tx,
        )
    }
}

#[async_trait]
impl ObjectStore for GatedStore {
    async fn put(&self, key: &str, data: Vec<u8>, metadata: ObjectMetadata) -> SyncResult<()> {
        let mut gate = self.gate.clone();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| SyncError::Storage("gate dropped".into()))?;
        self.inner.put(key, data, metadata).await
    }

    async fn get(&self, key: &str) -> SyncResult<Option<StoredObject>> {
        self.inner.get(key).await
    }

    async fn list(&self, prefix: &str) -> SyncResult<Vec<ObjectSummary>> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        self.inner.delete(key).await
    }
}
