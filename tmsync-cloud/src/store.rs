//! Object store abstraction.
//!
//! The engine only needs four verbs on named blobs. `S3ObjectStore` (in
//! [`crate::s3_transport`]) is the production implementation;
//! `MemoryObjectStore` serves tests and offline hosts.

use crate::error::SyncResult;
use crate::types::ObjectMetadata;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A downloaded object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub metadata: ObjectMetadata,
}

/// A listed object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    /// Epoch milliseconds.
    pub last_modified: Option<i64>,
    pub metadata: ObjectMetadata,
}

/// Named blob storage with user metadata.
///
/// `get` on a missing key is `Ok(None)`; every other failure is
/// `SyncError::Storage`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, metadata: ObjectMetadata) -> SyncResult<()>;
    async fn get(&self, key: &str) -> SyncResult<Option<StoredObject>>;
    async fn list(&self, prefix: &str) -> SyncResult<Vec<ObjectSummary>>;
    async fn delete(&self, key: &str) -> SyncResult<()>;
}

#[derive(Clone)]
struct MemoryEntry {
    object: StoredObject,
    last_modified: i64,
}

/// In-memory object store. Listing is ordered by key.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, MemoryEntry>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, MemoryEntry>> {
        // A panic while holding this lock cannot leave the map half-updated.
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>, metadata: ObjectMetadata) -> SyncResult<()> {
        let entry = MemoryEntry {
            object: StoredObject { data, metadata },
            last_modified: chrono::Utc::now().timestamp_millis(),
        };
        self.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> SyncResult<Option<StoredObject>> {
        Ok(self.lock().get(key).map(|entry| entry.object.clone()))
    }

    async fn list(&self, prefix: &str) -> SyncResult<Vec<ObjectSummary>> {
        Ok(self
            .lock()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| ObjectSummary {
                key: key.clone(),
                size: entry.object.data.len() as u64,
                last_modified: Some(entry.last_modified),
                metadata: entry.object.metadata.clone(),
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}
