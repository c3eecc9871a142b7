//! The local dataset being backed up.
//!
//! A snapshot is the whole application state as one JSON document:
//! `{"localStorage": {...}, "indexedDB": {...}}`. Chats live in `indexedDB`
//! under `CHAT_`-prefixed keys and are the record collection used to compare
//! the two sides.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

const CHAT_KEY_PREFIX: &str = "CHAT_";

/// Full dataset state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    #[serde(rename = "localStorage")]
    pub local_storage: Map<String, Value>,
    #[serde(rename = "indexedDB")]
    pub indexed_db: Map<String, Value>,
}

impl DatasetSnapshot {
    /// Number of chat records.
    pub fn record_count(&self) -> usize {
        self.indexed_db
            .keys()
            .filter(|k| k.starts_with(CHAT_KEY_PREFIX))
            .count()
    }

    pub fn to_bytes(&self) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses and validates a decoded backup.
    ///
    /// Both top-level sections must be present and be objects; anything else
    /// is `InvalidDataStructure` so a pull can abort before touching local
    /// state.
    pub fn from_backup_bytes(bytes: &[u8]) -> SyncResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::InvalidDataStructure(format!("not JSON: {e}")))?;

        let Value::Object(mut root) = value else {
            return Err(SyncError::InvalidDataStructure(
                "top level is not an object".to_string(),
            ));
        };

        let local_storage = take_section(&mut root, "localStorage")?;
        let indexed_db = take_section(&mut root, "indexedDB")?;

        Ok(Self {
            local_storage,
            indexed_db,
        })
    }
}

fn take_section(root: &mut Map<String, Value>, name: &str) -> SyncResult<Map<String, Value>> {
    match root.remove(name) {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(SyncError::InvalidDataStructure(format!(
            "'{name}' is not an object"
        ))),
        None => Err(SyncError::InvalidDataStructure(format!(
            "missing '{name}'"
        ))),
    }
}

/// Access to the host's dataset.
#[async_trait]
pub trait LocalDataset: Send + Sync {
    /// Reads the current state.
    async fn export(&self) -> SyncResult<DatasetSnapshot>;

    /// Replaces the whole state and records `modified_at` (epoch ms) as the
    /// last-modified stamp.
    async fn import(&self, snapshot: &DatasetSnapshot, modified_at: i64) -> SyncResult<()>;

    /// Epoch ms of the last write, if the dataset tracks one.
    async fn last_modified(&self) -> SyncResult<Option<i64>>;
}

#[derive(Default)]
struct MemoryState {
    snapshot: DatasetSnapshot,
    modified_at: Option<i64>,
}

/// In-memory dataset.
#[derive(Default)]
pub struct MemoryDataset {
    state: RwLock<MemoryState>,
}

impl MemoryDataset {
    pub fn new(snapshot: DatasetSnapshot, modified_at: Option<i64>) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                snapshot,
                modified_at,
            }),
        }
    }

    /// Host-side edit: replaces the state as if the user changed it.
    pub async fn set(&self, snapshot: DatasetSnapshot, modified_at: i64) {
        let mut state = self.state.write().await;
        state.snapshot = snapshot;
        state.modified_at = Some(modified_at);
    }
}

#[async_trait]
impl LocalDataset for MemoryDataset {
    async fn export(&self) -> SyncResult<DatasetSnapshot> {
        Ok(self.state.read().await.snapshot.clone())
    }

    async fn import(&self, snapshot: &DatasetSnapshot, modified_at: i64) -> SyncResult<()> {
        let mut state = self.state.write().await;
        state.snapshot = snapshot.clone();
        state.modified_at = Some(modified_at);
        Ok(())
    }

    async fn last_modified(&self) -> SyncResult<Option<i64>> {
        Ok(self.state.read().await.modified_at)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDataset {
    #[serde(default)]
    modified_at: Option<i64>,
    #[serde(flatten)]
    snapshot: DatasetSnapshot,
}

/// Dataset persisted as a single JSON file, replaced atomically on import.
pub struct JsonFileDataset {
    path: PathBuf,
}

impl JsonFileDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_stored(&self) -> SyncResult<Option<StoredDataset>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl LocalDataset for JsonFileDataset {
    /// A missing file is an empty dataset.
    async fn export(&self) -> SyncResult<DatasetSnapshot> {
        Ok(self
            .read_stored()
            .await?
            .map(|stored| stored.snapshot)
            .unwrap_or_default())
    }

    async fn import(&self, snapshot: &DatasetSnapshot, modified_at: i64) -> SyncResult<()> {
        let stored = StoredDataset {
            modified_at: Some(modified_at),
            snapshot: snapshot.clone(),
        };
        let json = serde_json::to_vec(&stored)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("wrote {} bytes to {}", json.len(), self.path.display());
        Ok(())
    }

    async fn last_modified(&self) -> SyncResult<Option<i64>> {
        Ok(self.read_stored().await?.and_then(|stored| stored.modified_at))
    }
}
