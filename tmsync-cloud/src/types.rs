//! Shared types for backup and sync operations.

use crate::config::SyncMode;
use crate::dataset::DatasetSnapshot;
use crate::naming::BackupKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// User metadata attached to a stored object.
pub type ObjectMetadata = BTreeMap<String, String>;

/// Metadata keys. Lower case: S3 lower-cases user metadata on the way in.
pub const META_ENCRYPTED: &str = "encrypted";
pub const META_SYNC_TYPE: &str = "synctype";
pub const META_TIMESTAMP: &str = "timestamp";
pub const META_SNAPSHOT_NAME: &str = "snapshotname";

/// Why an object was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Daily,
    Snapshot,
    Metadata,
}

impl SyncType {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncType::Daily => "daily",
            SyncType::Snapshot => "snapshot",
            SyncType::Metadata => "metadata",
        }
    }
}

/// Typed view of the user metadata the engine writes on every object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupObjectMeta {
    pub encrypted: bool,
    pub sync_type: SyncType,
    /// Epoch milliseconds of the dataset state the object holds.
    pub timestamp: i64,
    pub snapshot_name: Option<String>,
}

impl BackupObjectMeta {
    pub fn to_map(&self) -> ObjectMetadata {
        let mut map = ObjectMetadata::new();
        map.insert(META_ENCRYPTED.to_string(), self.encrypted.to_string());
        map.insert(META_SYNC_TYPE.to_string(), self.sync_type.as_str().to_string());
        map.insert(META_TIMESTAMP.to_string(), self.timestamp.to_string());
        if let Some(name) = &self.snapshot_name {
            map.insert(META_SNAPSHOT_NAME.to_string(), name.clone());
        }
        map
    }

    /// Reads the `encrypted` flag. Absent or unparseable means false.
    pub fn encrypted_flag(map: &ObjectMetadata) -> bool {
        map.get(META_ENCRYPTED).is_some_and(|v| v == "true")
    }

    /// Reads the `timestamp` entry, if present and numeric.
    pub fn timestamp_of(map: &ObjectMetadata) -> Option<i64> {
        map.get(META_TIMESTAMP).and_then(|v| v.parse().ok())
    }
}

/// Local side of the sync state.
#[derive(Clone, Debug)]
pub struct LocalMetadata {
    /// Epoch milliseconds of the last known local write.
    pub timestamp: i64,
    pub record_count: usize,
    pub snapshot: Arc<DatasetSnapshot>,
}

/// Cloud side of the sync state, stored as `typingmind-metadata.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudMetadata {
    /// Epoch milliseconds of the dataset state last pushed.
    pub timestamp: i64,
    pub record_count: usize,
    /// Key of the backup object holding that state.
    #[serde(default)]
    pub backup_key: Option<String>,
    #[serde(default)]
    pub encrypted: bool,
}

/// Explicit transfer direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Push,
    Pull,
}

/// Options for a manual sync.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Push even when the director finds nothing to do.
    pub force: bool,
    /// Skip direction resolution and transfer this way.
    pub direction: Option<SyncDirection>,
}

/// What a sync actually did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Pushed(PushReport),
    Pulled(PullReport),
    UpToDate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushReport {
    pub key: String,
    pub bytes: usize,
    pub record_count: usize,
    pub encrypted: bool,
    /// Daily backups deleted by retention after the push.
    pub pruned: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullReport {
    pub key: String,
    pub record_count: usize,
    pub timestamp: i64,
}

/// A backup object as listed for the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub key: String,
    pub kind: BackupKind,
    pub size: u64,
    pub last_modified: Option<i64>,
    /// Dataset timestamp from the object metadata, if recorded.
    pub timestamp: Option<i64>,
    pub encrypted: bool,
    pub snapshot_name: Option<String>,
}

impl BackupInfo {
    /// Ordering key: recorded dataset timestamp, else store modification time.
    pub fn effective_timestamp(&self) -> i64 {
        self.timestamp.or(self.last_modified).unwrap_or(0)
    }
}

/// Sync status reported to the host.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncStatus {
    pub mode: SyncMode,
    pub is_running: bool,
    pub pending_operations: usize,
    pub running_operation: Option<String>,
    pub last_sync_date: Option<NaiveDate>,
    pub last_error: Option<String>,
    pub scheduler_active: bool,
}
