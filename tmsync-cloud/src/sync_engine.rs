//! Backup and sync engine.
//!
//! Moves the whole dataset between the local store and the bucket:
//! - push: export, optionally seal, upload as today's daily backup, then
//!   update the cloud metadata object and apply retention
//! - pull: pick the newest daily backup, open it, validate it, import it
//! - sync: ask the director which of the two to do
//! - snapshots: on-demand, never overwritten, never pruned
//!
//! Only one transfer runs at a time; a second concurrent call gets
//! `AlreadyRunning`. Callers normally go through the operation queue, which
//! already serializes them.

use crate::clock::Clock;
use crate::codec;
use crate::config::Config;
use crate::dataset::{DatasetSnapshot, LocalDataset};
use crate::director::{Direction, decide_metadata};
use crate::error::{SyncError, SyncResult};
use crate::metadata::MetadataManager;
use crate::naming::{
    BACKUP_PREFIX, BackupKind, METADATA_KEY, SNAPSHOT_PREFIX, backup_kind, daily_backup_date,
    daily_backup_key, is_encrypted_key, snapshot_key,
};
use crate::store::{ObjectStore, ObjectSummary};
use crate::types::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Configuration shared between the engine and the service that edits it.
pub type SharedConfig = Arc<RwLock<Config>>;

/// Snapshot keys have millisecond resolution; on a collision the stamp is
/// nudged forward this many times before giving up.
const SNAPSHOT_KEY_ATTEMPTS: u32 = 8;

pub struct SyncEngine {
    config: SharedConfig,
    store: StdRwLock<Arc<dyn ObjectStore>>,
    dataset: Arc<dyn LocalDataset>,
    clock: Arc<dyn Clock>,
    metadata: Mutex<MetadataManager>,
    running: AtomicBool,
}

/// Clears the running flag when a transfer ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> SyncResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    pub fn new(
        config: SharedConfig,
        store: Arc<dyn ObjectStore>,
        dataset: Arc<dyn LocalDataset>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metadata = MetadataManager::new(store.clone(), dataset.clone(), clock.clone());
        Self {
            config,
            store: StdRwLock::new(store),
            dataset,
            clock,
            metadata: Mutex::new(metadata),
            running: AtomicBool::new(false),
        }
    }

    /// True while a push, pull, sync, snapshot, restore or delete runs.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Switches to another bucket (credentials changed).
    pub async fn replace_store(&self, store: Arc<dyn ObjectStore>) {
        let mut metadata = self.metadata.lock().await;
        *self.store.write().unwrap_or_else(|e| e.into_inner()) = store.clone();
        metadata.replace_store(store);
    }

    /// The local dataset changed outside the engine.
    pub async fn invalidate_local(&self) {
        self.metadata.lock().await.invalidate_local();
    }

    /// Drops both metadata caches.
    pub async fn reset_caches(&self) {
        self.metadata.lock().await.reset();
    }

    async fn validated_config(&self) -> SyncResult<Config> {
        let config = self.config.read().await.clone();
        config.validate()?;
        Ok(config)
    }

    /// Uploads the local dataset as today's daily backup.
    pub async fn push(&self) -> SyncResult<PushReport> {
        let _guard = RunningGuard::acquire(&self.running)?;
        let config = self.validated_config().await?;
        self.push_inner(&config).await
    }

    /// Replaces the local dataset with the newest daily backup.
    pub async fn pull(&self) -> SyncResult<PullReport> {
        let _guard = RunningGuard::acquire(&self.running)?;
        let config = self.validated_config().await?;
        self.pull_latest(&config).await
    }

    /// Resolves a direction and transfers. With `force`, a state the
    /// director would leave alone is pushed anyway.
    pub async fn sync(&self, force: bool) -> SyncResult<SyncOutcome> {
        let _guard = RunningGuard::acquire(&self.running)?;
        let config = self.validated_config().await?;

        let direction = {
            let mut metadata = self.metadata.lock().await;
            metadata.invalidate_cloud();
            let local = metadata.get_local().await?;
            let cloud = metadata.get_cloud(config.decryption_password()).await?;
            let direction = decide_metadata(&local, cloud.as_ref());
            debug!(
                "local {}@{} vs cloud {:?}: {direction:?}",
                local.record_count,
                local.timestamp,
                cloud.as_ref().map(|c| (c.record_count, c.timestamp))
            );
            direction
        };

        match direction {
            Direction::Push => Ok(SyncOutcome::Pushed(self.push_inner(&config).await?)),
            Direction::Pull => Ok(SyncOutcome::Pulled(self.pull_latest(&config).await?)),
            Direction::Noop if force => {
                info!("nothing to sync, pushing because force was requested");
                Ok(SyncOutcome::Pushed(self.push_inner(&config).await?))
            }
            Direction::Noop => {
                info!("local and cloud are in step");
                Ok(SyncOutcome::UpToDate)
            }
        }
    }

    /// Uploads the local dataset under a fresh snapshot key and returns it.
    /// Cloud metadata is left alone: snapshots are not sync state.
    pub async fn create_snapshot(&self, name: Option<&str>) -> SyncResult<String> {
        let _guard = RunningGuard::acquire(&self.running)?;
        let config = self.validated_config().await?;
        let local = self.metadata.lock().await.get_local().await?;

        let (data, encrypted) = encode(&local.snapshot, &config).await?;
        let store = self.store();
        let key = self.free_snapshot_key(store.as_ref(), encrypted).await?;
        let bytes = data.len();

        let meta = BackupObjectMeta {
            encrypted,
            sync_type: SyncType::Snapshot,
            timestamp: local.timestamp,
            snapshot_name: name.map(str::to_string),
        };
        store.put(&key, data, meta.to_map()).await?;

        info!(
            "created snapshot {key} ({} records, {bytes} bytes)",
            local.record_count
        );
        Ok(key)
    }

    async fn free_snapshot_key(&self, store: &dyn ObjectStore, encrypted: bool) -> SyncResult<String> {
        let mut at = self.clock.now();
        for _ in 0..SNAPSHOT_KEY_ATTEMPTS {
            let key = snapshot_key(at, encrypted);
            if store.list(&key).await?.iter().all(|o| o.key != key) {
                return Ok(key);
            }
            at += chrono::Duration::milliseconds(1);
        }
        Err(SyncError::Storage(
            "could not find a free snapshot key".to_string(),
        ))
    }

    /// Daily backups and snapshots, newest first.
    pub async fn list_backups(&self) -> SyncResult<Vec<BackupInfo>> {
        let store = self.store();
        let mut objects = store.list(BACKUP_PREFIX).await?;
        objects.extend(store.list(SNAPSHOT_PREFIX).await?);

        let mut backups: Vec<BackupInfo> = objects.into_iter().filter_map(backup_info).collect();
        backups.sort_by(|a, b| {
            b.effective_timestamp()
                .cmp(&a.effective_timestamp())
                .then_with(|| b.key.cmp(&a.key))
        });
        Ok(backups)
    }

    /// Replaces the local dataset with a specific backup or snapshot.
    pub async fn restore_backup(&self, key: &str) -> SyncResult<PullReport> {
        let _guard = RunningGuard::acquire(&self.running)?;
        if backup_kind(key).is_none() {
            return Err(SyncError::NotFound(format!("{key} is not a backup")));
        }
        let config = self.validated_config().await?;
        self.pull_from(&config, key, None).await
    }

    /// Deletes one backup or snapshot. The metadata object is not a backup
    /// and cannot be removed this way.
    pub async fn delete_backup(&self, key: &str) -> SyncResult<()> {
        let _guard = RunningGuard::acquire(&self.running)?;
        if key == METADATA_KEY || backup_kind(key).is_none() {
            return Err(SyncError::NotFound(format!("{key} is not a backup")));
        }
        self.validated_config().await?;

        self.store().delete(key).await?;
        info!("deleted backup {key}");
        Ok(())
    }

    async fn push_inner(&self, config: &Config) -> SyncResult<PushReport> {
        let mut metadata = self.metadata.lock().await;
        let local = metadata.get_local().await?;

        let (data, encrypted) = encode(&local.snapshot, config).await?;
        let key = daily_backup_key(self.clock.now().date_naive(), encrypted);
        let bytes = data.len();

        let meta = BackupObjectMeta {
            encrypted,
            sync_type: SyncType::Daily,
            timestamp: local.timestamp,
            snapshot_name: None,
        };
        self.store().put(&key, data, meta.to_map()).await?;

        let cloud = CloudMetadata {
            timestamp: local.timestamp,
            record_count: local.record_count,
            backup_key: Some(key.clone()),
            encrypted,
        };
        metadata.set_cloud(cloud, config.encryption_password()).await?;
        drop(metadata);

        let pruned = self.prune_daily_backups(config).await;

        info!(
            "pushed {} records to {key} ({bytes} bytes, encrypted: {encrypted})",
            local.record_count
        );
        Ok(PushReport {
            key,
            bytes,
            record_count: local.record_count,
            encrypted,
            pruned,
        })
    }

    async fn pull_latest(&self, config: &Config) -> SyncResult<PullReport> {
        let latest = self
            .store()
            .list(BACKUP_PREFIX)
            .await?
            .into_iter()
            .filter_map(backup_info)
            .filter(|b| b.kind == BackupKind::Daily)
            .max_by(|a, b| {
                a.effective_timestamp()
                    .cmp(&b.effective_timestamp())
                    .then_with(|| a.key.cmp(&b.key))
            })
            .ok_or_else(|| SyncError::NotFound("no daily backup in the bucket".to_string()))?;

        self.pull_from(config, &latest.key, latest.timestamp).await
    }

    async fn pull_from(
        &self,
        config: &Config,
        key: &str,
        listed_timestamp: Option<i64>,
    ) -> SyncResult<PullReport> {
        let object = self
            .store()
            .get(key)
            .await?
            .ok_or_else(|| SyncError::NotFound(key.to_string()))?;

        let encrypted = BackupObjectMeta::encrypted_flag(&object.metadata) || is_encrypted_key(key);
        let plaintext = if encrypted {
            let password = config.decryption_password().ok_or_else(|| {
                SyncError::ConfigIncomplete(format!("{key} is encrypted but no encryption key is set"))
            })?;
            codec::open(object.data, password).await?
        } else {
            object.data
        };

        // Validate before touching the local dataset.
        let snapshot = DatasetSnapshot::from_backup_bytes(&plaintext)?;
        let timestamp = BackupObjectMeta::timestamp_of(&object.metadata)
            .or(listed_timestamp)
            .unwrap_or_else(|| self.clock.now_millis());
        let record_count = snapshot.record_count();

        let mut metadata = self.metadata.lock().await;
        self.dataset.import(&snapshot, timestamp).await?;
        metadata.set_local(LocalMetadata {
            timestamp,
            record_count,
            snapshot: Arc::new(snapshot),
        });

        info!("pulled {record_count} records from {key}");
        Ok(PullReport {
            key: key.to_string(),
            record_count,
            timestamp,
        })
    }

    /// Deletes daily backups dated before the retention window. Failures
    /// are logged; the push they follow has already succeeded.
    async fn prune_daily_backups(&self, config: &Config) -> Vec<String> {
        if config.retention_days == 0 {
            return Vec::new();
        }
        let today = self.clock.now().date_naive();
        let Some(cutoff) = today.checked_sub_days(chrono::Days::new(u64::from(config.retention_days)))
        else {
            return Vec::new();
        };

        let store = self.store();
        let listed = match store.list(BACKUP_PREFIX).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!("retention skipped, listing failed: {e}");
                return Vec::new();
            }
        };

        let mut pruned = Vec::new();
        for object in listed {
            let Some(date) = daily_backup_date(&object.key) else {
                continue;
            };
            if date >= cutoff {
                continue;
            }
            match store.delete(&object.key).await {
                Ok(()) => {
                    debug!("pruned {} (dated {date})", object.key);
                    pruned.push(object.key);
                }
                Err(e) => warn!("failed to prune {}: {e}", object.key),
            }
        }

        if !pruned.is_empty() {
            info!(
                "retention removed {} daily backups older than {cutoff}",
                pruned.len()
            );
        }
        pruned
    }
}

/// Serializes and, when a password is configured, seals a snapshot.
async fn encode(snapshot: &DatasetSnapshot, config: &Config) -> SyncResult<(Vec<u8>, bool)> {
    let json = snapshot.to_bytes()?;
    match config.encryption_password() {
        Some(password) => Ok((codec::seal(json, password).await?, true)),
        None => Ok((json, false)),
    }
}

fn backup_info(object: ObjectSummary) -> Option<BackupInfo> {
    let kind = backup_kind(&object.key)?;
    Some(BackupInfo {
        encrypted: BackupObjectMeta::encrypted_flag(&object.metadata)
            || is_encrypted_key(&object.key),
        timestamp: BackupObjectMeta::timestamp_of(&object.metadata),
        snapshot_name: object.metadata.get(META_SNAPSHOT_NAME).cloned(),
        kind,
        size: object.size,
        last_modified: object.last_modified,
        key: object.key,
    })
}
