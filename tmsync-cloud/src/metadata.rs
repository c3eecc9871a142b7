//! Cached local and cloud sync state.
//!
//! Each side is read at most once until it is written or invalidated. Every
//! write the engine makes goes through here, so a cache is never stale with
//! respect to this process's own writes.

use crate::clock::Clock;
use crate::codec;
use crate::dataset::LocalDataset;
use crate::error::{SyncError, SyncResult};
use crate::naming::METADATA_KEY;
use crate::store::ObjectStore;
use crate::types::{BackupObjectMeta, CloudMetadata, LocalMetadata, SyncType};
use std::sync::Arc;
use tracing::debug;

pub struct MetadataManager {
    store: Arc<dyn ObjectStore>,
    dataset: Arc<dyn LocalDataset>,
    clock: Arc<dyn Clock>,
    local: Option<LocalMetadata>,
    /// `Some(None)` caches "no metadata object exists yet".
    cloud: Option<Option<CloudMetadata>>,
}

impl MetadataManager {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        dataset: Arc<dyn LocalDataset>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            dataset,
            clock,
            local: None,
            cloud: None,
        }
    }

    /// Local state, computed from the dataset on a cache miss.
    ///
    /// The timestamp is the dataset's last-modified stamp; a dataset that
    /// has never recorded one is stamped with the current time.
    pub async fn get_local(&mut self) -> SyncResult<LocalMetadata> {
        if let Some(local) = &self.local {
            return Ok(local.clone());
        }

        let snapshot = self.dataset.export().await?;
        let timestamp = match self.dataset.last_modified().await? {
            Some(ts) => ts,
            None => self.clock.now_millis(),
        };
        let local = LocalMetadata {
            timestamp,
            record_count: snapshot.record_count(),
            snapshot: Arc::new(snapshot),
        };

        debug!(
            "computed local metadata: {} records at {}",
            local.record_count, local.timestamp
        );
        self.local = Some(local.clone());
        Ok(local)
    }

    /// Cloud state, downloaded on a cache miss.
    ///
    /// `Ok(None)` when no metadata object exists yet. A present but
    /// unreadable object is `MetadataUnavailable`.
    pub async fn get_cloud(&mut self, password: Option<&str>) -> SyncResult<Option<CloudMetadata>> {
        if let Some(cloud) = &self.cloud {
            return Ok(cloud.clone());
        }

        let Some(object) = self.store.get(METADATA_KEY).await? else {
            debug!("no cloud metadata object yet");
            self.cloud = Some(None);
            return Ok(None);
        };

        let bytes = if BackupObjectMeta::encrypted_flag(&object.metadata) {
            let password = password.ok_or_else(|| {
                SyncError::metadata_unavailable(
                    "metadata is encrypted but no encryption key is configured",
                )
            })?;
            codec::open(object.data, password)
                .await
                .map_err(|e| match e {
                    SyncError::Crypto(crypto) => SyncError::MetadataUnavailable {
                        reason: format!("decrypt failed: {crypto}"),
                        source: Some(crypto),
                    },
                    other => SyncError::metadata_unavailable(format!("decrypt failed: {other}")),
                })?
        } else {
            object.data
        };

        let cloud: CloudMetadata = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::metadata_unavailable(format!("decode failed: {e}")))?;

        debug!(
            "loaded cloud metadata: {} records at {}",
            cloud.record_count, cloud.timestamp
        );
        self.cloud = Some(Some(cloud.clone()));
        Ok(Some(cloud))
    }

    /// Forgets the local state; the next `get_local` re-reads the dataset.
    pub fn invalidate_local(&mut self) {
        self.local = None;
    }

    /// Records local state just written by a pull.
    pub fn set_local(&mut self, local: LocalMetadata) {
        self.local = Some(local);
    }

    /// Forgets the cloud state; other devices write it too.
    pub fn invalidate_cloud(&mut self) {
        self.cloud = None;
    }

    /// Uploads the metadata object and updates the cache. Sealed when a
    /// password is given.
    pub async fn set_cloud(&mut self, cloud: CloudMetadata, password: Option<&str>) -> SyncResult<()> {
        let json = serde_json::to_vec(&cloud)?;
        let (data, encrypted) = match password {
            Some(pw) => (codec::seal(json, pw).await?, true),
            None => (json, false),
        };

        let meta = BackupObjectMeta {
            encrypted,
            sync_type: SyncType::Metadata,
            timestamp: cloud.timestamp,
            snapshot_name: None,
        };
        self.store.put(METADATA_KEY, data, meta.to_map()).await?;

        debug!("uploaded cloud metadata ({} records)", cloud.record_count);
        self.cloud = Some(Some(cloud));
        Ok(())
    }

    /// Cached local state without touching the dataset.
    pub fn cached_local(&self) -> Option<&LocalMetadata> {
        self.local.as_ref()
    }

    /// Cached cloud state without touching the store.
    pub fn cached_cloud(&self) -> Option<&Option<CloudMetadata>> {
        self.cloud.as_ref()
    }

    /// Points at a different bucket. The cloud cache belonged to the old one.
    pub fn replace_store(&mut self, store: Arc<dyn ObjectStore>) {
        self.store = store;
        self.cloud = None;
    }

    /// Drops both caches (after settings changes).
    pub fn reset(&mut self) {
        self.local = None;
        self.cloud = None;
    }
}
