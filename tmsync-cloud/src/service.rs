//! Host-facing API.
//!
//! Everything that touches the dataset or the bucket is submitted to the
//! operation queue under a fixed name, so manual syncs, the daily run,
//! snapshots and settings saves never overlap.

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigStore, StorageCredentials, SyncMode};
use crate::dataset::LocalDataset;
use crate::error::{SyncError, SyncResult};
use crate::queue::{
    EnqueueOutcome, OP_DAILY_SYNC, OP_MANUAL_SYNC, OP_RESTORE, OP_SETTINGS_CHANGE, OP_SNAPSHOT,
    OperationQueue, OperationTicket,
};
use crate::s3_transport::S3ObjectStore;
use crate::scheduler::{CHECK_INTERVAL, SchedulerHandle, is_due};
use crate::store::ObjectStore;
use crate::sync_engine::{SharedConfig, SyncEngine};
use crate::types::{BackupInfo, SyncDirection, SyncOptions, SyncStatus};
use chrono::NaiveDate;
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Builds an object store for a set of credentials.
pub type StoreFactory =
    Arc<dyn Fn(&StorageCredentials) -> SyncResult<Arc<dyn ObjectStore>> + Send + Sync>;

pub struct SyncServiceBuilder {
    config_store: Arc<dyn ConfigStore>,
    dataset: Arc<dyn LocalDataset>,
    store: Option<Arc<dyn ObjectStore>>,
    store_factory: Option<StoreFactory>,
    clock: Arc<dyn Clock>,
}

impl SyncServiceBuilder {
    /// Uses a fixed object store. Credential changes do not replace it.
    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the object store from the configured credentials, and again
    /// whenever saved settings change them.
    pub fn store_factory(mut self, factory: StoreFactory) -> Self {
        self.store_factory = Some(factory);
        self
    }

    /// Shorthand for an S3 store factory.
    pub fn s3(self) -> Self {
        self.store_factory(Arc::new(
            |creds: &StorageCredentials| -> SyncResult<Arc<dyn ObjectStore>> {
                Ok(Arc::new(S3ObjectStore::new(creds)))
            },
        ))
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Loads the configuration and starts the operation queue. Must be
    /// called inside a Tokio runtime. The scheduler is not started.
    pub fn build(self) -> SyncResult<Arc<SyncService>> {
        let config = self.config_store.load()?;

        let store = match (self.store, &self.store_factory) {
            (Some(store), _) => store,
            (None, Some(factory)) => factory(&config.storage)?,
            (None, None) => {
                return Err(SyncError::ConfigIncomplete(
                    "no object store configured".to_string(),
                ));
            }
        };

        info!("sync service starting in {:?} mode", config.sync_mode);
        let config: SharedConfig = Arc::new(RwLock::new(config));
        let engine = Arc::new(SyncEngine::new(
            config.clone(),
            store,
            self.dataset,
            self.clock.clone(),
        ));

        Ok(Arc::new(SyncService {
            config,
            config_store: self.config_store,
            store_factory: self.store_factory,
            engine,
            queue: OperationQueue::new(),
            clock: self.clock,
            scheduler: Mutex::new(SchedulerHandle::default()),
            daily_blocked: Arc::new(Mutex::new(None)),
        }))
    }
}

pub struct SyncService {
    config: SharedConfig,
    config_store: Arc<dyn ConfigStore>,
    store_factory: Option<StoreFactory>,
    engine: Arc<SyncEngine>,
    queue: OperationQueue,
    clock: Arc<dyn Clock>,
    scheduler: Mutex<SchedulerHandle>,
    /// Day whose daily run failed in a way another attempt cannot fix.
    daily_blocked: Arc<Mutex<Option<NaiveDate>>>,
}

impl SyncService {
    pub fn builder(
        config_store: Arc<dyn ConfigStore>,
        dataset: Arc<dyn LocalDataset>,
    ) -> SyncServiceBuilder {
        SyncServiceBuilder {
            config_store,
            dataset,
            store: None,
            store_factory: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Current configuration.
    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Runs a user-requested sync and waits for it.
    ///
    /// `Ok(false)` means an identical request was already queued and this
    /// one was dropped. An explicit direction skips the director; in backup
    /// mode a sync without one pushes.
    pub async fn perform_sync(&self, options: SyncOptions) -> SyncResult<bool> {
        let config = self.config().await;
        config.validate()?;

        let engine = self.engine.clone();
        let direction = options
            .direction
            .or((config.sync_mode == SyncMode::Backup).then_some(SyncDirection::Push));

        let outcome = self
            .queue
            .enqueue(OP_MANUAL_SYNC, config.operation_timeout(), move || async move {
                match direction {
                    Some(SyncDirection::Push) => engine.push().await.map(drop),
                    Some(SyncDirection::Pull) => engine.pull().await.map(drop),
                    None => engine.sync(options.force).await.map(drop),
                }
            })?;

        match outcome {
            EnqueueOutcome::Duplicate => Ok(false),
            EnqueueOutcome::Queued(ticket) => {
                ticket.wait().await?;
                Ok(true)
            }
        }
    }

    /// Uploads a named snapshot and returns its key. A snapshot already
    /// queued makes this call fail with `AlreadyRunning`.
    pub async fn create_snapshot(&self, name: Option<&str>) -> SyncResult<String> {
        let config = self.config().await;
        config.validate()?;

        let engine = self.engine.clone();
        let name = name.map(str::to_string);
        let (key_tx, key_rx) = oneshot::channel();
        let ticket = self
            .queue
            .enqueue(OP_SNAPSHOT, config.operation_timeout(), move || async move {
                let key = engine.create_snapshot(name.as_deref()).await?;
                let _ = key_tx.send(key);
                Ok(())
            })?
            .into_ticket()
            .ok_or(SyncError::AlreadyRunning)?;

        ticket.wait().await?;
        key_rx.await.map_err(|_| SyncError::QueueClosed)
    }

    /// Validates, persists and applies new settings, then restarts the
    /// scheduler for the new mode.
    ///
    /// A disabled configuration may be incomplete; anything else must pass
    /// validation. A missing `last_sync_date` keeps the current one.
    pub async fn save_settings(self: &Arc<Self>, mut new_config: Config) -> SyncResult<()> {
        if new_config.sync_mode != SyncMode::Disabled {
            new_config.validate()?;
        }

        let config = self.config.clone();
        let config_store = self.config_store.clone();
        let store_factory = self.store_factory.clone();
        let engine = self.engine.clone();
        let daily_blocked = self.daily_blocked.clone();
        let timeout = self.config().await.operation_timeout();

        let outcome = self
            .queue
            .enqueue(OP_SETTINGS_CHANGE, timeout, move || async move {
                let previous = config.read().await.clone();
                if new_config.last_sync_date.is_none() {
                    new_config.last_sync_date = previous.last_sync_date;
                }

                let new_store = match &store_factory {
                    Some(factory) if previous.storage != new_config.storage => {
                        Some(factory(&new_config.storage)?)
                    }
                    _ => None,
                };

                config_store.save(&new_config)?;
                *daily_blocked.lock().unwrap_or_else(|e| e.into_inner()) = None;
                let encryption_changed = previous.encryption_enabled
                    != new_config.encryption_enabled
                    || previous.encryption_key != new_config.encryption_key;
                *config.write().await = new_config;

                if let Some(store) = new_store {
                    info!("storage credentials changed, switching object store");
                    engine.replace_store(store).await;
                }
                if encryption_changed {
                    debug!("encryption settings changed, dropping metadata caches");
                    engine.reset_caches().await;
                }
                Ok(())
            })?;

        if let Some(ticket) = outcome.into_ticket() {
            ticket.wait().await?;
        }

        if self.config().await.sync_mode == SyncMode::Disabled {
            self.stop_scheduler();
        } else {
            self.start_scheduler();
        }
        Ok(())
    }

    /// One scheduler check. Enqueues the daily run when it is due and
    /// returns its ticket; `None` when nothing was due (or a run is
    /// already queued).
    ///
    /// A run that fails with a retryable error stays due and is tried again
    /// on the next check. Any other failure, such as a wrong encryption
    /// key, holds the run until the next day or until settings are saved.
    pub async fn scheduler_tick(&self) -> SyncResult<Option<OperationTicket>> {
        let current = self.config().await;
        if current.sync_mode == SyncMode::Disabled {
            return Ok(None);
        }

        let now = self.clock.local_now();
        if !is_due(now, current.sync_hour, current.sync_minute, current.last_sync_date) {
            return Ok(None);
        }
        let today = now.date();
        if *self.daily_blocked() == Some(today) {
            debug!("daily run for {today} held after a non-retryable failure");
            return Ok(None);
        }
        current.validate()?;

        let mode = current.sync_mode;
        let engine = self.engine.clone();
        let config = self.config.clone();
        let config_store = self.config_store.clone();
        let daily_blocked = self.daily_blocked.clone();

        info!("daily {mode:?} run due for {today}");
        let outcome = self
            .queue
            .enqueue(OP_DAILY_SYNC, current.operation_timeout(), move || async move {
                let result = match mode {
                    SyncMode::Backup => engine.push().await.map(drop),
                    SyncMode::Sync => engine.sync(false).await.map(drop),
                    SyncMode::Disabled => return Ok(()),
                };
                if let Err(e) = result {
                    if !e.is_retryable() {
                        warn!("daily run for {today} will not be retried today: {e}");
                        *daily_blocked.lock().unwrap_or_else(|p| p.into_inner()) = Some(today);
                    }
                    return Err(e);
                }

                let mut config = config.write().await;
                let mut updated = config.clone();
                updated.last_sync_date = Some(today);
                config_store.save(&updated)?;
                *config = updated;
                Ok(())
            })?;

        Ok(outcome.into_ticket())
    }

    /// Starts (or restarts) the periodic schedule check. The loop holds a
    /// weak reference and ends once the service is dropped.
    pub fn start_scheduler(self: &Arc<Self>) {
        let service = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CHECK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                match service.scheduler_tick().await {
                    Ok(Some(ticket)) => debug!("scheduled operation {} queued", ticket.name()),
                    Ok(None) => {}
                    Err(e) => warn!("scheduled run skipped: {e}"),
                }
            }
        });

        self.scheduler_handle().start(task);
        info!("daily scheduler started");
    }

    pub fn stop_scheduler(&self) {
        let mut handle = self.scheduler_handle();
        if handle.is_active() {
            info!("daily scheduler stopped");
        }
        handle.stop();
    }

    fn daily_blocked(&self) -> std::sync::MutexGuard<'_, Option<NaiveDate>> {
        self.daily_blocked.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn scheduler_handle(&self) -> std::sync::MutexGuard<'_, SchedulerHandle> {
        self.scheduler.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The host changed the local dataset.
    pub async fn notify_local_change(&self) {
        self.engine.invalidate_local().await;
    }

    pub async fn list_backups(&self) -> SyncResult<Vec<BackupInfo>> {
        self.config().await.validate()?;
        self.engine.list_backups().await
    }

    /// Replaces the local dataset with the given backup and waits for it.
    pub async fn restore_backup(&self, key: &str) -> SyncResult<()> {
        let config = self.config().await;
        config.validate()?;

        let engine = self.engine.clone();
        let key = key.to_string();
        let ticket = self
            .queue
            .enqueue(OP_RESTORE, config.operation_timeout(), move || async move {
                engine.restore_backup(&key).await.map(drop)
            })?
            .into_ticket()
            .ok_or(SyncError::AlreadyRunning)?;
        ticket.wait().await
    }

    pub async fn delete_backup(&self, key: &str) -> SyncResult<()> {
        let config = self.config().await;
        config.validate()?;

        let engine = self.engine.clone();
        let op_name = format!("delete-{key}");
        let key = key.to_string();
        let outcome = self
            .queue
            .enqueue(op_name, config.operation_timeout(), move || async move {
                engine.delete_backup(&key).await
            })?;

        match outcome.into_ticket() {
            Some(ticket) => ticket.wait().await,
            None => Ok(()),
        }
    }

    pub async fn status(&self) -> SyncStatus {
        let config = self.config().await;
        SyncStatus {
            mode: config.sync_mode,
            is_running: self.engine.is_running(),
            pending_operations: self.queue.pending_count(),
            running_operation: self.queue.running(),
            last_sync_date: config.last_sync_date,
            last_error: self.queue.last_error(),
            scheduler_active: self.scheduler_handle().is_active(),
        }
    }

    /// Stops the scheduler and finishes queued work.
    pub async fn shutdown(&self) {
        self.stop_scheduler();
        self.queue.shutdown().await;
        info!("sync service stopped");
    }
}
