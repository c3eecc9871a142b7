//! Sync configuration and its persistence.

use crate::error::{SyncError, SyncResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// When scheduled operations run and what they do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// No scheduled operations. Manual operations still run.
    #[default]
    Disabled,
    /// Scheduled operations always push.
    Backup,
    /// Scheduled operations run a full bidirectional sync.
    Sync,
}

/// Object store bucket and static credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageCredentials {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Optional S3-compatible endpoint override (MinIO, R2, ...).
    pub endpoint: Option<String>,
}

impl std::fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Configuration for the sync engine.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync_mode: SyncMode,

    /// Local hour (0-23) at or after which the daily operation runs.
    pub sync_hour: u32,

    /// Minute (0-59) within `sync_hour`.
    pub sync_minute: u32,

    pub encryption_enabled: bool,

    /// Password for backup envelopes. Empty when encryption is off.
    pub encryption_key: String,

    pub storage: StorageCredentials,

    /// Daily backups older than this many days are pruned after a push.
    /// Zero keeps every backup.
    pub retention_days: u32,

    /// Upper bound on a single queued operation, in seconds.
    pub operation_timeout_secs: u64,

    /// Local date of the last successful scheduled run.
    pub last_sync_date: Option<NaiveDate>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::Disabled,
            sync_hour: 21,
            sync_minute: 0,
            encryption_enabled: false,
            encryption_key: String::new(),
            storage: StorageCredentials::default(),
            retention_days: 30,
            operation_timeout_secs: 300,
            last_sync_date: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("sync_mode", &self.sync_mode)
            .field("sync_hour", &self.sync_hour)
            .field("sync_minute", &self.sync_minute)
            .field("encryption_enabled", &self.encryption_enabled)
            .field("encryption_key", &"[REDACTED]")
            .field("storage", &self.storage)
            .field("retention_days", &self.retention_days)
            .field("operation_timeout_secs", &self.operation_timeout_secs)
            .field("last_sync_date", &self.last_sync_date)
            .finish()
    }
}

impl Config {
    /// Checks that every field an operation depends on is present and in
    /// range. Fails with `ConfigIncomplete` naming each problem.
    pub fn validate(&self) -> SyncResult<()> {
        let mut problems = Vec::new();

        if self.storage.bucket.trim().is_empty() {
            problems.push("bucket");
        }
        if self.storage.region.trim().is_empty() {
            problems.push("region");
        }
        if self.storage.access_key_id.trim().is_empty() {
            problems.push("access key id");
        }
        if self.storage.secret_access_key.trim().is_empty() {
            problems.push("secret access key");
        }
        if self.encryption_enabled && self.encryption_key.is_empty() {
            problems.push("encryption key");
        }
        if self.sync_hour > 23 {
            problems.push("sync hour out of range");
        }
        if self.sync_minute > 59 {
            problems.push("sync minute out of range");
        }
        if self.operation_timeout_secs == 0 {
            problems.push("operation timeout");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SyncError::ConfigIncomplete(problems.join(", ")))
        }
    }

    /// The password to seal new uploads with, if encryption is enabled.
    pub fn encryption_password(&self) -> Option<&str> {
        (self.encryption_enabled && !self.encryption_key.is_empty())
            .then_some(self.encryption_key.as_str())
    }

    /// The password to open downloads with. Unlike
    /// [`encryption_password`](Self::encryption_password) this ignores the
    /// enabled flag: encrypted backups stay readable after encryption is
    /// switched off, as long as the key is still configured.
    pub fn decryption_password(&self) -> Option<&str> {
        (!self.encryption_key.is_empty()).then_some(self.encryption_key.as_str())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Persists the configuration outside the sync core.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> SyncResult<Config>;
    fn save(&self, config: &Config) -> SyncResult<()>;
}

/// Stores the configuration as pretty-printed JSON in a single file.
pub struct JsonFileConfigStore {
    path: PathBuf,
}

impl JsonFileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileConfigStore {
    /// A missing file yields the default configuration.
    fn load(&self) -> SyncResult<Config> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, config: &Config) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(config)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Keeps the configuration in memory. For tests and embedded hosts that
/// persist settings themselves.
#[derive(Default)]
pub struct MemoryConfigStore {
    config: Mutex<Config>,
}

impl MemoryConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> SyncResult<Config> {
        Ok(self
            .config
            .lock()
            .map_err(|_| SyncError::Storage("config store lock poisoned".to_string()))?
            .clone())
    }

    fn save(&self, config: &Config) -> SyncResult<()> {
        *self
            .config
            .lock()
            .map_err(|_| SyncError::Storage("config store lock poisoned".to_string()))? =
            config.clone();
        Ok(())
    }
}
