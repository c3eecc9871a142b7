//! Cloud backup and sync for tmsync.
//!
//! Copies a whole local dataset to an S3 bucket and back:
//! - daily backups keyed by date, plus on-demand snapshots
//! - optional password encryption of every object (see `tmsync-crypto`)
//! - a metadata object that lets devices decide which side is newer
//! - a single-flight operation queue so transfers never overlap
//! - a daily scheduler driven by a periodic check
//!
//! [`SyncService`] is the entry point for hosts.

mod codec;
pub mod clock;
pub mod config;
pub mod dataset;
pub mod director;
pub mod error;
pub mod metadata;
pub mod naming;
pub mod queue;
pub mod s3_transport;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod sync_engine;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    Config, ConfigStore, JsonFileConfigStore, MemoryConfigStore, StorageCredentials, SyncMode,
};
pub use dataset::{DatasetSnapshot, JsonFileDataset, LocalDataset, MemoryDataset};
pub use director::{Direction, SideState, decide};
pub use error::{SyncError, SyncResult};
pub use naming::BackupKind;
pub use queue::{EnqueueOutcome, OperationQueue, OperationTicket};
pub use s3_transport::S3ObjectStore;
pub use service::{StoreFactory, SyncService, SyncServiceBuilder};
pub use store::{MemoryObjectStore, ObjectStore, ObjectSummary, StoredObject};
pub use sync_engine::SyncEngine;
pub use types::*;
