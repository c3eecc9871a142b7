//! Cloud sync error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in backup and sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration incomplete: {0}")]
    ConfigIncomplete(String),

    #[error("storage operation failed: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] tmsync_crypto::CryptoError),

    #[error("cloud metadata unavailable: {reason}")]
    MetadataUnavailable {
        reason: String,
        #[source]
        source: Option<tmsync_crypto::CryptoError>,
    },

    #[error("invalid backup structure: {0}")]
    InvalidDataStructure(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation '{name}' timed out after {timeout:?}")]
    OperationTimeout { name: String, timeout: Duration },

    #[error("operation '{name}' failed: {reason}")]
    OperationFailed { name: String, reason: String },

    #[error("a sync operation is already running")]
    AlreadyRunning,

    #[error("operation queue is closed")]
    QueueClosed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// True for failures a later attempt may cure (network, timeouts).
    /// Configuration and crypto errors repeat identically and are not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::OperationTimeout { .. })
    }

    /// The envelope failure behind this error, if any, including one that
    /// made the cloud metadata unreadable.
    pub fn crypto_cause(&self) -> Option<&tmsync_crypto::CryptoError> {
        match self {
            Self::Crypto(e) => Some(e),
            Self::MetadataUnavailable { source, .. } => source.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn metadata_unavailable(reason: impl Into<String>) -> Self {
        Self::MetadataUnavailable {
            reason: reason.into(),
            source: None,
        }
    }
}
