//! Async wrappers around the envelope codec.
//!
//! PBKDF2 at 100k rounds is CPU-bound, so sealing and opening run on the
//! blocking pool instead of stalling the runtime.

use crate::error::{SyncError, SyncResult};

pub async fn seal(plaintext: Vec<u8>, password: &str) -> SyncResult<Vec<u8>> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || tmsync_crypto::encrypt(&plaintext, &password))
        .await
        .map_err(|e| SyncError::OperationFailed {
            name: "encrypt".to_string(),
            reason: e.to_string(),
        })?
        .map_err(SyncError::from)
}

pub async fn open(envelope: Vec<u8>, password: &str) -> SyncResult<Vec<u8>> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || tmsync_crypto::decrypt(&envelope, &password))
        .await
        .map_err(|e| SyncError::OperationFailed {
            name: "decrypt".to_string(),
            reason: e.to_string(),
        })?
        .map_err(SyncError::from)
}
