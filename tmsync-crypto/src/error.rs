//! Envelope encryption error types.

use thiserror::Error;

/// Result type for codec operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors produced while sealing or opening an envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// The cipher or key derivation could not run.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Tag verification failed. Deliberately carries no detail: a wrong
    /// password and a corrupted ciphertext must look the same.
    #[error("invalid password or corrupt data")]
    InvalidPasswordOrCorruptData,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unsupported envelope version {found} (highest supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}
