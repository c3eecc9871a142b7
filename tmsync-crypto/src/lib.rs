//! Encryption layer for tmsync backups.
//!
//! Backups are sealed into a self-describing binary envelope:
//! - PBKDF2-HMAC-SHA256 (100 000 iterations) derives a 256-bit key from the
//!   user's password and a per-envelope random salt
//! - AES-256-GCM encrypts the payload with a per-envelope random IV and
//!   appends a 128-bit authentication tag
//! - A length-prefixed JSON header records the version and every parameter
//!   needed to re-derive the key
//!
//! The envelope is a wire format shared with existing stored backups; see
//! [`envelope`] for the exact layout.

pub mod envelope;
mod error;
mod key;

pub use envelope::{
    decrypt, encrypt, encrypt_with, is_envelope, EncryptedEnvelope, EnvelopeHeader, ALGORITHM,
    ENVELOPE_VERSION, IV_SIZE, KEY_DERIVATION, TAG_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, DerivedKey, KdfParams, DEFAULT_ITERATIONS, KEY_SIZE, SALT_SIZE};
