//! Password-based key derivation (PBKDF2-HMAC-SHA256).

use crate::error::{CryptoError, CryptoResult};
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// Salt size written by this implementation.
pub const SALT_SIZE: usize = 16;

/// Iteration count written into every new envelope header.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Key derivation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// A 256-bit key derived from a password. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derives an AES-256 key from `password` and `salt`.
///
/// Deterministic: the same password, salt and iteration count always yield
/// the same key, which is what lets an envelope be opened years later.
pub fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> CryptoResult<DerivedKey> {
    if params.iterations == 0 {
        return Err(CryptoError::Encryption(
            "key derivation needs at least one iteration".to_string(),
        ));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, params.iterations, &mut key);
    let derived = DerivedKey(key);
    key.zeroize();
    Ok(derived)
}

/// Fills a buffer of `len` bytes from the thread-local CSPRNG.
pub(crate) fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rng().fill_bytes(&mut buf);
    buf
}
