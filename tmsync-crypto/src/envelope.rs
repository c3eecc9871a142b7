//! Versioned binary envelope for encrypted backups.
//!
//! Layout (all stored backups depend on it byte for byte):
//!
//! ```text
//! +----------------+----------------------+-----------+---------+-------------------+
//! | header_len u32 | header (UTF-8 JSON)  | salt      | iv      | ciphertext + tag  |
//! | little endian  | header_len bytes     | saltSize  | ivSize  | remaining bytes   |
//! +----------------+----------------------+-----------+---------+-------------------+
//! ```
//!
//! The header records every parameter needed to re-derive the key, so an
//! envelope stays readable even if the defaults for new envelopes change.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_key, random_bytes, KdfParams, SALT_SIZE};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use serde::{Deserialize, Serialize};

/// Highest envelope version this implementation can open.
pub const ENVELOPE_VERSION: u32 = 1;

/// AES-GCM nonce size. The only IV size accepted on decrypt.
pub const IV_SIZE: usize = 12;

/// AES-GCM authentication tag size.
pub const TAG_SIZE: usize = 16;

pub const ALGORITHM: &str = "AES-GCM";
pub const KEY_DERIVATION: &str = "PBKDF2";

const LENGTH_PREFIX: usize = 4;

/// JSON header stored at the front of every envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeHeader {
    pub version: u32,
    pub algorithm: String,
    pub key_derivation: String,
    pub iterations: u32,
    pub salt_size: usize,
    pub iv_size: usize,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
}

impl EnvelopeHeader {
    fn new(params: &KdfParams) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            algorithm: ALGORITHM.to_string(),
            key_derivation: KEY_DERIVATION.to_string(),
            iterations: params.iterations,
            salt_size: SALT_SIZE,
            iv_size: IV_SIZE,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Reads only the header, without a password.
    pub fn peek(bytes: &[u8]) -> CryptoResult<Self> {
        let (header, _) = split_header(bytes)?;
        Ok(header)
    }

    fn check_supported(&self) -> CryptoResult<()> {
        if self.version > ENVELOPE_VERSION {
            return Err(CryptoError::UnsupportedVersion {
                found: self.version,
                supported: ENVELOPE_VERSION,
            });
        }
        if self.algorithm != ALGORITHM {
            return Err(CryptoError::MalformedEnvelope(format!(
                "unsupported algorithm {}",
                self.algorithm
            )));
        }
        if self.key_derivation != KEY_DERIVATION {
            return Err(CryptoError::MalformedEnvelope(format!(
                "unsupported key derivation {}",
                self.key_derivation
            )));
        }
        if self.iterations == 0 {
            return Err(CryptoError::MalformedEnvelope(
                "iteration count is zero".to_string(),
            ));
        }
        if self.iv_size != IV_SIZE {
            return Err(CryptoError::MalformedEnvelope(format!(
                "iv size {} (expected {IV_SIZE})",
                self.iv_size
            )));
        }
        if self.salt_size == 0 {
            return Err(CryptoError::MalformedEnvelope("salt size is zero".to_string()));
        }
        Ok(())
    }
}

/// A parsed envelope. `ciphertext` includes the trailing GCM tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub header: EnvelopeHeader,
    pub salt: Vec<u8>,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Serializes to the wire layout.
    pub fn to_bytes(&self) -> CryptoResult<Vec<u8>> {
        let header = serde_json::to_vec(&self.header)
            .map_err(|e| CryptoError::Encryption(format!("header serialization failed: {e}")))?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| CryptoError::Encryption("header too large".to_string()))?;

        let mut out = Vec::with_capacity(
            LENGTH_PREFIX + header.len() + self.salt.len() + self.iv.len() + self.ciphertext.len(),
        );
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        Ok(out)
    }

    /// Parses the wire layout. Checks structure only; the tag is verified by
    /// [`decrypt`].
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let (header, body) = split_header(bytes)?;
        header.check_supported()?;

        let regions = header
            .salt_size
            .checked_add(header.iv_size)
            .ok_or_else(|| {
                CryptoError::MalformedEnvelope(format!(
                    "salt/iv sizes {} + {} overflow",
                    header.salt_size, header.iv_size
                ))
            })?;
        if body.len() < regions {
            return Err(CryptoError::MalformedEnvelope(format!(
                "missing salt/iv regions: need {regions} bytes, have {}",
                body.len()
            )));
        }
        let (salt, rest) = body.split_at(header.salt_size);
        let (iv, ciphertext) = rest.split_at(header.iv_size);
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::MalformedEnvelope(format!(
                "ciphertext shorter than the {TAG_SIZE}-byte tag"
            )));
        }

        Ok(Self {
            header,
            salt: salt.to_vec(),
            iv: iv.to_vec(),
            ciphertext: ciphertext.to_vec(),
        })
    }
}

fn split_header(bytes: &[u8]) -> CryptoResult<(EnvelopeHeader, &[u8])> {
    if bytes.len() < LENGTH_PREFIX {
        return Err(CryptoError::MalformedEnvelope(format!(
            "buffer of {} bytes has no header length",
            bytes.len()
        )));
    }
    let (prefix, rest) = bytes.split_at(LENGTH_PREFIX);
    let mut len_bytes = [0u8; LENGTH_PREFIX];
    len_bytes.copy_from_slice(prefix);
    let header_len = u32::from_le_bytes(len_bytes) as usize;

    if header_len > rest.len() {
        return Err(CryptoError::MalformedEnvelope(format!(
            "header length {header_len} exceeds buffer ({} bytes left)",
            rest.len()
        )));
    }
    let (header_bytes, body) = rest.split_at(header_len);
    let header: EnvelopeHeader = serde_json::from_slice(header_bytes)
        .map_err(|e| CryptoError::MalformedEnvelope(format!("unreadable header: {e}")))?;
    Ok((header, body))
}

/// Returns true if `bytes` starts with a parseable envelope header.
pub fn is_envelope(bytes: &[u8]) -> bool {
    EnvelopeHeader::peek(bytes).is_ok()
}

/// Encrypts `plaintext` under `password` with the default KDF parameters.
pub fn encrypt(plaintext: &[u8], password: &str) -> CryptoResult<Vec<u8>> {
    encrypt_with(plaintext, password, &KdfParams::default())
}

/// Encrypts with explicit KDF parameters. A fresh salt and IV are drawn on
/// every call.
pub fn encrypt_with(plaintext: &[u8], password: &str, params: &KdfParams) -> CryptoResult<Vec<u8>> {
    if password.is_empty() {
        return Err(CryptoError::Encryption("password must not be empty".to_string()));
    }

    let header = EnvelopeHeader::new(params);
    let salt = random_bytes(header.salt_size);
    let iv = random_bytes(header.iv_size);

    let key = derive_key(password, &salt, params)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("cipher init failed: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("AES-GCM seal failed: {e}")))?;

    EncryptedEnvelope {
        header,
        salt,
        iv,
        ciphertext,
    }
    .to_bytes()
}

/// Opens an envelope produced by [`encrypt`] (or any compatible writer).
pub fn decrypt(bytes: &[u8], password: &str) -> CryptoResult<Vec<u8>> {
    let envelope = EncryptedEnvelope::from_bytes(bytes)?;
    let params = KdfParams {
        iterations: envelope.header.iterations,
    };

    let key = derive_key(password, &envelope.salt, &params)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("cipher init failed: {e}")))?;

    cipher
        .decrypt(Nonce::from_slice(&envelope.iv), envelope.ciphertext.as_ref())
        .map_err(|_| CryptoError::InvalidPasswordOrCorruptData)
}
