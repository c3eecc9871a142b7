//! Adversarial tests for the backup envelope.
//!
//! Wrong passwords, tampering of every region, truncation, and hostile
//! headers. A backup must never decrypt to the wrong bytes, and a wrong
//! password must be indistinguishable from corruption.

use tmsync_crypto::{
    decrypt, encrypt_with, CryptoError, EncryptedEnvelope, EnvelopeHeader, KdfParams,
    ENVELOPE_VERSION,
};

const FAST: KdfParams = KdfParams { iterations: 16 };

fn sealed(plaintext: &[u8]) -> Vec<u8> {
    encrypt_with(plaintext, "correct password", &FAST).unwrap()
}

fn with_header(header: &EnvelopeHeader, body: &[u8]) -> Vec<u8> {
    let json = serde_json::to_vec(header).unwrap();
    let mut out = (json.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&json);
    out.extend_from_slice(body);
    out
}

// ── Wrong Password ──

#[test]
fn wrong_password_returns_generic_error() {
    let data = sealed(b"chat history");
    let err = decrypt(&data, "wrong password").unwrap_err();
    assert_eq!(err, CryptoError::InvalidPasswordOrCorruptData);
}

#[test]
fn wrong_password_and_corruption_are_indistinguishable() {
    let data = sealed(b"chat history");

    let wrong_pw = decrypt(&data, "nope").unwrap_err();

    let mut corrupted = data.clone();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0x01;
    let corrupt = decrypt(&corrupted, "correct password").unwrap_err();

    assert_eq!(wrong_pw, corrupt);
    assert_eq!(wrong_pw.to_string(), corrupt.to_string());
}

// ── Region Tampering ──

#[test]
fn tampered_salt_detected() {
    let mut envelope = EncryptedEnvelope::from_bytes(&sealed(b"payload")).unwrap();
    envelope.salt[0] ^= 0xFF;
    let err = decrypt(&envelope.to_bytes().unwrap(), "correct password").unwrap_err();
    assert_eq!(err, CryptoError::InvalidPasswordOrCorruptData);
}

#[test]
fn tampered_iv_detected() {
    let mut envelope = EncryptedEnvelope::from_bytes(&sealed(b"payload")).unwrap();
    envelope.iv[0] ^= 0xFF;
    let err = decrypt(&envelope.to_bytes().unwrap(), "correct password").unwrap_err();
    assert_eq!(err, CryptoError::InvalidPasswordOrCorruptData);
}

#[test]
fn tampered_tag_detected() {
    let mut envelope = EncryptedEnvelope::from_bytes(&sealed(b"payload")).unwrap();
    let last = envelope.ciphertext.len() - 1;
    envelope.ciphertext[last] ^= 0x80;
    let err = decrypt(&envelope.to_bytes().unwrap(), "correct password").unwrap_err();
    assert_eq!(err, CryptoError::InvalidPasswordOrCorruptData);
}

#[test]
fn every_body_byte_tampering_detected() {
    let data = sealed(b"sixteen bytes!!!");
    let envelope = EncryptedEnvelope::from_bytes(&data).unwrap();
    let body_start = data.len() - envelope.salt.len() - envelope.iv.len() - envelope.ciphertext.len();

    for i in body_start..data.len() {
        let mut tampered = data.clone();
        tampered[i] ^= 0x01;
        assert!(
            decrypt(&tampered, "correct password").is_err(),
            "tampering at byte {i} went undetected"
        );
    }
}

#[test]
fn appended_bytes_detected() {
    let mut data = sealed(b"payload");
    data.push(0x00);
    assert_eq!(
        decrypt(&data, "correct password").unwrap_err(),
        CryptoError::InvalidPasswordOrCorruptData
    );
}

// ── Truncation ──

#[test]
fn too_short_for_length_prefix() {
    let err = decrypt(&[0x01, 0x02], "pw").unwrap_err();
    assert!(matches!(err, CryptoError::MalformedEnvelope(_)));
}

#[test]
fn header_length_beyond_buffer() {
    let mut data = 10_000u32.to_le_bytes().to_vec();
    data.extend_from_slice(b"{}");
    let err = decrypt(&data, "pw").unwrap_err();
    match err {
        CryptoError::MalformedEnvelope(msg) => assert!(msg.contains("exceeds buffer"), "{msg}"),
        other => panic!("expected MalformedEnvelope, got {other:?}"),
    }
}

#[test]
fn missing_salt_and_iv_regions() {
    let header = EnvelopeHeader::peek(&sealed(b"x")).unwrap();
    let data = with_header(&header, &[0u8; 8]);
    let err = decrypt(&data, "correct password").unwrap_err();
    match err {
        CryptoError::MalformedEnvelope(msg) => assert!(msg.contains("salt/iv"), "{msg}"),
        other => panic!("expected MalformedEnvelope, got {other:?}"),
    }
}

#[test]
fn ciphertext_shorter_than_tag() {
    let data = sealed(b"payload");
    let truncated = &data[..data.len() - 20];
    let err = decrypt(truncated, "correct password").unwrap_err();
    assert!(matches!(err, CryptoError::MalformedEnvelope(_)));
}

#[test]
fn non_json_header_rejected() {
    let mut data = 3u32.to_le_bytes().to_vec();
    data.extend_from_slice(b"abc");
    data.extend_from_slice(&[0u8; 64]);
    let err = decrypt(&data, "pw").unwrap_err();
    assert!(matches!(err, CryptoError::MalformedEnvelope(_)));
}

// ── Hostile Headers ──

#[test]
fn future_version_rejected() {
    let data = sealed(b"payload");
    let envelope = EncryptedEnvelope::from_bytes(&data).unwrap();
    let mut header = envelope.header.clone();
    header.version = ENVELOPE_VERSION + 1;

    let mut body = envelope.salt.clone();
    body.extend_from_slice(&envelope.iv);
    body.extend_from_slice(&envelope.ciphertext);

    let err = decrypt(&with_header(&header, &body), "correct password").unwrap_err();
    assert_eq!(
        err,
        CryptoError::UnsupportedVersion {
            found: ENVELOPE_VERSION + 1,
            supported: ENVELOPE_VERSION,
        }
    );
}

#[test]
fn unknown_algorithm_rejected() {
    let envelope = EncryptedEnvelope::from_bytes(&sealed(b"payload")).unwrap();
    let mut header = envelope.header.clone();
    header.algorithm = "ChaCha20-Poly1305".to_string();

    let mut body = envelope.salt.clone();
    body.extend_from_slice(&envelope.iv);
    body.extend_from_slice(&envelope.ciphertext);

    let err = decrypt(&with_header(&header, &body), "correct password").unwrap_err();
    assert!(matches!(err, CryptoError::MalformedEnvelope(_)));
}

#[test]
fn zero_iterations_rejected() {
    let envelope = EncryptedEnvelope::from_bytes(&sealed(b"payload")).unwrap();
    let mut header = envelope.header.clone();
    header.iterations = 0;

    let mut body = envelope.salt.clone();
    body.extend_from_slice(&envelope.iv);
    body.extend_from_slice(&envelope.ciphertext);

    let err = decrypt(&with_header(&header, &body), "correct password").unwrap_err();
    assert!(matches!(err, CryptoError::MalformedEnvelope(_)));
}

#[test]
fn salt_size_overflowing_usize_rejected() {
    let mut header = EncryptedEnvelope::from_bytes(&sealed(b"payload"))
        .unwrap()
        .header;
    header.salt_size = usize::MAX - 5;

    let err = decrypt(&with_header(&header, &[0u8; 40]), "pw").unwrap_err();
    assert!(matches!(err, CryptoError::MalformedEnvelope(_)));
}

#[test]
fn salt_size_beyond_body_rejected() {
    let mut header = EncryptedEnvelope::from_bytes(&sealed(b"payload"))
        .unwrap()
        .header;
    header.salt_size = 41;

    let err = EncryptedEnvelope::from_bytes(&with_header(&header, &[0u8; 40])).unwrap_err();
    assert!(matches!(err, CryptoError::MalformedEnvelope(_)));
}

#[test]
fn altered_iteration_count_fails_authentication() {
    let envelope = EncryptedEnvelope::from_bytes(&sealed(b"payload")).unwrap();
    let mut header = envelope.header.clone();
    header.iterations += 1;

    let mut body = envelope.salt.clone();
    body.extend_from_slice(&envelope.iv);
    body.extend_from_slice(&envelope.ciphertext);

    let err = decrypt(&with_header(&header, &body), "correct password").unwrap_err();
    assert_eq!(err, CryptoError::InvalidPasswordOrCorruptData);
}
