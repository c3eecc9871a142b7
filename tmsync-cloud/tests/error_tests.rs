use std::time::Duration;
use tmsync_cloud::SyncError;
use tmsync_crypto::CryptoError;

#[test]
fn storage_and_timeouts_are_retryable() {
    assert!(SyncError::Storage("connection reset".into()).is_retryable());
    assert!(
        SyncError::OperationTimeout {
            name: "daily-sync".into(),
            timeout: Duration::from_secs(300),
        }
        .is_retryable()
    );
}

#[test]
fn deterministic_failures_are_not_retryable() {
    let errors = [
        SyncError::ConfigIncomplete("bucket".into()),
        SyncError::Crypto(CryptoError::InvalidPasswordOrCorruptData),
        SyncError::MetadataUnavailable {
            reason: "decode failed".into(),
            source: None,
        },
        SyncError::InvalidDataStructure("missing 'indexedDB'".into()),
        SyncError::NotFound("typingmind-backup-2024-05-01.json".into()),
        SyncError::AlreadyRunning,
        SyncError::QueueClosed,
    ];
    for err in errors {
        assert!(!err.is_retryable(), "{err} should not be retryable");
    }
}

#[test]
fn crypto_errors_convert() {
    let err: SyncError = CryptoError::InvalidPasswordOrCorruptData.into();
    assert!(matches!(
        err,
        SyncError::Crypto(CryptoError::InvalidPasswordOrCorruptData)
    ));
}

#[test]
fn crypto_cause_looks_through_metadata_failures() {
    let err = SyncError::MetadataUnavailable {
        reason: "decrypt failed".into(),
        source: Some(CryptoError::InvalidPasswordOrCorruptData),
    };
    assert!(matches!(
        err.crypto_cause(),
        Some(CryptoError::InvalidPasswordOrCorruptData)
    ));
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(
        err.to_string(),
        "cloud metadata unavailable: decrypt failed"
    );

    assert!(SyncError::Storage("timeout".into()).crypto_cause().is_none());
}

#[test]
fn json_errors_convert() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: SyncError = json_err.into();
    assert!(matches!(err, SyncError::Serialization(_)));
}

#[test]
fn io_errors_convert() {
    let err: SyncError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
    assert!(err.to_string().contains("denied"));
}

#[test]
fn display_messages() {
    assert_eq!(
        SyncError::ConfigIncomplete("bucket, region".into()).to_string(),
        "configuration incomplete: bucket, region"
    );
    assert_eq!(
        SyncError::OperationTimeout {
            name: "manual-sync".into(),
            timeout: Duration::from_secs(5),
        }
        .to_string(),
        "operation 'manual-sync' timed out after 5s"
    );
    assert_eq!(
        SyncError::AlreadyRunning.to_string(),
        "a sync operation is already running"
    );
}
