mod support;

use pretty_assertions::assert_eq;
use std::time::Duration;
use tmsync_cloud::{
    Config, ConfigStore, JsonFileConfigStore, MemoryConfigStore, StorageCredentials, SyncError,
    SyncMode,
};

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.sync_mode, SyncMode::Disabled);
    assert_eq!((config.sync_hour, config.sync_minute), (21, 0));
    assert!(!config.encryption_enabled);
    assert_eq!(config.retention_days, 30);
    assert_eq!(config.operation_timeout(), Duration::from_secs(300));
    assert_eq!(config.last_sync_date, None);
    assert_eq!(config.storage.endpoint, None);
}

#[test]
fn complete_config_validates() {
    support::configured().validate().unwrap();
    support::encrypted("pw").validate().unwrap();
}

#[test]
fn validation_names_every_missing_field() {
    let err = Config::default().validate().unwrap_err();
    let SyncError::ConfigIncomplete(msg) = err else {
        panic!("expected ConfigIncomplete, got {err:?}");
    };
    for field in ["bucket", "region", "access key id", "secret access key"] {
        assert!(msg.contains(field), "{msg} should mention {field}");
    }
}

#[test]
fn encryption_without_key_is_incomplete() {
    let config = Config {
        encryption_enabled: true,
        encryption_key: String::new(),
        ..support::configured()
    };
    assert!(matches!(
        config.validate(),
        Err(SyncError::ConfigIncomplete(msg)) if msg == "encryption key"
    ));
}

#[test]
fn schedule_out_of_range_is_rejected() {
    let config = Config {
        sync_hour: 24,
        sync_minute: 60,
        ..support::configured()
    };
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("sync hour"));
    assert!(err.contains("sync minute"));
}

#[test]
fn passwords_follow_the_encryption_flag() {
    let on = support::encrypted("pw");
    assert_eq!(on.encryption_password(), Some("pw"));
    assert_eq!(on.decryption_password(), Some("pw"));

    let off = Config {
        encryption_enabled: false,
        ..on
    };
    assert_eq!(off.encryption_password(), None);
    assert_eq!(off.decryption_password(), Some("pw"));

    assert_eq!(support::configured().decryption_password(), None);
}

#[test]
fn debug_output_redacts_secrets() {
    let config = support::encrypted("hunter2");
    let debug = format!("{config:?}");
    assert!(!debug.contains("hunter2"));
    assert!(!debug.contains("test-secret"));
    assert!(debug.contains("[REDACTED]"));
    assert!(debug.contains("tmsync-test"));
}

#[test]
fn serializes_modes_in_lowercase() {
    let json = serde_json::to_value(support::configured()).unwrap();
    assert_eq!(json["sync_mode"], "sync");
}

#[test]
fn older_files_with_missing_fields_still_load() {
    let json = r#"{"sync_mode": "backup", "storage": {"bucket": "b"}}"#;
    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.sync_mode, SyncMode::Backup);
    assert_eq!(config.storage.bucket, "b");
    assert_eq!(config.sync_hour, 21);
    assert_eq!(config.retention_days, 30);
}

#[test]
fn json_file_store_missing_file_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileConfigStore::new(dir.path().join("sync.json"));
    assert_eq!(store.load().unwrap(), Config::default());
}

#[test]
fn json_file_store_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("sync.json");
    let store = JsonFileConfigStore::new(&path);

    let config = Config {
        storage: StorageCredentials {
            endpoint: Some("http://localhost:9000".into()),
            ..support::credentials()
        },
        last_sync_date: chrono::NaiveDate::from_ymd_opt(2024, 5, 1),
        ..support::encrypted("pw")
    };
    store.save(&config).unwrap();

    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());
    assert_eq!(JsonFileConfigStore::new(&path).load().unwrap(), config);
}

#[test]
fn json_file_store_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync.json");
    std::fs::write(&path, b"not json").unwrap();

    assert!(matches!(
        JsonFileConfigStore::new(&path).load(),
        Err(SyncError::Serialization(_))
    ));
}

#[test]
fn memory_store_keeps_last_save() {
    let store = MemoryConfigStore::default();
    assert_eq!(store.load().unwrap(), Config::default());

    store.save(&support::configured()).unwrap();
    assert_eq!(store.load().unwrap(), support::configured());
}
