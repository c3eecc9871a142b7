mod support;

use pretty_assertions::assert_eq;
use serde_json::json;
use support::chat_snapshot;
use tmsync_cloud::{DatasetSnapshot, JsonFileDataset, LocalDataset, MemoryDataset, SyncError};

#[test]
fn record_count_counts_chats_only() {
    let snapshot = chat_snapshot(3, "a");
    assert_eq!(snapshot.indexed_db.len(), 4);
    assert_eq!(snapshot.record_count(), 3);
    assert_eq!(DatasetSnapshot::default().record_count(), 0);
}

#[test]
fn backup_bytes_use_the_host_field_names() {
    let bytes = chat_snapshot(1, "a").to_bytes().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(value["localStorage"].is_object());
    assert!(value["indexedDB"]["CHAT_a_0"].is_object());
}

#[test]
fn valid_backup_parses() {
    let bytes = json!({
        "localStorage": { "theme": "dark" },
        "indexedDB": { "CHAT_1": {}, "CHAT_2": {} },
        "extra": true
    })
    .to_string();
    let snapshot = DatasetSnapshot::from_backup_bytes(bytes.as_bytes()).unwrap();
    assert_eq!(snapshot.record_count(), 2);
    assert_eq!(snapshot.local_storage["theme"], "dark");
}

#[test]
fn malformed_backups_are_invalid_structure() {
    let cases: [&[u8]; 5] = [
        b"not json",
        b"[1, 2, 3]",
        br#"{"localStorage": {}}"#,
        br#"{"indexedDB": {}}"#,
        br#"{"localStorage": [], "indexedDB": {}}"#,
    ];
    for bytes in cases {
        assert!(
            matches!(
                DatasetSnapshot::from_backup_bytes(bytes),
                Err(SyncError::InvalidDataStructure(_))
            ),
            "{} should be rejected",
            String::from_utf8_lossy(bytes)
        );
    }
}

#[tokio::test]
async fn memory_dataset_import_replaces_state() {
    let dataset = MemoryDataset::new(chat_snapshot(1, "old"), None);
    assert_eq!(dataset.last_modified().await.unwrap(), None);

    dataset.import(&chat_snapshot(2, "new"), 42).await.unwrap();
    assert_eq!(dataset.export().await.unwrap(), chat_snapshot(2, "new"));
    assert_eq!(dataset.last_modified().await.unwrap(), Some(42));
}

#[tokio::test]
async fn json_file_dataset_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = JsonFileDataset::new(dir.path().join("data.json"));

    assert_eq!(dataset.export().await.unwrap(), DatasetSnapshot::default());
    assert_eq!(dataset.last_modified().await.unwrap(), None);
}

#[tokio::test]
async fn json_file_dataset_persists_imports() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile").join("data.json");
    let dataset = JsonFileDataset::new(&path);

    dataset.import(&chat_snapshot(3, "a"), 1_234).await.unwrap();
    assert!(!path.with_extension("json.tmp").exists());

    let reopened = JsonFileDataset::new(&path);
    assert_eq!(reopened.export().await.unwrap(), chat_snapshot(3, "a"));
    assert_eq!(reopened.last_modified().await.unwrap(), Some(1_234));

    let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(raw["modifiedAt"], 1_234);
    assert!(raw["indexedDB"].is_object());
}
