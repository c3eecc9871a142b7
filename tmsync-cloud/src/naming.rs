//! Object key layout in the bucket.
//!
//! These names are shared with every other client that reads the same
//! bucket; changing them strands existing backups.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Prefix of date-keyed daily backups.
pub const BACKUP_PREFIX: &str = "typingmind-backup-";

/// Prefix of manually created snapshots.
pub const SNAPSHOT_PREFIX: &str = "typingmind-snapshot-";

/// Control object describing the latest pushed state.
pub const METADATA_KEY: &str = "typingmind-metadata.json";

const PLAIN_EXT: &str = ".json";
const ENCRYPTED_EXT: &str = ".dat";

fn extension(encrypted: bool) -> &'static str {
    if encrypted { ENCRYPTED_EXT } else { PLAIN_EXT }
}

/// `typingmind-backup-YYYY-MM-DD.json` or `.dat`.
pub fn daily_backup_key(date: NaiveDate, encrypted: bool) -> String {
    format!(
        "{BACKUP_PREFIX}{}{}",
        date.format("%Y-%m-%d"),
        extension(encrypted)
    )
}

/// `typingmind-snapshot-2024-05-01T09-30-00-123Z.json` or `.dat`.
///
/// The timestamp is ISO-8601 with millisecond precision, with `:` and `.`
/// replaced by `-` so the key is safe on every store.
pub fn snapshot_key(at: DateTime<Utc>, encrypted: bool) -> String {
    let iso = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{SNAPSHOT_PREFIX}{iso}{}", extension(encrypted))
}

/// Whether a key names an encrypted object, judged by its extension.
pub fn is_encrypted_key(key: &str) -> bool {
    key.ends_with(ENCRYPTED_EXT)
}

/// Kind of backup object a key names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Daily,
    Snapshot,
}

/// Classifies a key, or `None` for anything that is not a backup object
/// (including the metadata object).
pub fn backup_kind(key: &str) -> Option<BackupKind> {
    let has_ext = key.ends_with(PLAIN_EXT) || key.ends_with(ENCRYPTED_EXT);
    if !has_ext {
        return None;
    }
    if key.starts_with(BACKUP_PREFIX) {
        Some(BackupKind::Daily)
    } else if key.starts_with(SNAPSHOT_PREFIX) {
        Some(BackupKind::Snapshot)
    } else {
        None
    }
}

/// Date embedded in a daily backup key.
pub fn daily_backup_date(key: &str) -> Option<NaiveDate> {
    let stem = key
        .strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(PLAIN_EXT)
        .or_else(|| key.strip_prefix(BACKUP_PREFIX)?.strip_suffix(ENCRYPTED_EXT))?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}
