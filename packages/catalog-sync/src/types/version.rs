//! Append-only publication history, persisted as `versions.json`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One published version of a data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub timestamp: DateTime<Utc>,

    #[serde(alias = "hash")]
    pub content_hash: String,

    /// Keys of the entities added, removed or changed by this version
    #[serde(default)]
    pub changed_ids: Vec<String>,
}

/// Current and archived versions for every data type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHistory {
    #[serde(default)]
    pub current: BTreeMap<String, VersionRecord>,

    /// Older versions per data type, oldest first
    #[serde(default)]
    pub archive: BTreeMap<String, Vec<VersionRecord>>,
}

impl VersionHistory {
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Sorted keys, two-space indent, trailing newline.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn current_for(&self, data_type: &str) -> Option<&VersionRecord> {
        self.current.get(data_type)
    }

    pub fn current_hash(&self, data_type: &str) -> Option<&str> {
        self.current
            .get(data_type)
            .map(|record| record.content_hash.as_str())
    }

    pub fn archive_for(&self, data_type: &str) -> &[VersionRecord] {
        self.archive
            .get(data_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Make `record` current, moving the previous current version to the
    /// end of the archive.
    pub fn record(&mut self, data_type: &str, record: VersionRecord) {
        if let Some(previous) = self.current.insert(data_type.to_string(), record) {
            self.archive
                .entry(data_type.to_string())
                .or_default()
                .push(previous);
        }
    }
}
