//! Keyed snapshots and their scalar records.
//!
//! Both maps are ordered, so serializing a snapshot always yields the same
//! bytes for the same content. That keeps the published files free of
//! reordering noise and makes the content hash meaningful.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{SnapshotError, SnapshotResult};

/// A scalar field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl FieldValue {
    /// Convert a JSON value, returning `None` for arrays and objects.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(FieldValue::Null),
            Value::Bool(b) => Some(FieldValue::Bool(b)),
            Value::Number(n) => Some(FieldValue::Number(n)),
            Value::String(s) => Some(FieldValue::Text(s)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value.into())
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Number(value.into())
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Number(value.into())
    }
}

impl From<f64> for FieldValue {
    /// Non-finite floats have no JSON form and become null.
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(FieldValue::Number)
            .unwrap_or(FieldValue::Null)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// The fields of one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, FieldValue>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field (builder pattern).
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(
        &mut self,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.0.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Field names in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A complete keyed dataset captured at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, Record>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record (builder pattern).
    pub fn with(mut self, key: impl Into<String>, record: Record) -> Self {
        self.insert(key, record);
        self
    }

    /// Insert a record, replacing any record with the same key.
    pub fn insert(&mut self, key: impl Into<String>, record: Record) -> Option<Record> {
        self.0.insert(key.into(), record)
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Entity keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Record> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a JSON document, rejecting nested field values.
    pub fn from_json(bytes: &[u8]) -> SnapshotResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Validate and convert an already-parsed JSON value.
    pub fn from_value(value: Value) -> SnapshotResult<Self> {
        let Value::Object(entries) = value else {
            return Err(SnapshotError::NotAnObject);
        };

        let mut snapshot = Snapshot::new();
        for (key, record_value) in entries {
            let Value::Object(fields) = record_value else {
                return Err(SnapshotError::RecordNotAnObject { key });
            };

            let mut record = Record::new();
            for (field, value) in fields {
                match FieldValue::from_json(value) {
                    Some(scalar) => {
                        record.insert(field, scalar);
                    }
                    None => {
                        return Err(SnapshotError::NonScalarField { key, field });
                    }
                }
            }
            snapshot.insert(key, record);
        }

        Ok(snapshot)
    }

    /// Serialize with sorted keys and fields, two-space indent and a
    /// trailing newline.
    pub fn to_canonical_json(&self) -> SnapshotResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// SHA-256 of the canonical serialization, hex encoded.
    pub fn content_hash(&self) -> SnapshotResult<String> {
        Ok(content_hash(&self.to_canonical_json()?))
    }
}

impl<K: Into<String>> FromIterator<(K, Record)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (K, Record)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, r)| (k.into(), r)).collect())
    }
}

/// SHA-256 of arbitrary bytes, hex encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
