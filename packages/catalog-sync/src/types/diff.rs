//! Structural difference between two snapshots.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Per-entity field changes, each list sorted by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Fields present only in the next record
    pub added: Vec<String>,

    /// Fields present only in the current record
    pub removed: Vec<String>,

    /// Fields present in both with different values
    pub changed: Vec<String>,
}

impl FieldChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Every field touched by this change, deduplicated.
    pub fn fields(&self) -> BTreeSet<&str> {
        self.added
            .iter()
            .chain(&self.removed)
            .chain(&self.changed)
            .map(String::as_str)
            .collect()
    }
}

/// Result of comparing a current snapshot with the next one.
///
/// A key appears in at most one of `added`, `removed` and `changed`, and
/// every entry in `changed` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub changed: BTreeMap<String, FieldChange>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Keys of every entity that was added, removed or changed, sorted.
    pub fn changed_ids(&self) -> Vec<String> {
        self.added
            .iter()
            .chain(&self.removed)
            .chain(self.changed.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of entities touched in any way.
    pub fn entity_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}
