//! Shallow structural diff of two keyed snapshots.

use crate::types::diff::{DiffResult, FieldChange};
use crate::types::snapshot::{Record, Snapshot};

/// Compare the published snapshot with the next one.
///
/// Keys only in `next` are added, keys only in `current` are removed, and
/// keys in both are compared field by field. Values are compared with
/// strict equality: `"1"`, `1` and `1.0` are all different. Runs in
/// O(total fields).
pub fn compare(current: &Snapshot, next: &Snapshot) -> DiffResult {
    let mut diff = DiffResult::default();

    for key in next.keys() {
        if !current.contains_key(key) {
            diff.added.insert(key.to_string());
        }
    }

    for (key, record) in current.iter() {
        match next.get(key) {
            None => {
                diff.removed.insert(key.clone());
            }
            Some(next_record) => {
                let change = compare_records(record, next_record);
                if !change.is_empty() {
                    diff.changed.insert(key.clone(), change);
                }
            }
        }
    }

    diff
}

/// Field-level diff of two records. Lists come out sorted by field name.
pub fn compare_records(current: &Record, next: &Record) -> FieldChange {
    let mut change = FieldChange::default();

    for (field, value) in current.iter() {
        match next.get(field) {
            None => change.removed.push(field.clone()),
            Some(next_value) if next_value != value => change.changed.push(field.clone()),
            Some(_) => {}
        }
    }

    for field in next.fields() {
        if !current.contains_field(field) {
            change.added.push(field.to_string());
        }
    }

    change
}
