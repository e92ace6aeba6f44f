use std::collections::BTreeMap;

use serde::Serialize;

/// The classifier's verdict on whether a diff may publish without review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalDecision {
    /// Share of entities touching each field, keyed by field name
    pub field_rates: BTreeMap<String, f64>,

    /// Share of entities added, relative to the published count
    pub addition_rate: f64,

    /// Share of entities removed, relative to the published count
    pub removal_rate: f64,

    /// Human-readable reasons review is required
    pub approvals_needed: Vec<String>,

    /// True iff `approvals_needed` is empty
    pub auto_publishable: bool,
}
