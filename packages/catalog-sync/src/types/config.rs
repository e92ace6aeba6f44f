//! Approval thresholds for the change classifier.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default fraction of entities a change may touch before review is needed.
pub const DEFAULT_APPROVAL_THRESHOLD: f64 = 0.1;

/// Per-field and per-category approval thresholds.
///
/// Thresholds are fractions of the published entity count. A rate must be
/// strictly greater than its threshold to require approval. Field names are
/// normalized on the way in and on lookup, so `"Title and Delivery Mode"`
/// and `TITLE_AND_DELIVERY_MODE` refer to the same field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Per-field thresholds keyed by normalized field name
    #[serde(default)]
    by_field: BTreeMap<String, f64>,

    /// Threshold for fields without their own entry
    pub default_field: f64,

    /// Threshold for the share of added entities
    pub addition: f64,

    /// Threshold for the share of removed entities
    pub removal: f64,

    /// Normalized names of fields that never require approval
    #[serde(default)]
    whitelist: BTreeSet<String>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            by_field: BTreeMap::new(),
            default_field: DEFAULT_APPROVAL_THRESHOLD,
            addition: DEFAULT_APPROVAL_THRESHOLD,
            removal: DEFAULT_APPROVAL_THRESHOLD,
            whitelist: BTreeSet::new(),
        }
    }
}

impl ThresholdConfig {
    /// Create a config with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the threshold for one field.
    pub fn with_field_threshold(mut self, field: impl AsRef<str>, threshold: f64) -> Self {
        self.by_field
            .insert(normalize_field_name(field.as_ref()), threshold);
        self
    }

    /// Set the threshold for fields without their own entry.
    pub fn with_default_field_threshold(mut self, threshold: f64) -> Self {
        self.default_field = threshold;
        self
    }

    /// Set the threshold for added entities.
    pub fn with_addition_threshold(mut self, threshold: f64) -> Self {
        self.addition = threshold;
        self
    }

    /// Set the threshold for removed entities.
    pub fn with_removal_threshold(mut self, threshold: f64) -> Self {
        self.removal = threshold;
        self
    }

    /// Exempt a field from ever requiring approval.
    pub fn with_whitelisted(mut self, field: impl AsRef<str>) -> Self {
        self.whitelist.insert(normalize_field_name(field.as_ref()));
        self
    }

    /// Threshold that applies to `field`.
    pub fn field_threshold(&self, field: &str) -> f64 {
        self.by_field
            .get(&normalize_field_name(field))
            .copied()
            .unwrap_or(self.default_field)
    }

    pub fn is_whitelisted(&self, field: &str) -> bool {
        self.whitelist.contains(&normalize_field_name(field))
    }

    /// Reject negative or non-finite thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("default field", self.default_field),
            ("addition", self.addition),
            ("removal", self.removal),
        ];
        let per_field = self.by_field.iter().map(|(k, v)| (k.as_str(), *v));

        for (name, value) in named.into_iter().chain(per_field) {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold {
                    name: name.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Uppercase, with every run of non-alphanumeric characters collapsed to a
/// single underscore and no leading or trailing underscore.
pub fn normalize_field_name(field: &str) -> String {
    let mut normalized = String::with_capacity(field.len());
    let mut pending_separator = false;

    for c in field.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !normalized.is_empty() {
                normalized.push('_');
            }
            pending_separator = false;
            normalized.extend(c.to_uppercase());
        } else {
            pending_separator = true;
        }
    }

    normalized
}
