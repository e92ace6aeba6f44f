//! Change-magnitude classification against approval thresholds.

use std::collections::BTreeMap;

use crate::types::config::ThresholdConfig;
use crate::types::decision::ApprovalDecision;
use crate::types::diff::DiffResult;

/// Decide whether `diff` may publish without human review.
///
/// Rates are fractions of `total_entity_count`, the number of entities in
/// the published snapshot. Whitelisted fields still get a rate but never a
/// reason. Reasons come out in a fixed order: fields by name, then
/// removals, then additions.
///
/// With an empty baseline (`total_entity_count == 0`) any non-zero count is
/// treated as a rate of 1.0, so a first publication is held for review
/// unless its thresholds are at least 1.0.
pub fn classify(
    diff: &DiffResult,
    total_entity_count: usize,
    thresholds: &ThresholdConfig,
) -> ApprovalDecision {
    let mut touched: BTreeMap<&str, usize> = BTreeMap::new();
    for change in diff.changed.values() {
        for field in change.fields() {
            *touched.entry(field).or_default() += 1;
        }
    }

    let field_rates: BTreeMap<String, f64> = touched
        .into_iter()
        .map(|(field, count)| (field.to_string(), rate(count, total_entity_count)))
        .collect();
    let addition_rate = rate(diff.added.len(), total_entity_count);
    let removal_rate = rate(diff.removed.len(), total_entity_count);

    let mut approvals_needed = Vec::new();

    for (field, field_rate) in &field_rates {
        if thresholds.is_whitelisted(field) {
            continue;
        }
        let threshold = thresholds.field_threshold(field);
        if *field_rate > threshold {
            approvals_needed.push(format!(
                "`{}` has been changed in {} of entries (> {})",
                field,
                percent(*field_rate),
                percent(threshold)
            ));
        }
    }

    if removal_rate > thresholds.removal {
        approvals_needed.push(format!(
            "{} of entries were removed (> {})",
            percent(removal_rate),
            percent(thresholds.removal)
        ));
    }

    if addition_rate > thresholds.addition {
        approvals_needed.push(format!(
            "{} of entries were added (> {})",
            percent(addition_rate),
            percent(thresholds.addition)
        ));
    }

    let auto_publishable = approvals_needed.is_empty();

    ApprovalDecision {
        field_rates,
        addition_rate,
        removal_rate,
        approvals_needed,
        auto_publishable,
    }
}

fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        return if count == 0 { 0.0 } else { 1.0 };
    }
    count as f64 / total as f64
}

/// `0.5` -> `"50%"`, `1.0 / 3.0` -> `"33.33%"`.
fn percent(fraction: f64) -> String {
    let value = fraction * 100.0;
    if (value - value.round()).abs() < 1e-9 {
        format!("{}%", value.round() as i64)
    } else {
        format!("{:.2}%", value)
    }
}
