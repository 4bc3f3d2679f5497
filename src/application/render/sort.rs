//! Declarative multi-key sort over mirror records.

use std::cmp::Ordering;

use crate::domain::entities::{FieldLookup, MirrorRecord};
use crate::domain::layouts::{SortDirection, SortKey};

/// Stable sort by each `(field, direction)` pair in order; the first
/// non-equal key decides. Values compare numerically when both sides parse
/// as numbers, lexicographically otherwise. Missing fields sort as blank.
pub fn sort_records(records: &mut [MirrorRecord], spec: &[SortKey]) {
    if spec.is_empty() {
        return;
    }
    records.sort_by(|a, b| compare_records(a, b, spec));
}

fn compare_records(a: &MirrorRecord, b: &MirrorRecord, spec: &[SortKey]) -> Ordering {
    for key in spec {
        let left = a.field(&key.field).unwrap_or_default();
        let right = b.field(&key.field).unwrap_or_default();
        let mut ordering = compare_values(left.trim(), right.trim());
        if key.direction == SortDirection::Descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(left: &str, right: &str) -> Ordering {
    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => left.cmp(right),
    }
}
