//! Row-level pipeline stages.
//!
//! Every stage is pure and order-preserving. Stages that drop rows return a
//! [`StageOutput`] with the number of rows they removed.

use std::collections::HashSet;

use crate::mapping::{ColumnPlan, FieldMapping};
use crate::models::{CanonicalRecord, NullMarkers, PersistRecord, SourceRecord};

/// Records kept by a filtering stage, plus how many were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput<T> {
    pub records: Vec<T>,
    pub removed: usize,
}

/// Output of [`normalize_nulls`].
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub records: Vec<PersistRecord>,
    /// Optional cells that were turned into NULL.
    pub nulls_normalized: usize,
}

/// Keep only the mapped columns, renamed to their canonical names.
pub fn project(records: &[SourceRecord], plan: &ColumnPlan) -> Vec<CanonicalRecord> {
    records
        .iter()
        .map(|record| CanonicalRecord {
            line: record.line,
            fields: plan
                .columns
                .iter()
                .map(|(name, index)| (name.clone(), record.cell(*index).clone()))
                .collect(),
        })
        .collect()
}

/// Drop records whose key is missing.
pub fn reject_missing_keys(
    records: Vec<CanonicalRecord>,
    key_field: &str,
    markers: &NullMarkers,
) -> StageOutput<CanonicalRecord> {
    let before = records.len();
    let records: Vec<_> = records
        .into_iter()
        .filter(|r| r.get(key_field).is_some_and(|v| !v.is_missing(markers)))
        .collect();

    StageOutput {
        removed: before - records.len(),
        records,
    }
}

/// Keep the first record of each key value, in source order.
///
/// Keys are compared by their rendered text. All missing keys share one
/// group, so at most one keyless record survives.
pub fn deduplicate_by_key(
    records: Vec<CanonicalRecord>,
    key_field: &str,
    markers: &NullMarkers,
) -> StageOutput<CanonicalRecord> {
    let before = records.len();
    let mut seen: HashSet<Option<String>> = HashSet::with_capacity(before);

    let records: Vec<_> = records
        .into_iter()
        .filter(|r| {
            let key = r.get(key_field).and_then(|v| v.to_option(markers));
            seen.insert(key)
        })
        .collect();

    StageOutput {
        removed: before - records.len(),
        records,
    }
}

/// Drop records whose required field is missing.
pub fn filter_missing_required(
    records: Vec<CanonicalRecord>,
    required_field: &str,
    markers: &NullMarkers,
) -> StageOutput<CanonicalRecord> {
    let before = records.len();
    let records: Vec<_> = records
        .into_iter()
        .filter(|r| r.get(required_field).is_some_and(|v| !v.is_missing(markers)))
        .collect();

    StageOutput {
        removed: before - records.len(),
        records,
    }
}

/// Render every cell as text, turning missing optional values into `None`.
///
/// A missing key is stored as an empty string, so the key column stays
/// non-null. A missing required value stays `None` and is left for the
/// store's NOT NULL constraint to reject.
pub fn normalize_nulls(
    records: Vec<CanonicalRecord>,
    mapping: &FieldMapping,
    markers: &NullMarkers,
) -> Normalized {
    let mut nulls_normalized = 0;

    let records = records
        .into_iter()
        .map(|record| {
            let fields = record
                .fields
                .into_iter()
                .map(|(name, value)| {
                    let normalized = if name == mapping.key_field {
                        Some(value.to_option(markers).unwrap_or_default())
                    } else {
                        let option = value.to_option(markers);
                        if option.is_none() && name != mapping.required_field {
                            nulls_normalized += 1;
                        }
                        option
                    };
                    (name, normalized)
                })
                .collect();

            PersistRecord {
                line: record.line,
                fields,
            }
        })
        .collect();

    Normalized {
        records,
        nulls_normalized,
    }
}
