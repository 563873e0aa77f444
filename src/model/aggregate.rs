//! Aggregation of source attribute rows into one derived row.

use crate::error::{Result, TformError};
use crate::spec::DerivedAttribute;
use crate::store::{AttributeRow, AttributeTable};
use chrono::{DateTime, Utc};

/// Timestamp text stored in `dl_timestamp`, e.g. `2024-06-01 10:00:00.123456+00:00`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.6f%:z").to_string()
}

/// Compute `definition` for the single location described by `existing`,
/// stamped with the current UTC time.
pub fn compute(existing: &AttributeTable, definition: &DerivedAttribute) -> Result<AttributeRow> {
    compute_at(existing, definition, Utc::now())
}

/// As [`compute`], with an explicit timestamp.
///
/// Fails with `EmptySelection` when any source variable has no row for the
/// location; the caller should skip the definition and retry on a later run.
pub fn compute_at(
    existing: &AttributeTable,
    definition: &DerivedAttribute,
    at: DateTime<Utc>,
) -> Result<AttributeRow> {
    let meta = existing.location_meta()?;

    let have = existing.attributes();
    let missing: Vec<String> = definition
        .source_variables
        .iter()
        .filter(|v| !have.contains(v.as_str()))
        .cloned()
        .collect();

    let Some(meta) = meta.filter(|_| missing.is_empty()) else {
        return Err(TformError::EmptySelection {
            location_id: existing
                .location_ids()
                .into_iter()
                .next()
                .unwrap_or_default()
                .to_string(),
            definition: definition.name.clone(),
            missing: if missing.is_empty() {
                definition.source_variables.clone()
            } else {
                missing
            },
        });
    };

    let values: Vec<f64> = existing.values_for(&definition.source_variables).collect();
    let value = (definition.callable)(values.as_slice());

    Ok(meta.row(
        &definition.name,
        value,
        &definition.provenance,
        &format_timestamp(at),
    ))
}
