use crate::error::{Result, TformError};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// One long-format attribute observation for a location.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeRow {
    pub location_id: String,
    pub attribute: String,
    pub value: f64,
    pub data_source: String,
    pub dl_timestamp: String,
}

impl AttributeRow {
    /// Full-row identity. Values compare by bit pattern so NaN rows dedup too.
    fn identity(&self) -> (&str, &str, u64, &str, &str) {
        (
            &self.location_id,
            &self.attribute,
            self.value.to_bits(),
            &self.data_source,
            &self.dl_timestamp,
        )
    }

    /// Provenance identity within one location.
    fn provenance_key(&self) -> (&str, &str, &str) {
        (&self.location_id, &self.attribute, &self.data_source)
    }
}

impl PartialEq for AttributeRow {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for AttributeRow {}

/// Location-level fields shared by every row of one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationMeta {
    pub location_id: String,
}

impl LocationMeta {
    pub fn row(&self, attribute: &str, value: f64, data_source: &str, dl_timestamp: &str) -> AttributeRow {
        AttributeRow {
            location_id: self.location_id.clone(),
            attribute: attribute.to_string(),
            value,
            data_source: data_source.to_string(),
            dl_timestamp: dl_timestamp.to_string(),
        }
    }
}

/// Ordered collection of attribute rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AttributeTable {
    rows: Vec<AttributeRow>,
}

impl AttributeTable {
    pub fn new(rows: Vec<AttributeRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[AttributeRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<AttributeRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: AttributeRow) {
        self.rows.push(row);
    }

    pub fn extend(&mut self, other: AttributeTable) {
        self.rows.extend(other.rows);
    }

    pub fn location_ids(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.location_id.as_str()).collect()
    }

    /// Metadata of the single location this table describes.
    ///
    /// `Ok(None)` for an empty table; `InvariantViolation` when rows span
    /// more than one location.
    pub fn location_meta(&self) -> Result<Option<LocationMeta>> {
        let ids = self.location_ids();
        match ids.len() {
            0 => Ok(None),
            1 => Ok(ids.into_iter().next().map(|id| LocationMeta {
                location_id: id.to_string(),
            })),
            n => Err(TformError::InvariantViolation(format!(
                "expected rows for exactly one location, found {} ({})",
                n,
                ids.into_iter().collect::<Vec<_>>().join(",")
            ))),
        }
    }

    pub fn attributes(&self) -> HashSet<&str> {
        self.rows.iter().map(|r| r.attribute.as_str()).collect()
    }

    pub fn data_sources(&self) -> HashSet<&str> {
        self.rows.iter().map(|r| r.data_source.as_str()).collect()
    }

    /// Values of rows whose attribute is in `names`, in table order.
    pub fn values_for<'a>(&'a self, names: &'a [String]) -> impl Iterator<Item = f64> + 'a {
        self.rows
            .iter()
            .filter(move |r| names.iter().any(|n| *n == r.attribute))
            .map(|r| r.value)
    }

    /// Append `newer` and drop duplicates.
    ///
    /// Rows sharing (location, attribute, data_source) collapse to the one
    /// appended last, which also removes exact duplicates. A refreshed
    /// computation therefore replaces its stale copy while rows of any other
    /// provenance are kept in their original order.
    pub fn merge(self, newer: AttributeTable) -> AttributeTable {
        let mut all = self.rows;
        all.extend(newer.rows);

        let mut last_index: HashMap<(&str, &str, &str), usize> = HashMap::new();
        for (i, row) in all.iter().enumerate() {
            last_index.insert(row.provenance_key(), i);
        }
        let mut keep: Vec<usize> = last_index.into_values().collect();
        keep.sort_unstable();

        let rows = keep.into_iter().map(|i| all[i].clone()).collect();
        AttributeTable { rows }
    }
}

impl FromIterator<AttributeRow> for AttributeTable {
    fn from_iter<I: IntoIterator<Item = AttributeRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(loc: &str, attr: &str, value: f64, src: &str, ts: &str) -> AttributeRow {
        AttributeRow {
            location_id: loc.into(),
            attribute: attr.into(),
            value,
            data_source: src.into(),
            dl_timestamp: ts.into(),
        }
    }

    #[test]
    fn location_meta_requires_single_location() {
        assert_eq!(AttributeTable::default().location_meta().unwrap(), None);

        let one = AttributeTable::new(vec![
            row("101", "slope", 2.0, "usgs", "t0"),
            row("101", "elevation", 4.0, "usgs", "t0"),
        ]);
        assert_eq!(
            one.location_meta().unwrap(),
            Some(LocationMeta {
                location_id: "101".into()
            })
        );

        let two = AttributeTable::new(vec![
            row("101", "slope", 2.0, "usgs", "t0"),
            row("202", "slope", 1.0, "usgs", "t0"),
        ]);
        assert!(matches!(
            two.location_meta(),
            Err(TformError::InvariantViolation(_))
        ));
    }

    #[test]
    fn merge_drops_exact_duplicates() {
        let existing = AttributeTable::new(vec![row("1", "a", 1.0, "sum([x])", "t0")]);
        let merged = existing
            .clone()
            .merge(AttributeTable::new(vec![row("1", "a", 1.0, "sum([x])", "t0")]));
        assert_eq!(merged, existing);
    }

    #[test]
    fn merge_keeps_other_provenance() {
        let existing = AttributeTable::new(vec![
            row("1", "a", 1.0, "sum([x])", "t0"),
            row("1", "b", 5.0, "max([x,y])", "t0"),
        ]);
        let merged = existing.merge(AttributeTable::new(vec![row("1", "c", 3.0, "min([y])", "t1")]));
        let attrs: Vec<&str> = merged.rows().iter().map(|r| r.attribute.as_str()).collect();
        assert_eq!(attrs, vec!["a", "b", "c"]);
    }

    #[test]
    fn merge_replaces_same_provenance_with_newer_row() {
        let existing = AttributeTable::new(vec![
            row("1", "a", 1.0, "sum([x])", "t0"),
            row("1", "b", 5.0, "max([x,y])", "t0"),
        ]);
        let merged = existing.merge(AttributeTable::new(vec![row("1", "a", 2.0, "sum([x])", "t1")]));
        assert_eq!(
            merged.rows(),
            &[
                row("1", "b", 5.0, "max([x,y])", "t0"),
                row("1", "a", 2.0, "sum([x])", "t1"),
            ]
        );
    }

    #[test]
    fn nan_rows_dedup() {
        let t = AttributeTable::new(vec![row("1", "a", f64::NAN, "s", "t0")]);
        let merged = t.clone().merge(t);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn values_for_selects_in_table_order() {
        let t = AttributeTable::new(vec![
            row("1", "slope", 2.0, "s", "t"),
            row("1", "aspect", 9.0, "s", "t"),
            row("1", "elevation", 4.0, "s", "t"),
        ]);
        let names = vec!["elevation".to_string(), "slope".to_string()];
        assert_eq!(t.values_for(&names).collect::<Vec<_>>(), vec![2.0, 4.0]);
    }
}
