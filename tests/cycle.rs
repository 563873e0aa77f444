//! End-to-end load -> plan -> compute -> merge cycles against a temp store.

use catchment_tform::TformError;
use catchment_tform::model::{self, process_location};
use catchment_tform::spec::{FunctionRegistry, TransformConfig, TransformRegistry};
use catchment_tform::store::io::{read_table, write_table_atomic};
use catchment_tform::store::{
    AttrCategory, AttributeRow, AttributeTable, LocationAttributeStore, std_attr_path,
};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::path::Path;
use tempfile::TempDir;

const CONFIG: &str = r#"
transform_attrs:
  - '{tform_type}_attr':
      - tform_type: [mean, max]
      - vars: [slope, elevation]
  - 'TOT_SED_{tform_type}':
      - var_desc: 'total sediment'
      - tform_type: [np.sum]
      - vars: [TOT_SOLLER_810, TOT_SOLLER_811]
"#;

fn registry() -> TransformRegistry {
    let cfg = TransformConfig::from_yaml_str(CONFIG).unwrap();
    TransformRegistry::from_config(&cfg, &FunctionRegistry::with_builtins()).unwrap()
}

fn base_row(loc: &str, attr: &str, value: f64) -> AttributeRow {
    AttributeRow {
        location_id: loc.into(),
        attribute: attr.into(),
        value,
        data_source: "hydroatlas__v10".into(),
        dl_timestamp: "2024-05-01 12:00:00+00:00".into(),
    }
}

fn seed_base(dir: &Path, loc: &str, attrs: &[(&str, f64)]) {
    let rows = attrs.iter().map(|(a, v)| base_row(loc, a, *v)).collect();
    write_table_atomic(
        &std_attr_path(dir, loc, AttrCategory::Attr),
        &AttributeTable::new(rows),
    )
    .unwrap();
}

fn derived(store: &LocationAttributeStore, loc: &str) -> AttributeTable {
    read_table(&store.derived_path(loc)).unwrap()
}

fn value_of(table: &AttributeTable, attr: &str) -> f64 {
    table
        .rows()
        .iter()
        .find(|r| r.attribute == attr)
        .map(|r| r.value)
        .unwrap()
}

#[test]
fn second_run_changes_nothing() {
    let dir = TempDir::new().unwrap();
    seed_base(
        dir.path(),
        "1520007",
        &[("slope", 2.0), ("elevation", 4.0), ("TOT_SOLLER_810", 1.5), ("TOT_SOLLER_811", 2.5)],
    );
    let store = LocationAttributeStore::new(dir.path());
    let reg = registry();

    let first = process_location(&store, &reg, "1520007").unwrap();
    assert_eq!(first.computed, vec!["TOT_SED_np.sum", "max_attr", "mean_attr"]);
    assert!(first.skipped.is_empty());
    let after_first = derived(&store, "1520007");
    assert_eq!(after_first.len(), 3);
    assert_eq!(value_of(&after_first, "mean_attr"), 3.0);
    assert_eq!(value_of(&after_first, "max_attr"), 4.0);
    assert_eq!(value_of(&after_first, "TOT_SED_np.sum"), 4.0);

    let second = process_location(&store, &reg, "1520007").unwrap();
    assert!(second.computed.is_empty());
    assert_eq!(second.written, None);
    assert_eq!(derived(&store, "1520007"), after_first);
}

#[test]
fn derived_rows_have_unique_provenance() {
    let dir = TempDir::new().unwrap();
    seed_base(dir.path(), "9", &[("slope", 1.0), ("elevation", 3.0)]);
    let store = LocationAttributeStore::new(dir.path());
    let reg = registry();

    // Only mean/max are computable; repeat the cycle to stress the merge.
    for _ in 0..3 {
        process_location(&store, &reg, "9").unwrap();
    }

    let table = derived(&store, "9");
    let mut pairs = HashSet::new();
    for row in table.rows() {
        assert!(
            pairs.insert((row.attribute.clone(), row.data_source.clone())),
            "duplicate ({}, {})",
            row.attribute,
            row.data_source
        );
    }
    assert_eq!(pairs.len(), 2);
}

#[test]
fn merge_keeps_rows_of_other_provenance() {
    let dir = TempDir::new().unwrap();
    seed_base(dir.path(), "42", &[("slope", 2.0), ("elevation", 6.0)]);
    let store = LocationAttributeStore::new(dir.path());

    let legacy = AttributeRow {
        location_id: "42".into(),
        attribute: "legacy_attr".into(),
        value: 11.0,
        data_source: "median([slope])".into(),
        dl_timestamp: "2023-01-01 00:00:00+00:00".into(),
    };
    write_table_atomic(&store.derived_path("42"), &AttributeTable::new(vec![legacy.clone()])).unwrap();

    let outcome = process_location(&store, &registry(), "42").unwrap();
    assert_eq!(outcome.computed, vec!["max_attr", "mean_attr"]);

    let table = derived(&store, "42");
    assert_eq!(table.len(), 3);
    assert_eq!(table.rows()[0], legacy);
}

#[test]
fn missing_input_is_skipped_and_cache_untouched() {
    let dir = TempDir::new().unwrap();
    // No elevation and no sediment inputs: nothing is computable.
    seed_base(dir.path(), "77", &[("slope", 2.0)]);
    let store = LocationAttributeStore::new(dir.path());

    let existing = AttributeTable::new(vec![AttributeRow {
        location_id: "77".into(),
        attribute: "old_attr".into(),
        value: 1.0,
        data_source: "sum([slope])".into(),
        dl_timestamp: "2023-01-01 00:00:00+00:00".into(),
    }]);
    let path = store.derived_path("77");
    write_table_atomic(&path, &existing).unwrap();
    let bytes_before = std::fs::read(&path).unwrap();

    let outcome = process_location(&store, &registry(), "77").unwrap();
    assert!(outcome.computed.is_empty());
    assert_eq!(outcome.skipped.len(), 3);
    let mean = outcome.skipped.iter().find(|s| s.name == "mean_attr").unwrap();
    assert_eq!(mean.missing, vec!["elevation"]);

    assert_eq!(outcome.written, None);
    assert_eq!(std::fs::read(&path).unwrap(), bytes_before);
}

#[test]
fn partial_inputs_compute_what_they_can() {
    let dir = TempDir::new().unwrap();
    seed_base(dir.path(), "5", &[("TOT_SOLLER_810", 1.0), ("TOT_SOLLER_811", 2.0)]);
    let store = LocationAttributeStore::new(dir.path());
    let reg = registry();

    let first = process_location(&store, &reg, "5").unwrap();
    assert_eq!(first.computed, vec!["TOT_SED_np.sum"]);
    assert_eq!(first.skipped.len(), 2);

    // Inputs arrive later in a custom-dataset file; the next run fills the gap.
    write_table_atomic(
        &std_attr_path(dir.path(), "5", AttrCategory::CstmAttr),
        &AttributeTable::new(vec![base_row("5", "slope", 1.0), base_row("5", "elevation", 5.0)]),
    )
    .unwrap();

    let second = process_location(&store, &reg, "5").unwrap();
    assert_eq!(second.computed, vec!["max_attr", "mean_attr"]);
    assert_eq!(derived(&store, "5").len(), 3);
}

#[test]
fn csv_base_files_feed_the_cycle() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("comid_3_attr.csv"),
        "featureID,attribute,value,data_source,dl_timestamp\n\
         3,slope,2.0,usgs,2024-05-01 12:00:00+00:00\n\
         3,elevation,8.0,usgs,2024-05-01 12:00:00+00:00\n",
    )
    .unwrap();
    let store = LocationAttributeStore::new(dir.path());

    let outcome = process_location(&store, &registry(), "3").unwrap();
    assert_eq!(outcome.computed, vec!["max_attr", "mean_attr"]);
    assert_eq!(value_of(&derived(&store, "3"), "mean_attr"), 5.0);
}

#[test]
fn run_processes_locations_independently() {
    let dir = TempDir::new().unwrap();
    seed_base(dir.path(), "1", &[("slope", 1.0), ("elevation", 3.0)]);
    seed_base(dir.path(), "2", &[("slope", 10.0)]);
    let store = LocationAttributeStore::new(dir.path());
    let reg = registry();

    let ids: Vec<String> = ["1", "2", "3", "1"].iter().map(|s| s.to_string()).collect();
    let summary = model::run(&store, &reg, &ids, Some(2)).unwrap();

    assert_eq!(summary.locations.len(), 3);
    let by_id = |id: &str| summary.locations.iter().find(|o| o.location_id == id).unwrap();
    assert_eq!(by_id("1").computed.len(), 2);
    assert_eq!(by_id("2").computed.len(), 0);
    assert_eq!(by_id("2").skipped.len(), 3);
    assert!(!by_id("3").has_data);
    assert_eq!(summary.files_written(), 1);

    assert!(store.has_derived("1"));
    assert!(!store.has_derived("2"));
    let written = derived(&store, "1");
    assert_eq!(written.location_ids().into_iter().collect::<Vec<_>>(), vec!["1"]);

    let again = model::run(&store, &reg, &ids, None).unwrap();
    assert_eq!(again.computed_total(), 0);
    assert_eq!(again.files_written(), 0);
}

#[test]
fn unreadable_derived_file_is_left_in_place() {
    let dir = TempDir::new().unwrap();
    let store = LocationAttributeStore::new(dir.path());
    let path = store.derived_path("x");
    std::fs::write(&path, b"not a parquet file").unwrap();

    let rows = AttributeTable::new(vec![AttributeRow {
        location_id: "x".into(),
        attribute: "mean_attr".into(),
        value: 3.0,
        data_source: "mean([elevation,slope])".into(),
        dl_timestamp: "2024-05-01 12:00:00+00:00".into(),
    }]);
    let err = store.merge_and_persist("x", rows).unwrap_err();
    assert!(matches!(err, TformError::StoreIo { .. }), "{err}");

    assert_eq!(std::fs::read(&path).unwrap(), b"not a parquet file");
    let temps: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".tfrm-"))
        .collect();
    assert!(temps.is_empty(), "{temps:?}");
}
