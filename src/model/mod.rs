//! Per-location cycle (load -> plan -> compute -> merge) and multi-location runs.

pub mod aggregate;
pub mod plan;

pub use aggregate::{compute, compute_at};
pub use plan::{WorkPlan, plan};

use crate::error::{Result, TformError};
use crate::spec::TransformRegistry;
use crate::store::{AttributeTable, LocationAttributeStore};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDefinition {
    pub name: String,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationOutcome {
    pub location_id: String,
    /// False when the store holds no files for this location.
    pub has_data: bool,
    pub computed: Vec<String>,
    pub skipped: Vec<SkippedDefinition>,
    /// Derived file written during this cycle, if any.
    pub written: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub locations: Vec<LocationOutcome>,
}

impl RunSummary {
    pub fn computed_total(&self) -> usize {
        self.locations.iter().map(|o| o.computed.len()).sum()
    }

    pub fn skipped_total(&self) -> usize {
        self.locations.iter().map(|o| o.skipped.len()).sum()
    }

    pub fn files_written(&self) -> usize {
        self.locations.iter().filter(|o| o.written.is_some()).count()
    }
}

/// Plan one location without computing or writing anything.
pub fn plan_location(
    store: &LocationAttributeStore,
    registry: &TransformRegistry,
    location_id: &str,
) -> Result<WorkPlan> {
    let existing = store.load(location_id)?.unwrap_or_default();
    plan(&existing, registry)
}

/// Run the full cycle for one location.
///
/// Definitions whose inputs are absent are skipped and reported; every other
/// error aborts the location before its derived file is touched.
pub fn process_location(
    store: &LocationAttributeStore,
    registry: &TransformRegistry,
    location_id: &str,
) -> Result<LocationOutcome> {
    let mut outcome = LocationOutcome {
        location_id: location_id.to_string(),
        ..Default::default()
    };

    let Some(existing) = store.load(location_id)? else {
        warn!("no attribute files found for location {}", location_id);
        return Ok(outcome);
    };
    outcome.has_data = true;

    let work = plan(&existing, registry)?;
    if work.is_empty() {
        debug!("location {}: all {} derived attributes cached", location_id, registry.len());
        return Ok(outcome);
    }
    debug!(
        "location {}: {} derived attributes missing",
        location_id,
        work.missing_names.len()
    );

    // Definitions only read base rows, so they can be computed independently.
    let defs: Vec<_> = work.definitions(registry).collect();
    let results: Vec<_> = defs
        .par_iter()
        .map(|def| (*def, compute(&existing, def)))
        .collect();

    let mut new_rows = AttributeTable::default();
    for (def, result) in results {
        match result {
            Ok(row) => {
                outcome.computed.push(def.name.clone());
                new_rows.push(row);
            }
            Err(TformError::EmptySelection { missing, .. }) => {
                warn!(
                    "location {}: skipping '{}', missing source attributes [{}]",
                    location_id,
                    def.name,
                    missing.join(",")
                );
                outcome.skipped.push(SkippedDefinition {
                    name: def.name.clone(),
                    missing,
                });
            }
            Err(e) => return Err(e),
        }
    }

    if !new_rows.is_empty() {
        store.merge_and_persist(location_id, new_rows)?;
        outcome.written = Some(store.derived_path(location_id));
    }

    Ok(outcome)
}

/// Process every location on a worker pool of `jobs` threads (rayon's
/// default when `None`). Repeated ids are processed once, so each derived
/// file has a single writer.
pub fn run(
    store: &LocationAttributeStore,
    registry: &TransformRegistry,
    location_ids: &[String],
    jobs: Option<usize>,
) -> Result<RunSummary> {
    let mut seen = HashSet::new();
    let unique: Vec<&str> = location_ids
        .iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect();

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = jobs {
        builder = builder.num_threads(n);
    }
    let pool = builder.build()?;

    let locations = pool.install(|| {
        unique
            .par_iter()
            .map(|id| process_location(store, registry, id))
            .collect::<Result<Vec<_>>>()
    })?;

    Ok(RunSummary { locations })
}
