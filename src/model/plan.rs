//! Work planning: which registry definitions a location still lacks.

use crate::error::Result;
use crate::spec::{DerivedAttribute, TransformRegistry};
use crate::store::AttributeTable;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkPlan {
    pub missing_names: BTreeSet<String>,
    pub missing_provenance_tags: BTreeSet<String>,
}

impl WorkPlan {
    pub fn is_empty(&self) -> bool {
        self.missing_names.is_empty()
    }

    /// Missing definitions in registry (name) order.
    pub fn definitions<'r>(
        &'r self,
        registry: &'r TransformRegistry,
    ) -> impl Iterator<Item = &'r DerivedAttribute> + 'r {
        registry
            .iter()
            .filter(|d| self.missing_names.contains(&d.name))
    }
}

/// Diff `existing` against `registry`.
///
/// A definition counts as done when its name appears among the `attribute`
/// values or its provenance tag appears among the `data_source` values, so a
/// renamed but equivalent computation is still recognized.
pub fn plan(existing: &AttributeTable, registry: &TransformRegistry) -> Result<WorkPlan> {
    // Fails with InvariantViolation for mixed-location input.
    existing.location_meta()?;

    let have_names = existing.attributes();
    let have_sources = existing.data_sources();

    let mut out = WorkPlan::default();
    for def in registry.iter() {
        let done = have_names.contains(def.name.as_str())
            || have_sources.contains(def.provenance.as_str());
        if !done {
            out.missing_names.insert(def.name.clone());
            out.missing_provenance_tags.insert(def.provenance.clone());
        }
    }
    Ok(out)
}
