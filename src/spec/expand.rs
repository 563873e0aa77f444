//! Expansion of transform specs into the run-wide registry of derived attributes.

use crate::error::Result;
use crate::spec::config::{TransformConfig, TransformSpec};
use crate::spec::functions::{AggregateFn, FunctionRegistry};
use crate::spec::template;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// One template rendered for one function identifier.
#[derive(Clone)]
pub struct DerivedAttribute {
    pub name: String,
    pub function_identifier: String,
    pub source_variables: Vec<String>,
    pub provenance: String,
    pub description: Option<String>,
    pub callable: AggregateFn,
}

impl fmt::Debug for DerivedAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedAttribute")
            .field("name", &self.name)
            .field("function_identifier", &self.function_identifier)
            .field("source_variables", &self.source_variables)
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

/// Canonical `data_source` value for a derived attribute: `func([a,b,c])`
/// with the inputs sorted.
pub fn provenance_tag(function_identifier: &str, source_variables: &[String]) -> String {
    let mut sorted: Vec<&str> = source_variables.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("{}([{}])", function_identifier, sorted.join(","))
}

/// Immutable registry keyed by derived-attribute name. Built once per run.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    definitions: BTreeMap<String, DerivedAttribute>,
}

impl TransformRegistry {
    pub fn from_config(config: &TransformConfig, functions: &FunctionRegistry) -> Result<Self> {
        Self::from_specs(&config.transform_specs()?, functions)
    }

    /// Each spec with k function identifiers yields k definitions. A name seen
    /// twice keeps the later definition.
    pub fn from_specs(specs: &[TransformSpec], functions: &FunctionRegistry) -> Result<Self> {
        let mut definitions = BTreeMap::new();

        for spec in specs {
            for identifier in &spec.function_identifiers {
                let callable = functions.resolve(identifier)?;
                let name = template::render(&spec.name_template, identifier)?;
                let provenance = provenance_tag(identifier, &spec.source_variables);

                let def = DerivedAttribute {
                    name: name.clone(),
                    function_identifier: identifier.clone(),
                    source_variables: spec.source_variables.clone(),
                    provenance,
                    description: spec.description.clone(),
                    callable,
                };

                if let Some(prev) = definitions.insert(name.clone(), def) {
                    warn!(
                        "derived attribute '{}' defined more than once; '{}' replaces '{}'",
                        name, identifier, prev.provenance
                    );
                }
            }
        }

        debug!("expanded {} derived attribute definitions", definitions.len());
        Ok(Self { definitions })
    }

    pub fn get(&self, name: &str) -> Option<&DerivedAttribute> {
        self.definitions.get(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &DerivedAttribute> {
        self.definitions.values()
    }

    pub fn source_variables(&self) -> BTreeMap<&str, &[String]> {
        self.iter()
            .map(|d| (d.name.as_str(), d.source_variables.as_slice()))
            .collect()
    }

    pub fn provenance_tags(&self) -> BTreeMap<&str, &str> {
        self.iter()
            .map(|d| (d.name.as_str(), d.provenance.as_str()))
            .collect()
    }

    pub fn function_identifiers(&self) -> BTreeMap<&str, &str> {
        self.iter()
            .map(|d| (d.name.as_str(), d.function_identifier.as_str()))
            .collect()
    }
}
