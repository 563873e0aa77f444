//! Spec layer: YAML transform configuration and the derived-attribute registry.
//!
//! This module owns:
//! - config decoding (templates, function identifiers, source variables)
//! - the function registry (identifier -> callable)
//! - expansion into the run-wide `TransformRegistry`

pub mod config;
pub mod expand;
pub mod functions;
pub mod template;

pub use config::{FileIoFields, TransformConfig, TransformSpec};
pub use expand::{DerivedAttribute, TransformRegistry, provenance_tag};
pub use functions::{AggregateFn, FunctionRegistry};
