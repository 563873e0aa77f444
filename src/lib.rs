//! Derived catchment attributes: resolve a transform configuration into
//! aggregation definitions, compute only what each location's cache lacks,
//! and merge the results back into per-location Parquet files.

pub mod diagnostics;
pub mod error;
pub mod model;
pub mod spec;
pub mod store;

pub use error::{Result, TformError};
pub use model::{LocationOutcome, RunSummary, WorkPlan, process_location, run};
pub use spec::{FunctionRegistry, TransformConfig, TransformRegistry};
pub use store::{AttributeRow, AttributeTable, LocationAttributeStore};
