//! Error taxonomy for the transformation engine.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = TformError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TformError {
    /// Configuration is missing required keys or carries a bad template.
    #[error("malformed transform spec '{template}': {reason}")]
    MalformedSpec { template: String, reason: String },

    /// A function identifier has no registered callable.
    #[error("unresolved function '{identifier}': {reason}")]
    UnresolvedFunction { identifier: String, reason: String },

    /// A per-location operation received rows for several locations.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Source attributes required by a definition are absent for a location.
    #[error(
        "cannot compute '{definition}' for location {location_id}: missing source attributes [{}]",
        .missing.join(",")
    )]
    EmptySelection {
        location_id: String,
        definition: String,
        missing: Vec<String>,
    },

    #[error("store i/o error at {}: {message}", .path.display())]
    StoreIo { path: PathBuf, message: String },

    #[error("config decode error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl TformError {
    pub(crate) fn store_io(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::StoreIo {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn malformed(template: &str, reason: impl Into<String>) -> Self {
        Self::MalformedSpec {
            template: template.to_string(),
            reason: reason.into(),
        }
    }

    /// Only a missing-input failure may be retried on a later run; every
    /// other variant aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::EmptySelection { .. })
    }
}
