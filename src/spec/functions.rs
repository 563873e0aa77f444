//! Function registry: resolves textual identifiers to aggregation callables.
//!
//! Identifiers take one of two shapes:
//! - bare:       `sum`, `max`, `mean`
//! - namespaced: `np.mean`, `numpy.nanmax`
//!
//! Namespaced identifiers split at the last `.`; the namespace must be
//! registered and must contain the bare name. Nothing is ever evaluated
//! dynamically: every callable comes from this table.

use crate::error::{Result, TformError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Aggregation over the `value` column of the selected rows.
pub type AggregateFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    bare: BTreeMap<String, AggregateFn>,
    namespaces: BTreeMap<String, BTreeMap<String, AggregateFn>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("bare", &self.bare.keys().collect::<Vec<_>>())
            .field("namespaces", &self.namespaces.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionRegistry {
    /// Registry with no functions at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in statistics.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();

        reg.register("sum", sum);
        reg.register("max", max);
        reg.register("min", min);
        reg.register("len", len);
        reg.register("mean", mean);
        reg.register("median", median);

        for ns in ["np", "numpy"] {
            reg.register_in(ns, "mean", mean);
            reg.register_in(ns, "median", median);
            reg.register_in(ns, "sum", sum);
            reg.register_in(ns, "max", max);
            reg.register_in(ns, "amax", max);
            reg.register_in(ns, "min", min);
            reg.register_in(ns, "amin", min);
            reg.register_in(ns, "std", std_dev);
            reg.register_in(ns, "var", variance);
            reg.register_in(ns, "prod", prod);
            reg.register_in(ns, "ptp", ptp);
            reg.register_in(ns, "nanmean", skip_nan(mean));
            reg.register_in(ns, "nansum", skip_nan(sum));
            reg.register_in(ns, "nanmax", skip_nan(max));
            reg.register_in(ns, "nanmin", skip_nan(min));
            reg.register_in(ns, "nanmedian", skip_nan(median));
            reg.register_in(ns, "nanstd", skip_nan(std_dev));
            reg.register_in(ns, "nanvar", skip_nan(variance));
        }

        reg
    }

    /// Register (or replace) a bare identifier.
    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        self.bare.insert(name.to_string(), Arc::new(f));
        self
    }

    /// Register (or replace) `name` inside `namespace`, creating the namespace if needed.
    pub fn register_in<F>(&mut self, namespace: &str, name: &str, f: F) -> &mut Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn resolve(&self, identifier: &str) -> Result<AggregateFn> {
        let identifier = identifier.trim();
        let unresolved = |reason: String| TformError::UnresolvedFunction {
            identifier: identifier.to_string(),
            reason,
        };

        match identifier.rsplit_once('.') {
            Some((namespace, name)) => {
                let funcs = self
                    .namespaces
                    .get(namespace)
                    .ok_or_else(|| unresolved(format!("unknown namespace '{namespace}'")))?;
                funcs
                    .get(name)
                    .cloned()
                    .ok_or_else(|| unresolved(format!("'{namespace}' has no function '{name}'")))
            }
            None => self
                .bare
                .get(identifier)
                .cloned()
                .ok_or_else(|| unresolved("no built-in function by that name".to_string())),
        }
    }

    /// Every resolvable identifier, bare names first, then `namespace.name`.
    pub fn identifiers(&self) -> Vec<String> {
        let mut out: Vec<String> = self.bare.keys().cloned().collect();
        for (ns, funcs) in &self.namespaces {
            out.extend(funcs.keys().map(|name| format!("{ns}.{name}")));
        }
        out
    }
}

fn skip_nan(f: fn(&[f64]) -> f64) -> impl Fn(&[f64]) -> f64 + Send + Sync + 'static {
    move |values: &[f64]| {
        let kept: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        f(&kept)
    }
}

fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

fn prod(values: &[f64]) -> f64 {
    values.iter().product()
}

fn len(values: &[f64]) -> f64 {
    values.len() as f64
}

fn max(values: &[f64]) -> f64 {
    if values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    values.iter().copied().fold(f64::NAN, f64::max)
}

fn min(values: &[f64]) -> f64 {
    if values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    values.iter().copied().fold(f64::NAN, f64::min)
}

fn ptp(values: &[f64]) -> f64 {
    max(values) - min(values)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    sum(values) / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Population variance (ddof = 0).
fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.is_nan() {
        return f64::NAN;
    }
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}
