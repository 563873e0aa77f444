//! Transform configuration (YAML) decoded into typed records.
//!
//! YAML shape:
//! ```yaml
//! file_io:                          # optional
//!   - dir_db_attrs: /data/attrs
//!   - path_comids: /data/meta/comids.csv
//! transform_attrs:
//!   - 'TOT_PROGLACIAL_SED_{tform_type}':
//!       - tform_type: [np.mean]
//!       - var_desc: 'Mean proglacial sediment'
//!       - vars:
//!           - TOT_SOLLER_810
//!           - TOT_SOLLER_811
//! ```
//!
//! Each template maps either to a list of single-key sub-mappings (shown above)
//! or to one mapping carrying the keys directly. Both decode into the same
//! [`TransformSpec`] record, so callers never search sub-mappings by position.

use crate::error::{Result, TformError};
use serde::Deserialize;
use serde_yaml::Mapping;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub file_io: Option<Parts<FileIoFields>>,

    /// Template -> fields, decoded lazily so templates keep their file order.
    #[serde(default)]
    pub transform_attrs: Vec<Mapping>,
}

/// A record written either as one mapping or as a list of partial mappings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Parts<T> {
    // Original shape: - tform_type: [...]
    //                 - vars: [...]
    List(Vec<T>),
    // Flat shape: { tform_type: [...], vars: [...] }
    Record(T),
}

/// Fields that may appear under a name template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransformFields {
    #[serde(default)]
    pub tform_type: Option<Vec<String>>,

    #[serde(default)]
    pub vars: Option<Vec<String>>,

    #[serde(default)]
    pub var_desc: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileIoFields {
    #[serde(default)]
    pub dir_db_attrs: Option<PathBuf>,

    #[serde(default)]
    pub path_comids: Option<PathBuf>,

    #[serde(default)]
    pub loc_id_col: Option<String>,
}

/// Merge partial records, first occurrence of each key wins.
pub trait MergeFirst: Default {
    fn merge_first(self, later: Self) -> Self;
}

impl MergeFirst for TransformFields {
    fn merge_first(self, later: Self) -> Self {
        Self {
            tform_type: self.tform_type.or(later.tform_type),
            vars: self.vars.or(later.vars),
            var_desc: self.var_desc.or(later.var_desc),
        }
    }
}

impl MergeFirst for FileIoFields {
    fn merge_first(self, later: Self) -> Self {
        Self {
            dir_db_attrs: self.dir_db_attrs.or(later.dir_db_attrs),
            path_comids: self.path_comids.or(later.path_comids),
            loc_id_col: self.loc_id_col.or(later.loc_id_col),
        }
    }
}

impl<T: MergeFirst + Clone> Parts<T> {
    pub fn flatten(&self) -> T {
        match self {
            Parts::Record(t) => t.clone(),
            Parts::List(items) => items
                .iter()
                .cloned()
                .fold(T::default(), |acc, part| acc.merge_first(part)),
        }
    }
}

/// One validated configuration entry: a template with its functions and inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSpec {
    pub name_template: String,
    pub function_identifiers: Vec<String>,
    pub source_variables: Vec<String>,
    pub description: Option<String>,
}

impl TransformConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TformError::store_io(path, e))?;
        Self::from_yaml_str(&text)
    }

    pub fn file_io(&self) -> FileIoFields {
        self.file_io.as_ref().map(Parts::flatten).unwrap_or_default()
    }

    /// Flatten every template entry, in file order.
    ///
    /// Fails with `MalformedSpec` when an entry lacks `tform_type` or `vars`,
    /// or when either list is empty.
    pub fn transform_specs(&self) -> Result<Vec<TransformSpec>> {
        let mut out = Vec::new();
        for item in &self.transform_attrs {
            for (key, value) in item {
                let template = key.as_str().ok_or_else(|| {
                    TformError::malformed(&format!("{key:?}"), "template is not a string")
                })?;
                let parts: Parts<TransformFields> = serde_yaml::from_value(value.clone())?;
                let fields = parts.flatten();

                let function_identifiers = fields
                    .tform_type
                    .ok_or_else(|| TformError::malformed(template, "missing 'tform_type'"))?;
                let source_variables = fields
                    .vars
                    .ok_or_else(|| TformError::malformed(template, "missing 'vars'"))?;

                if function_identifiers.is_empty() {
                    return Err(TformError::malformed(template, "'tform_type' is empty"));
                }
                if source_variables.is_empty() {
                    return Err(TformError::malformed(template, "'vars' is empty"));
                }

                out.push(TransformSpec {
                    name_template: template.to_string(),
                    function_identifiers,
                    source_variables,
                    description: fields.var_desc,
                });
            }
        }
        Ok(out)
    }
}
