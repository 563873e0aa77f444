//! Per-location attribute store rooted at one directory.
//!
//! Layout: `comid_{location_id}_{category}.parquet`, category one of `attr`,
//! `tfrmattr`, `cstmattr`. Files may sit in nested directories; a location's
//! rows are the union of every file whose name contains `_{location_id}_`.
//! Only the `tfrmattr` file is ever written here.

use crate::error::{Result, TformError};
use crate::store::io::{self, TableFormat};
use crate::store::row::AttributeTable;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrCategory {
    /// Base attribute acquired by the upstream attribute-grabbing workflow.
    Attr,
    /// Attribute derived by this engine.
    TfrmAttr,
    /// Attribute from a custom dataset.
    CstmAttr,
}

impl AttrCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attr => "attr",
            Self::TfrmAttr => "tfrmattr",
            Self::CstmAttr => "cstmattr",
        }
    }
}

impl fmt::Display for AttrCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn std_attr_path(dir: &Path, location_id: &str, category: AttrCategory) -> PathBuf {
    dir.join(format!("comid_{location_id}_{category}.parquet"))
}

/// Filename fragment that identifies one location's files.
pub fn location_fragment(location_id: &str) -> String {
    format!("_{location_id}_")
}

/// Recursively list readable table files under `dir` whose name contains
/// `fragment`, in file-name order.
///
/// A missing or unreadable `dir` is a store error; an unreadable entry below
/// it is skipped with a warning.
pub fn discover(dir: &Path, fragment: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(TformError::store_io(dir, e)),
            Err(e) => {
                warn!("skipping unreadable entry under {}: {}", dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name_matches = entry.file_name().to_string_lossy().contains(fragment);
        if name_matches && TableFormat::from_path(entry.path()).is_some() {
            found.push(entry.into_path());
        }
    }

    Ok(found)
}

#[derive(Debug, Clone)]
pub struct LocationAttributeStore {
    dir: PathBuf,
}

impl LocationAttributeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files_for(&self, location_id: &str) -> Result<Vec<PathBuf>> {
        discover(&self.dir, &location_fragment(location_id))
    }

    /// Union of every file belonging to `location_id`; `None` when it has none.
    ///
    /// Files of other locations are never opened.
    pub fn load(&self, location_id: &str) -> Result<Option<AttributeTable>> {
        let files = self.files_for(location_id)?;
        if files.is_empty() {
            debug!("no attribute files for location {}", location_id);
            return Ok(None);
        }

        let mut table = AttributeTable::default();
        for path in &files {
            debug!("reading {}", path.display());
            table.extend(io::read_table(path)?);
        }
        Ok(Some(table))
    }

    pub fn exists(&self, location_id: &str) -> Result<bool> {
        Ok(!self.files_for(location_id)?.is_empty())
    }

    pub fn derived_path(&self, location_id: &str) -> PathBuf {
        std_attr_path(&self.dir, location_id, AttrCategory::TfrmAttr)
    }

    pub fn has_derived(&self, location_id: &str) -> bool {
        self.derived_path(location_id).is_file()
    }

    /// Merge `new_rows` into the location's derived file and return the result.
    ///
    /// With no prior file, `new_rows` becomes the file. Otherwise the existing
    /// rows and `new_rows` are merged in memory (see [`AttributeTable::merge`])
    /// and the file is replaced atomically. Nothing is written when `new_rows`
    /// is empty; the current derived table is returned unchanged.
    pub fn merge_and_persist(&self, location_id: &str, new_rows: AttributeTable) -> Result<AttributeTable> {
        if let Some(stray) = new_rows.rows().iter().find(|r| r.location_id != location_id) {
            return Err(TformError::InvariantViolation(format!(
                "row for location {} passed to merge for location {}",
                stray.location_id, location_id
            )));
        }

        let path = self.derived_path(location_id);
        let existing = if path.is_file() {
            Some(io::read_table(&path)?)
        } else {
            None
        };

        if new_rows.is_empty() {
            return Ok(existing.unwrap_or_default());
        }

        let merged = match existing {
            Some(existing) => {
                info!("Updating {}", path.display());
                existing.merge(new_rows)
            }
            None => {
                info!("Writing {}", path.display());
                AttributeTable::default().merge(new_rows)
            }
        };

        io::write_table_atomic(&path, &merged)?;
        Ok(merged)
    }
}
