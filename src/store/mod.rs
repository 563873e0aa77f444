//! Attribute store: long-format rows, tabular file I/O and per-location files.

pub mod io;
pub mod location;
pub mod row;

pub use location::{AttrCategory, LocationAttributeStore, discover, std_attr_path};
pub use row::{AttributeRow, AttributeTable, LocationMeta};
