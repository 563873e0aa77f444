//! Tabular file I/O for attribute tables.
//!
//! Reading accepts `.parquet` and `.csv`; writing always produces Parquet.
//!
//! Columns (long format):
//! featureID | attribute | value | data_source | dl_timestamp
//!
//! `comid` is accepted in place of `featureID`. Columns are cast on read, so a
//! numeric identifier column or a string-typed value column both decode.

use crate::error::{Result, TformError};
use crate::store::row::{AttributeRow, AttributeTable};
use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;
use std::sync::Arc;

pub const COL_LOCATION: &str = "featureID";
pub const COL_LOCATION_ALT: &str = "comid";
pub const COL_ATTRIBUTE: &str = "attribute";
pub const COL_VALUE: &str = "value";
pub const COL_DATA_SOURCE: &str = "data_source";
pub const COL_TIMESTAMP: &str = "dl_timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Parquet,
    Csv,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "parquet" => Some(Self::Parquet),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

fn attribute_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(COL_LOCATION, DataType::Utf8, false),
        Field::new(COL_ATTRIBUTE, DataType::Utf8, false),
        Field::new(COL_VALUE, DataType::Float64, true),
        Field::new(COL_DATA_SOURCE, DataType::Utf8, false),
        Field::new(COL_TIMESTAMP, DataType::Utf8, false),
    ]))
}

fn writer_properties() -> WriterProperties {
    let created_by = KeyValue {
        key: "created_by".to_string(),
        value: Some(env!("CARGO_PKG_NAME").to_string()),
    };
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![created_by]))
        .build()
}

/// Reject paths that still carry an unformatted `{placeholder}`.
fn check_formatted(path: &Path) -> Result<()> {
    if path.to_string_lossy().contains('{') {
        return Err(TformError::store_io(
            path,
            "path still contains template braces and needs formatting",
        ));
    }
    Ok(())
}

/// Read all record batches of a `.parquet` or `.csv` file.
pub fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    check_formatted(path)?;
    let format = TableFormat::from_path(path).ok_or_else(|| {
        TformError::store_io(path, "expected a .csv or .parquet file")
    })?;
    let io_err = |e: &dyn std::fmt::Display| TformError::store_io(path, e);

    let mut file = File::open(path).map_err(|e| io_err(&e))?;
    let mut batches = Vec::new();

    match format {
        TableFormat::Parquet => {
            let reader = ParquetRecordBatchReaderBuilder::try_new(file)
                .map_err(|e| io_err(&format!("parquet reader init failed: {e}")))?
                .build()
                .map_err(|e| io_err(&format!("parquet reader build failed: {e}")))?;
            for batch in reader {
                batches.push(batch.map_err(|e| io_err(&format!("parquet read batch failed: {e}")))?);
            }
        }
        TableFormat::Csv => {
            let csv_format = Format::default().with_header(true);
            let (header, _) = csv_format
                .infer_schema(&mut file, Some(0))
                .map_err(|e| io_err(&format!("csv header read failed: {e}")))?;
            file.rewind().map_err(|e| io_err(&e))?;

            // Every column is read as text; `value` is cast later, so a stray
            // `NA` or a decimal after integer rows cannot fail the file.
            let schema = Schema::new(
                header
                    .fields()
                    .iter()
                    .map(|f| Field::new(f.name(), DataType::Utf8, true))
                    .collect::<Vec<_>>(),
            );

            let reader = ReaderBuilder::new(Arc::new(schema))
                .with_format(csv_format)
                .build(file)
                .map_err(|e| io_err(&format!("csv reader init failed: {e}")))?;
            for batch in reader {
                batches.push(batch.map_err(|e| io_err(&format!("csv read batch failed: {e}")))?);
            }
        }
    }

    Ok(batches)
}

fn find_column<'a>(batch: &'a RecordBatch, names: &[&str]) -> Option<&'a ArrayRef> {
    names
        .iter()
        .find_map(|name| batch.schema().index_of(name).ok())
        .map(|idx| batch.column(idx))
}

fn as_strings(path: &Path, column: &ArrayRef, name: &str) -> Result<StringArray> {
    let casted = cast(column, &DataType::Utf8)
        .map_err(|e| TformError::store_io(path, format!("column '{name}' not castable to string: {e}")))?;
    casted
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| TformError::store_io(path, format!("column '{name}' is not StringArray")))
}

/// Text that does not parse as a number becomes null.
fn as_floats(path: &Path, column: &ArrayRef, name: &str) -> Result<Float64Array> {
    let casted = cast(column, &DataType::Float64)
        .map_err(|e| TformError::store_io(path, format!("column '{name}' not castable to float: {e}")))?;
    casted
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| TformError::store_io(path, format!("column '{name}' is not Float64Array")))
}

fn required_strings(path: &Path, batch: &RecordBatch, names: &[&str]) -> Result<StringArray> {
    let column = find_column(batch, names).ok_or_else(|| {
        TformError::store_io(path, format!("missing column '{}'", names.join("' or '")))
    })?;
    as_strings(path, column, names[0])
}

/// Returns None if the column doesn't exist.
fn optional_strings(path: &Path, batch: &RecordBatch, name: &str) -> Result<Option<StringArray>> {
    find_column(batch, &[name])
        .map(|column| as_strings(path, column, name))
        .transpose()
}

fn string_at(col: &StringArray, row: usize) -> String {
    if col.is_null(row) {
        String::new()
    } else {
        col.value(row).to_string()
    }
}

fn rows_from_batch(path: &Path, batch: &RecordBatch, out: &mut AttributeTable) -> Result<()> {
    let location = required_strings(path, batch, &[COL_LOCATION, COL_LOCATION_ALT])?;
    let attribute = required_strings(path, batch, &[COL_ATTRIBUTE])?;
    let value_col = find_column(batch, &[COL_VALUE])
        .ok_or_else(|| TformError::store_io(path, format!("missing column '{COL_VALUE}'")))?;
    let value = as_floats(path, value_col, COL_VALUE)?;
    let data_source = optional_strings(path, batch, COL_DATA_SOURCE)?;
    let dl_timestamp = optional_strings(path, batch, COL_TIMESTAMP)?;

    for row in 0..batch.num_rows() {
        if location.is_null(row) || attribute.is_null(row) {
            return Err(TformError::store_io(
                path,
                format!("row {row} has a null location or attribute"),
            ));
        }
        out.push(AttributeRow {
            location_id: location.value(row).to_string(),
            attribute: attribute.value(row).to_string(),
            value: if value.is_null(row) { f64::NAN } else { value.value(row) },
            data_source: data_source.as_ref().map(|c| string_at(c, row)).unwrap_or_default(),
            dl_timestamp: dl_timestamp.as_ref().map(|c| string_at(c, row)).unwrap_or_default(),
        });
    }
    Ok(())
}

/// Read a long-format attribute file.
pub fn read_table(path: &Path) -> Result<AttributeTable> {
    let mut table = AttributeTable::default();
    for batch in read_batches(path)? {
        rows_from_batch(path, &batch, &mut table)?;
    }
    Ok(table)
}

/// Read location identifiers from a listing file (e.g. the metadata table
/// written by the attribute-grabbing workflow). Order is kept, nulls skipped.
pub fn read_location_ids(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for batch in read_batches(path)? {
        let col = required_strings(path, &batch, &[column])?;
        ids.extend(col.iter().flatten().map(str::to_string));
    }
    if ids.is_empty() {
        return Err(TformError::store_io(
            path,
            format!("no location identifiers found in column '{column}'"),
        ));
    }
    Ok(ids)
}

fn table_to_batch(table: &AttributeTable) -> Result<RecordBatch, arrow::error::ArrowError> {
    let rows = table.rows();
    let location = StringArray::from(rows.iter().map(|r| r.location_id.as_str()).collect::<Vec<_>>());
    let attribute = StringArray::from(rows.iter().map(|r| r.attribute.as_str()).collect::<Vec<_>>());
    let value = Float64Array::from(rows.iter().map(|r| r.value).collect::<Vec<_>>());
    let data_source = StringArray::from(rows.iter().map(|r| r.data_source.as_str()).collect::<Vec<_>>());
    let dl_timestamp = StringArray::from(rows.iter().map(|r| r.dl_timestamp.as_str()).collect::<Vec<_>>());

    RecordBatch::try_new(
        attribute_schema(),
        vec![
            Arc::new(location) as ArrayRef,
            Arc::new(attribute),
            Arc::new(value),
            Arc::new(data_source),
            Arc::new(dl_timestamp),
        ],
    )
}

/// Serialize `table` as Parquet into `writer`.
pub fn write_parquet<W: Write + Send>(path: &Path, table: &AttributeTable, writer: W) -> Result<()> {
    let batch = table_to_batch(table)
        .map_err(|e| TformError::store_io(path, format!("record batch build failed: {e}")))?;

    let mut writer = ArrowWriter::try_new(writer, attribute_schema(), Some(writer_properties()))
        .map_err(|e| TformError::store_io(path, format!("parquet writer init failed: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| TformError::store_io(path, format!("parquet write failed: {e}")))?;
    writer
        .close()
        .map_err(|e| TformError::store_io(path, format!("parquet close failed: {e}")))?;
    Ok(())
}

/// Write `table` to `path` through a sibling temp file and an atomic rename,
/// so readers never observe a partially written destination.
pub fn write_table_atomic(path: &Path, table: &AttributeTable) -> Result<()> {
    check_formatted(path)?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::Builder::new()
        .prefix(".tfrm-")
        .suffix(".parquet.tmp")
        .tempfile_in(dir)
        .map_err(|e| TformError::store_io(dir, e))?;

    write_parquet(path, table, tmp.as_file_mut())?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| TformError::store_io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| TformError::store_io(path, e.error))?;
    Ok(())
}
