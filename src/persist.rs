//! Columnar persistence
//!
//! Named tables are written as Snappy-compressed Parquet files, one file
//! per table. Nulls are carried through as column nulls; per-column types
//! are inferred from the cell values with numeric promotion (all-integer
//! columns become Int64, mixed numeric becomes Float64, anything textual
//! becomes Utf8). A reader is provided so round-trips can be verified.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow2::array::{Array, Float64Array, Int64Array, Utf8Array};
use arrow2::chunk::Chunk;
use arrow2::datatypes::{DataType, Field, Schema};
use arrow2::io::parquet::read as parquet_read;
use arrow2::io::parquet::write::{
    transverse, CompressionOptions, Encoding, FileWriter, RowGroupIterator, Version, WriteOptions,
};
use tracing::info;

use crate::database::{Table, Value};
use crate::errors::{DlrError, Result};

const WRITE_OPTIONS: WriteOptions = WriteOptions {
    write_statistics: true,
    compression: CompressionOptions::Snappy,
    version: Version::V2,
    data_pagesize_limit: None,
};

/// Inferred storage type for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

fn infer_column_type(table: &Table, col: usize) -> ColumnType {
    let mut ty = ColumnType::Integer;
    for row in &table.rows {
        match row.get(col) {
            Some(Value::Null) | None => {}
            Some(Value::Integer(_)) => {}
            Some(Value::Real(_)) => {
                if ty == ColumnType::Integer {
                    ty = ColumnType::Real;
                }
            }
            Some(Value::Text(_)) => return ColumnType::Text,
        }
    }
    ty
}

fn build_column(table: &Table, col: usize, ty: ColumnType) -> Box<dyn Array> {
    match ty {
        ColumnType::Integer => {
            let values: Vec<Option<i64>> = table
                .rows
                .iter()
                .map(|r| match r.get(col) {
                    Some(Value::Integer(v)) => Some(*v),
                    _ => None,
                })
                .collect();
            Int64Array::from(values).boxed()
        }
        ColumnType::Real => {
            let values: Vec<Option<f64>> = table
                .rows
                .iter()
                .map(|r| match r.get(col) {
                    Some(Value::Integer(v)) => Some(*v as f64),
                    Some(Value::Real(v)) => Some(*v),
                    _ => None,
                })
                .collect();
            Float64Array::from(values).boxed()
        }
        ColumnType::Text => {
            let values: Vec<Option<String>> = table
                .rows
                .iter()
                .map(|r| match r.get(col) {
                    Some(Value::Null) | None => None,
                    Some(Value::Integer(v)) => Some(v.to_string()),
                    Some(Value::Real(v)) => Some(v.to_string()),
                    Some(Value::Text(s)) => Some(s.clone()),
                })
                .collect();
            Utf8Array::<i32>::from(values).boxed()
        }
    }
}

fn table_to_arrow(table: &Table) -> (Schema, Chunk<Box<dyn Array>>) {
    let mut fields = Vec::with_capacity(table.columns.len());
    let mut arrays: Vec<Box<dyn Array>> = Vec::with_capacity(table.columns.len());
    for (col, name) in table.columns.iter().enumerate() {
        let ty = infer_column_type(table, col);
        let data_type = match ty {
            ColumnType::Integer => DataType::Int64,
            ColumnType::Real => DataType::Float64,
            ColumnType::Text => DataType::Utf8,
        };
        fields.push(Field::new(name, data_type, true));
        arrays.push(build_column(table, col, ty));
    }
    (Schema::from(fields), Chunk::new(arrays))
}

/// Write one table to a Parquet file at `path`.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    let (schema, chunk) = table_to_arrow(table);

    let encodings: Vec<Vec<Encoding>> = schema
        .fields
        .iter()
        .map(|f| transverse(&f.data_type, |_| Encoding::Plain))
        .collect();
    let row_groups = RowGroupIterator::try_new(
        vec![Ok(chunk)].into_iter(),
        &schema,
        WRITE_OPTIONS,
        encodings,
    )?;

    let file = File::create(path)?;
    let mut writer = FileWriter::try_new(file, schema, WRITE_OPTIONS)?;
    for group in row_groups {
        writer.write(group?)?;
    }
    let _size = writer.end(None)?;

    info!(
        "wrote table '{}' ({} rows) to {}",
        table.name,
        table.len(),
        path.display()
    );
    Ok(())
}

/// Read a Parquet file back into a [`Table`] named `name`.
pub fn read_table(path: &Path, name: &str) -> Result<Table> {
    let mut file = File::open(path)?;
    let metadata = parquet_read::read_metadata(&mut file)?;
    let schema = parquet_read::infer_schema(&metadata)?;

    let columns: Vec<String> = schema.fields.iter().map(|f| f.name.clone()).collect();
    let mut table = Table::new(name, columns);

    let reader = parquet_read::FileReader::new(
        file,
        metadata.row_groups,
        schema.clone(),
        None,
        None,
        None,
    );
    for maybe_chunk in reader {
        let chunk = maybe_chunk?;
        append_chunk(&mut table, &schema, &chunk)?;
    }
    Ok(table)
}

fn append_chunk(table: &mut Table, schema: &Schema, chunk: &Chunk<Box<dyn Array>>) -> Result<()> {
    let n_rows = chunk.len();
    let mut columns: Vec<Vec<Value>> = Vec::with_capacity(schema.fields.len());

    for (field, array) in schema.fields.iter().zip(chunk.arrays()) {
        let values = match &field.data_type {
            DataType::Int64 => array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| column_mismatch(&field.name))?
                .iter()
                .map(|v| v.map_or(Value::Null, |v| Value::Integer(*v)))
                .collect(),
            DataType::Float64 => array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| column_mismatch(&field.name))?
                .iter()
                .map(|v| v.map_or(Value::Null, |v| Value::Real(*v)))
                .collect(),
            DataType::Utf8 => array
                .as_any()
                .downcast_ref::<Utf8Array<i32>>()
                .ok_or_else(|| column_mismatch(&field.name))?
                .iter()
                .map(|v| v.map_or(Value::Null, |s| Value::Text(s.to_string())))
                .collect(),
            other => {
                return Err(DlrError::Columnar(format!(
                    "unsupported column type {:?} in column '{}'",
                    other, field.name
                )))
            }
        };
        columns.push(values);
    }

    for row in 0..n_rows {
        table
            .rows
            .push(columns.iter().map(|c| c[row].clone()).collect());
    }
    Ok(())
}

fn column_mismatch(name: &str) -> DlrError {
    DlrError::Columnar(format!("column '{name}' does not match its declared type"))
}

/// Save a set of named tables under `dir`, one `<name>.parquet` file each.
pub fn save_tables(tables: &[Table], dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut paths = Vec::with_capacity(tables.len());
    for table in tables {
        let path = dir.join(format!("{}.parquet", table.name));
        write_table(table, &path)?;
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        let mut t = Table::new(
            "sample",
            vec![
                "id".to_string(),
                "score".to_string(),
                "label".to_string(),
                "mixed".to_string(),
            ],
        );
        t.rows.push(vec![
            Value::Integer(1),
            Value::Real(0.25),
            Value::Text("alpha".to_string()),
            Value::Integer(7),
        ]);
        t.rows.push(vec![
            Value::Integer(2),
            Value::Null,
            Value::Null,
            Value::Real(1.5),
        ]);
        t.rows.push(vec![
            Value::Null,
            Value::Real(9.0),
            Value::Text("gamma".to_string()),
            Value::Null,
        ]);
        t
    }

    #[test]
    fn test_column_type_inference() {
        let t = sample_table();
        assert_eq!(infer_column_type(&t, 0), ColumnType::Integer);
        assert_eq!(infer_column_type(&t, 1), ColumnType::Real);
        assert_eq!(infer_column_type(&t, 2), ColumnType::Text);
        // integer promoted to real by the mixed column
        assert_eq!(infer_column_type(&t, 3), ColumnType::Real);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.parquet");

        let original = sample_table();
        write_table(&original, &path).unwrap();
        let restored = read_table(&path, "sample").unwrap();

        assert_eq!(restored.columns, original.columns);
        assert_eq!(restored.len(), original.len());
        // nulls are preserved, integers in the mixed column come back as reals
        assert_eq!(restored.get(1, 1), Some(&Value::Null));
        assert_eq!(restored.get(0, 3), Some(&Value::Real(7.0)));
        assert_eq!(restored.get(0, 2), Some(&Value::Text("alpha".to_string())));
        assert_eq!(restored.get(0, 0), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_save_tables_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut other = sample_table();
        other.name = "other".to_string();

        let paths = save_tables(&[sample_table(), other], dir.path()).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(dir.path().join("sample.parquet").exists());
        assert!(dir.path().join("other.parquet").exists());
    }
}
