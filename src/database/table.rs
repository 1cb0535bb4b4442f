//! Generic tabular result set
//!
//! Query results that do not map onto one of the typed record structs
//! (arbitrary SQL, the answer tables) are carried as a [`Table`]: named
//! columns over rows of dynamically typed [`Value`]s. This is also the
//! shape handed to the columnar writer.

use serde::Serialize;

use crate::errors::{DlrError, Result};

/// A single cell value.
///
/// BLOB columns are converted to text at the fetch boundary; the survey
/// database only stores free-text responses in them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<rusqlite::types::ValueRef<'_>> for Value {
    fn from(v: rusqlite::types::ValueRef<'_>) -> Self {
        use rusqlite::types::ValueRef;
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Text(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A named, in-memory result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Table {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row. The row must match the column count.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(DlrError::Consistency(format!(
                "row with {} values pushed onto table '{}' with {} columns",
                row.len(),
                self.name,
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn set(&mut self, row: usize, col: usize, value: Value) -> Result<()> {
        let name = self.name.clone();
        let cell = self
            .rows
            .get_mut(row)
            .and_then(|r| r.get_mut(col))
            .ok_or_else(|| {
                DlrError::Consistency(format!("cell ({row}, {col}) out of bounds in '{name}'"))
            })?;
        *cell = value;
        Ok(())
    }

    /// Find the first row whose `col` holds the integer `value`.
    pub fn find_row_by_integer(&self, col: usize, value: i64) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.get(col).and_then(Value::as_integer) == Some(value))
    }

    /// Extract a whole column as integers. Null and non-integer cells are an
    /// error; used for key columns that must be fully populated.
    pub fn integer_column(&self, name: &str) -> Result<Vec<i64>> {
        let idx = self.column_index(name).ok_or_else(|| {
            DlrError::Consistency(format!("table '{}' has no column '{}'", self.name, name))
        })?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                r.get(idx).and_then(Value::as_integer).ok_or_else(|| {
                    DlrError::Consistency(format!(
                        "table '{}' row {} column '{}' is not an integer",
                        self.name, i, name
                    ))
                })
            })
            .collect()
    }
}
