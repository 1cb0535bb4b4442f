//! Raw table fetcher
//!
//! Named-table lookups against the closed set of known DLR tables, plus an
//! escape hatch for arbitrary SELECT statements. Both return a generic
//! [`Table`].

use tracing::debug;

use crate::database::{DatabaseConn, Table};
use crate::errors::{DlrError, Result};

/// The tables exposed by the DLR database read surface.
///
/// `Profiletable` is deliberately not fetchable through [`fetch_table`]:
/// it holds the raw 5-minute measurements and is far too large to read in
/// one go. Use the batch assembler instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlrTable {
    LinkTable,
    Groups,
    Profiles,
    ProfileUnitsOfMeasure,
    Profiletable,
    Answers,
    AnswersBlob,
    AnswersChar,
}

impl DlrTable {
    pub fn all() -> Vec<DlrTable> {
        vec![
            DlrTable::LinkTable,
            DlrTable::Groups,
            DlrTable::Profiles,
            DlrTable::ProfileUnitsOfMeasure,
            DlrTable::Profiletable,
            DlrTable::Answers,
            DlrTable::AnswersBlob,
            DlrTable::AnswersChar,
        ]
    }

    /// The table name as it appears in the DLR database.
    pub fn as_sql(&self) -> &'static str {
        match self {
            DlrTable::LinkTable => "LinkTable",
            DlrTable::Groups => "Groups",
            DlrTable::Profiles => "profiles",
            DlrTable::ProfileUnitsOfMeasure => "ProfileUnitsOfMeasure",
            DlrTable::Profiletable => "Profiletable",
            DlrTable::Answers => "Answers",
            DlrTable::AnswersBlob => "Answers_blob",
            DlrTable::AnswersChar => "Answers_char",
        }
    }

    pub fn from_name(name: &str) -> Result<DlrTable> {
        Self::all()
            .into_iter()
            .find(|t| t.as_sql().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                DlrError::InvalidArgument(format!(
                    "'{}' is not a DLR table; expected one of: {}",
                    name,
                    Self::all()
                        .iter()
                        .map(|t| t.as_sql())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

impl std::fmt::Display for DlrTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Fetch a whole named table.
pub fn fetch_table(db: &DatabaseConn, table: DlrTable) -> Result<Table> {
    if table == DlrTable::Profiletable {
        return Err(DlrError::InvalidArgument(
            "the Profiletable measurement table is too large to read in one go; \
             use the per-month batch assembler"
                .to_string(),
        ));
    }
    let query = format!("SELECT * FROM \"{}\"", table.as_sql());
    let mut result = fetch_query(db, &query)?;
    result.name = table.as_sql().to_string();
    Ok(result)
}

/// Execute an arbitrary SELECT and collect the result set.
pub fn fetch_query(db: &DatabaseConn, query: &str) -> Result<Table> {
    let mut stmt = db
        .conn
        .prepare(query)
        .map_err(|e| DlrError::fetch(query.to_string(), e))?;

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let n_cols = columns.len();

    let mut table = Table::new("query", columns);
    let mut rows = stmt
        .query([])
        .map_err(|e| DlrError::fetch(query.to_string(), e))?;

    while let Some(row) = rows
        .next()
        .map_err(|e| DlrError::fetch(query.to_string(), e))?
    {
        let mut values = Vec::with_capacity(n_cols);
        for i in 0..n_cols {
            let v = row
                .get_ref(i)
                .map_err(|e| DlrError::fetch(query.to_string(), e))?;
            values.push(v.into());
        }
        table.rows.push(values);
    }

    debug!("fetched {} rows from query", table.len());
    Ok(table)
}
