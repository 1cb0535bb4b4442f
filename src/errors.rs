//! Error taxonomy for dlrfetch
//!
//! Library operations return [`DlrError`] so callers can distinguish
//! validation failures from transient fetch failures and data problems.
//! The CLI binary converts these into user-facing messages.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, DlrError>;

#[derive(Debug, Error)]
pub enum DlrError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unrecognized unit, table name, or date range outside the data bounds.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A year or group filter matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A database query failed. Recoverable inside the per-month batch loop,
    /// fatal everywhere else.
    #[error("fetch failed for {context}: {source}")]
    Fetch {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A join found no matching row, or a flag column held an unexpected
    /// value. Aborts the current operation.
    #[error("data consistency error: {0}")]
    Consistency(String),

    /// The group tree violates the strict 4-level shape.
    #[error("group tree structure error: {0}")]
    Structure(String),

    /// An anonymization rule references a column or answer row that does
    /// not exist in the answer table.
    #[error("anonymisation rule references missing data: {0}")]
    Rule(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Columnar (Parquet) read/write failure.
    #[error("columnar file error: {0}")]
    Columnar(String),
}

impl DlrError {
    /// Wrap a database error with the table or operation it came from.
    pub fn fetch(context: impl Into<String>, source: rusqlite::Error) -> Self {
        DlrError::Fetch {
            context: context.into(),
            source,
        }
    }

    /// True for errors the batch loop treats as skip-with-report.
    pub fn is_transient(&self) -> bool {
        matches!(self, DlrError::Fetch { .. })
    }
}

impl From<arrow2::error::Error> for DlrError {
    fn from(e: arrow2::error::Error) -> Self {
        DlrError::Columnar(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let e = DlrError::fetch("Profiletable", rusqlite::Error::InvalidQuery);
        assert!(e.is_transient());
        assert!(!DlrError::NotFound("2099".to_string()).is_transient());
        assert!(!DlrError::Consistency("missing metadata".to_string()).is_transient());
    }

    #[test]
    fn test_display_includes_context() {
        let e = DlrError::fetch("LinkTable", rusqlite::Error::InvalidQuery);
        assert!(e.to_string().contains("LinkTable"));
    }
}
