//! Database connection management
//!
//! Every library operation takes a `&DatabaseConn` opened by the caller, so
//! acquisition is scoped: the underlying SQLite handle is closed when the
//! wrapper is dropped. There is no global connection.

use rusqlite::Connection;

use crate::errors::{DlrError, Result};

/// Thin wrapper around a SQLite connection to the DLR database.
///
/// The DLR database is a read-only external data source; this wrapper only
/// ever issues SELECTs against it. In-memory databases are supported for
/// tests and scratch work.
pub struct DatabaseConn {
    pub conn: Connection,
}

impl DatabaseConn {
    /// Open a database at the specified path, or in memory if `None`.
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| DlrError::Config(format!("failed to open database at '{p}': {e}")))?,
            None => Connection::open_in_memory().map_err(|e| {
                DlrError::Config(format!("failed to create in-memory database: {e}"))
            })?,
        };

        let db = DatabaseConn { conn };
        db.configure()?;
        Ok(db)
    }

    /// Open a database at the specified path (convenience method)
    pub fn open_path(path: &str) -> Result<Self> {
        Self::open(Some(path))
    }

    /// Create an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::open(None)
    }

    fn configure(&self) -> Result<()> {
        // Generous page cache; fetches scan whole tables
        self.conn
            .execute("PRAGMA cache_size=100000", [])
            .map_err(|e| DlrError::Config(format!("failed to set cache size: {e}")))?;

        // Store temp tables in memory
        self.conn
            .execute("PRAGMA temp_store=MEMORY", [])
            .map_err(|e| DlrError::Config(format!("failed to set temp store: {e}")))?;

        Ok(())
    }

    /// Execute a SQL statement. Only used by tests and scratch databases;
    /// the DLR source itself is never written.
    pub fn execute(&self, sql: &str) -> Result<usize> {
        self.conn
            .execute(sql, [])
            .map_err(|e| DlrError::fetch("execute", e))
    }

    /// Check if a table exists in the database
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let count: i32 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [table_name],
                |row| row.get(0),
            )
            .map_err(|e| DlrError::fetch("sqlite_master", e))?;
        Ok(count > 0)
    }

    /// Get the row count for a table
    pub fn table_count(&self, table_name: &str) -> Result<u64> {
        let query = format!("SELECT COUNT(*) FROM \"{}\"", table_name);
        let count: u64 = self
            .conn
            .query_row(&query, [], |row| row.get(0))
            .map_err(|e| DlrError::fetch(table_name.to_string(), e))?;
        Ok(count)
    }
}
