//! Database access layer
//!
//! - [`connection`]: scoped SQLite connection wrapper
//! - [`table`]: generic tabular result set
//! - [`fetch`]: named-table and raw-query fetchers

pub mod connection;
pub mod fetch;
pub mod table;

pub use connection::DatabaseConn;
pub use fetch::{fetch_query, fetch_table, DlrTable};
pub use table::{Table, Value};
