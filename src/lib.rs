#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! dlrfetch - a domestic load research data toolkit
//!
//! dlrfetch fetches measurement and survey data from a DLR (Domestic Load
//! Research) database, reshapes it into typed records, and exports named
//! tables as Parquet files. It can be used as both a command-line
//! application and a library.
//!
//! # Architecture
//!
//! - **[`config`]**: TOML configuration with environment overrides
//! - **[`database`]**: scoped SQLite connections, generic result tables,
//!   named-table and raw-query fetchers
//! - **[`groups`]**: reconstruction of the 4-level group hierarchy
//! - **[`links`]**: profile/answer identifier resolution
//! - **[`profiles`]**: profile metadata and unit-of-measurement filtering
//! - **[`batch`]**: per-month measurement assembly with skip-and-report
//!   failure handling, multi-year export sweeps
//! - **[`anonymise`]**: rule-driven masking of free-text survey answers
//! - **[`persist`]**: Parquet read/write for named tables
//! - **[`errors`]**: the [`DlrError`] taxonomy
//!
//! # Example
//!
//! ```rust,ignore
//! use dlrfetch::{DatabaseConn, Unit};
//!
//! let db = DatabaseConn::open_path("/srv/dlr/general_lr4.sqlite3")?;
//! let batch = dlrfetch::batch::fetch_year(&db, 2012, Unit::ActivePower)?;
//! for skipped in batch.skipped_months() {
//!     eprintln!("month {skipped} was skipped");
//! }
//! ```

pub mod anonymise;
pub mod batch;
pub mod config;
pub mod database;
pub mod errors;
pub mod groups;
pub mod links;
pub mod persist;
pub mod profiles;

#[cfg(test)]
pub(crate) mod testutil;

pub use anonymise::{anonymise_answers, AnonReport, AnonRule, ANON_SENTINEL};
pub use batch::{
    fetch_estimate, fetch_year, filter_period, sample_profiles, save_all_profiles, FetchEstimate,
    MonthOutcome, Reading, YearBatch, YearOutcome,
};
pub use config::DlrConfig;
pub use database::{fetch_query, fetch_table, DatabaseConn, DlrTable, Table, Value};
pub use errors::{DlrError, Result};
pub use groups::{all_groups, flatten_groups, groups_for_year, FlatGroup, GroupRow};
pub use links::{answer_ids, profile_ids, LinkRow};
pub use persist::{read_table, save_tables, write_table};
pub use profiles::{meta_profiles, MetaProfile, Unit};
