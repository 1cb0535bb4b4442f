//! Identifier resolution
//!
//! The link table ties profiles and survey answers to groups. A profile or
//! answer identifier is only considered valid when both it and its group
//! assignment are non-zero; zero is the source database's "unlinked" marker.

use std::collections::BTreeSet;

use tracing::debug;

use crate::database::DatabaseConn;
use crate::errors::{DlrError, Result};
use crate::groups::groups_for_year;

/// A row from `LinkTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRow {
    pub profile_id: i64,
    pub answer_id: i64,
    pub group_id: i64,
}

/// Fetch the full link table.
pub fn fetch_links(db: &DatabaseConn) -> Result<Vec<LinkRow>> {
    let mut stmt = db
        .conn
        .prepare("SELECT ProfileID, AnswerID, GroupID FROM LinkTable")
        .map_err(|e| DlrError::fetch("LinkTable", e))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(LinkRow {
                profile_id: row.get(0)?,
                answer_id: row.get(1)?,
                group_id: row.get(2)?,
            })
        })
        .map_err(|e| DlrError::fetch("LinkTable", e))?;

    let mut links = Vec::new();
    for row in rows {
        links.push(row.map_err(|e| DlrError::fetch("LinkTable", e))?);
    }
    debug!("fetched {} link rows", links.len());
    Ok(links)
}

/// Distinct profile identifiers with a non-zero group assignment, optionally
/// restricted to the groups of one survey year.
pub fn profile_ids(db: &DatabaseConn, year: Option<i32>) -> Result<Vec<i64>> {
    resolve_ids(db, year, |l| l.profile_id)
}

/// Distinct answer identifiers with a non-zero group assignment, optionally
/// restricted to the groups of one survey year.
pub fn answer_ids(db: &DatabaseConn, year: Option<i32>) -> Result<Vec<i64>> {
    resolve_ids(db, year, |l| l.answer_id)
}

fn resolve_ids(
    db: &DatabaseConn,
    year: Option<i32>,
    id_of: impl Fn(&LinkRow) -> i64,
) -> Result<Vec<i64>> {
    let links = fetch_links(db)?;

    let year_groups: Option<BTreeSet<i64>> = match year {
        // groups_for_year already raises NotFound for a year with no groups
        Some(y) => Some(groups_for_year(db, y)?.iter().map(|g| g.group_id).collect()),
        None => None,
    };

    let ids: BTreeSet<i64> = links
        .iter()
        .filter(|l| l.group_id != 0 && id_of(l) != 0)
        .filter(|l| match &year_groups {
            Some(gs) => gs.contains(&l.group_id),
            None => true,
        })
        .map(|l| id_of(l))
        .collect();

    Ok(ids.into_iter().collect())
}
