//! Group hierarchy reconstruction
//!
//! The `Groups` table is a self-referential tree, exactly four levels deep:
//! domestic/non-domestic roots, survey-type children, year children, and
//! location leaves. [`flatten_groups`] denormalizes it into one record per
//! leaf carrying the names of all three ancestor levels.
//!
//! The strict depth is validated: an orphaned group or a node deeper than
//! four levels is a structural error rather than a silent mis-join.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::database::DatabaseConn;
use crate::errors::{DlrError, Result};

/// A raw row from the `Groups` table. Missing `ParentID` is normalized to 0
/// (the root marker) and names are trimmed at the fetch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRow {
    pub group_id: i64,
    pub parent_id: i64,
    pub group_name: String,
    pub context_id: Option<i64>,
}

/// One leaf (location) group annotated with its three ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatGroup {
    pub context_id: Option<i64>,
    pub group_id_1: i64,
    pub group_id_2: i64,
    pub group_id_3: i64,
    pub group_id: i64,
    pub dom_non_dom: String,
    pub survey: String,
    pub year: String,
    pub location: String,
}

/// Fetch and normalize the full `Groups` table.
pub fn fetch_groups(db: &DatabaseConn) -> Result<Vec<GroupRow>> {
    let mut stmt = db
        .conn
        .prepare("SELECT GroupID, ParentID, GroupName, ContextID FROM \"Groups\"")
        .map_err(|e| DlrError::fetch("Groups", e))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(GroupRow {
                group_id: row.get(0)?,
                parent_id: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                group_name: row.get::<_, String>(2)?.trim().to_string(),
                context_id: row.get(3)?,
            })
        })
        .map_err(|e| DlrError::fetch("Groups", e))?;

    let mut groups = Vec::new();
    for row in rows {
        groups.push(row.map_err(|e| DlrError::fetch("Groups", e))?);
    }
    debug!("fetched {} group rows", groups.len());
    Ok(groups)
}

/// Partition the group tree into its four levels and join each leaf to its
/// ancestors. Output is sorted by `(group_id_1, group_id_2, group_id_3)`.
pub fn flatten_groups(groups: &[GroupRow]) -> Result<Vec<FlatGroup>> {
    let by_id: HashMap<i64, &GroupRow> = groups.iter().map(|g| (g.group_id, g)).collect();

    // Level 1: domestic/non-domestic roots
    let level_1: HashSet<i64> = groups
        .iter()
        .filter(|g| g.parent_id == 0)
        .map(|g| g.group_id)
        .collect();
    // Level 2: survey types
    let level_2: HashSet<i64> = groups
        .iter()
        .filter(|g| level_1.contains(&g.parent_id))
        .map(|g| g.group_id)
        .collect();
    // Level 3: years
    let level_3: HashSet<i64> = groups
        .iter()
        .filter(|g| level_2.contains(&g.parent_id))
        .map(|g| g.group_id)
        .collect();
    // Level 4: locations (leaves)
    let level_4: Vec<&GroupRow> = groups
        .iter()
        .filter(|g| level_3.contains(&g.parent_id))
        .collect();

    // Strict-depth validation: every group must land in exactly one of the
    // four levels. Leftovers are orphans or level-5+ nodes.
    let assigned: HashSet<i64> = level_1
        .iter()
        .chain(level_2.iter())
        .chain(level_3.iter())
        .copied()
        .chain(level_4.iter().map(|g| g.group_id))
        .collect();
    let mut leftover: Vec<i64> = groups
        .iter()
        .map(|g| g.group_id)
        .filter(|id| !assigned.contains(id))
        .collect();
    if !leftover.is_empty() {
        leftover.sort_unstable();
        return Err(DlrError::Structure(format!(
            "{} group(s) do not fit the 4-level tree (orphaned parent or deeper \
             than four levels): {:?}",
            leftover.len(),
            leftover
        )));
    }
    if level_4.is_empty() {
        return Err(DlrError::Structure(
            "group tree has no level-4 (location) groups".to_string(),
        ));
    }

    let ancestor = |id: i64| -> Result<&GroupRow> {
        by_id.get(&id).copied().ok_or_else(|| {
            DlrError::Structure(format!("parent group {id} does not exist in the Groups table"))
        })
    };

    let mut flat = Vec::with_capacity(level_4.len());
    for g4 in level_4 {
        let g3 = ancestor(g4.parent_id)?;
        let g2 = ancestor(g3.parent_id)?;
        let g1 = ancestor(g2.parent_id)?;
        flat.push(FlatGroup {
            context_id: g4.context_id,
            group_id_1: g1.group_id,
            group_id_2: g2.group_id,
            group_id_3: g3.group_id,
            group_id: g4.group_id,
            dom_non_dom: g1.group_name.clone(),
            survey: g2.group_name.clone(),
            year: g3.group_name.clone(),
            location: g4.group_name.clone(),
        });
    }

    flat.sort_by_key(|g| (g.group_id_1, g.group_id_2, g.group_id_3, g.group_id));
    Ok(flat)
}

/// Keep only the leaves whose year group name matches `year` exactly.
/// Comparison is a string match on the canonical integer rendering.
pub fn filter_year(flat: &[FlatGroup], year: i32) -> Vec<FlatGroup> {
    let year_str = year.to_string();
    flat.iter().filter(|g| g.year == year_str).cloned().collect()
}

/// Fetch, flatten, and filter the group tree for one survey year.
///
/// A year with no matching groups is an explicit error; callers asking for
/// a year outside the data must hear about it rather than get an empty set.
pub fn groups_for_year(db: &DatabaseConn, year: i32) -> Result<Vec<FlatGroup>> {
    let flat = flatten_groups(&fetch_groups(db)?)?;
    let matched = filter_year(&flat, year);
    if matched.is_empty() {
        return Err(DlrError::NotFound(format!(
            "no groups found for year {year}"
        )));
    }
    Ok(matched)
}

/// Fetch and flatten the whole group tree.
pub fn all_groups(db: &DatabaseConn) -> Result<Vec<FlatGroup>> {
    flatten_groups(&fetch_groups(db)?)
}
