//! Profile metadata and unit-of-measurement filtering
//!
//! Profile records carry their unit of measurement as a numeric code that
//! resolves through the `ProfileUnitsOfMeasure` lookup to a human label.
//! The closed [`Unit`] enumeration validates requested units at the
//! boundary; an unrecognized unit never silently returns nothing.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use crate::database::DatabaseConn;
use crate::errors::{DlrError, Result};
use crate::links::profile_ids;

/// Physical unit of a load profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Unit {
    Voltage,
    Current,
    ApparentPower,
    ActivePower,
    Frequency,
    /// No unit filter; return profiles of every unit.
    #[default]
    All,
}

impl Unit {
    /// The label used in the units lookup table, or `None` for [`Unit::All`].
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Unit::Voltage => Some("V avg"),
            Unit::Current => Some("A avg"),
            Unit::ApparentPower => Some("kVA avg"),
            Unit::ActivePower => Some("kW avg"),
            Unit::Frequency => Some("Hz"),
            Unit::All => None,
        }
    }
}

impl FromStr for Unit {
    type Err = DlrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "v" => Ok(Unit::Voltage),
            "a" => Ok(Unit::Current),
            "kva" => Ok(Unit::ApparentPower),
            "kw" => Ok(Unit::ActivePower),
            "hz" => Ok(Unit::Frequency),
            "all" | "" => Ok(Unit::All),
            other => Err(DlrError::InvalidArgument(format!(
                "unrecognized unit '{other}': choose V, A, kVA, Hz or kW, or 'all' \
                 for profiles of every unit"
            ))),
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label().unwrap_or("all"))
    }
}

/// Observation metadata for one load profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaProfile {
    pub profile_id: i64,
    pub active: bool,
    pub recorder_id: String,
    /// Resolved unit label, e.g. "kW avg"
    pub unit: String,
}

/// Parse a single-character 'Y'/'N' flag. The source pads these with
/// whitespace; anything else is a consistency error.
pub(crate) fn parse_flag(raw: &str, context: &str) -> Result<bool> {
    match raw.trim() {
        "Y" => Ok(true),
        "N" => Ok(false),
        other => Err(DlrError::Consistency(format!(
            "{context}: expected 'Y' or 'N', got '{other}'"
        ))),
    }
}

/// Fetch profile metadata for one survey year, plus the list of profile
/// identifiers matching the requested unit.
///
/// The returned metadata table always covers all of the year's profiles;
/// only the identifier list is narrowed by `unit`.
pub fn meta_profiles(
    db: &DatabaseConn,
    year: i32,
    unit: Unit,
) -> Result<(Vec<MetaProfile>, Vec<i64>)> {
    let pids = profile_ids(db, Some(year))?;

    let mut stmt = db
        .conn
        .prepare(
            "SELECT p.ProfileId, p.Active, p.RecorderID, p.\"Unit of measurement\", u.Description
             FROM profiles p
             LEFT JOIN ProfileUnitsOfMeasure u ON p.\"Unit of measurement\" = u.UnitsID",
        )
        .map_err(|e| DlrError::fetch("profiles", e))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })
        .map_err(|e| DlrError::fetch("profiles", e))?;

    let wanted: HashMap<i64, ()> = pids.iter().map(|id| (*id, ())).collect();
    let mut metaprofiles = Vec::new();
    for row in rows {
        let (profile_id, active, recorder_id, uom_code, description) =
            row.map_err(|e| DlrError::fetch("profiles", e))?;
        if !wanted.contains_key(&profile_id) {
            continue;
        }
        // A unit code with no lookup entry means the metadata join is broken;
        // fail loudly rather than carry an unlabeled profile.
        let unit_label = description.ok_or_else(|| {
            DlrError::Consistency(format!(
                "profile {profile_id} has unit code {code} with no entry in \
                 ProfileUnitsOfMeasure",
                code = uom_code.map_or("NULL".to_string(), |c| c.to_string())
            ))
        })?;
        metaprofiles.push(MetaProfile {
            profile_id,
            active: parse_flag(&active, &format!("profile {profile_id} Active flag"))?,
            recorder_id: recorder_id.trim().to_string(),
            unit: unit_label.trim().to_string(),
        });
    }

    metaprofiles.sort_by_key(|m| m.profile_id);

    let plist: Vec<i64> = match unit.label() {
        None => metaprofiles.iter().map(|m| m.profile_id).collect(),
        Some(label) => metaprofiles
            .iter()
            .filter(|m| m.unit == label)
            .map(|m| m.profile_id)
            .collect(),
    };

    debug!(
        "year {}: {} metadata rows, {} profiles match unit {}",
        year,
        metaprofiles.len(),
        plist.len(),
        unit
    );
    Ok((metaprofiles, plist))
}
