//! Profile batch assembly
//!
//! Measurement fetches for a whole survey year are partitioned per calendar
//! month to bound query size. A month whose fetch fails is skipped and
//! reported in the returned [`MonthOutcome`] list rather than aborting the
//! year; a measurement with no matching metadata aborts the operation.
//!
//! Rows are ordered by `(Datefield, ProfileID)` within each month. The
//! concatenation across months does not re-sort, so full-year ordering by
//! timestamp is not guaranteed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use itertools::Itertools;
use serde::Serialize;
use tracing::{info, warn};

use crate::database::{DatabaseConn, Table, Value};
use crate::errors::{DlrError, Result};
use crate::profiles::{meta_profiles, parse_flag, MetaProfile, Unit};

/// A row from the raw measurement table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub profile_id: i64,
    pub datefield: NaiveDateTime,
    pub units_read: f64,
    pub valid: bool,
}

/// A measurement joined with its profile's metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub profile_id: i64,
    pub datefield: NaiveDateTime,
    pub units_read: f64,
    pub valid: bool,
    pub active: bool,
    pub recorder_id: String,
    pub unit: String,
}

/// Outcome of a single month's fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MonthOutcome {
    Fetched { month: u32, rows: usize },
    Skipped { month: u32, reason: String },
}

impl MonthOutcome {
    pub fn month(&self) -> u32 {
        match self {
            MonthOutcome::Fetched { month, .. } | MonthOutcome::Skipped { month, .. } => *month,
        }
    }
}

/// A year's worth of joined measurement rows plus the per-month report.
#[derive(Debug, Clone, Serialize)]
pub struct YearBatch {
    pub year: i32,
    pub rows: Vec<Reading>,
    pub outcomes: Vec<MonthOutcome>,
}

impl YearBatch {
    pub fn skipped_months(&self) -> Vec<u32> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MonthOutcome::Skipped { .. }))
            .map(MonthOutcome::month)
            .collect()
    }

    /// Reshape into a generic table for persistence. Validity and active
    /// flags are written as 0/1 integers.
    pub fn to_table(&self) -> Table {
        let columns = [
            "ProfileID",
            "Datefield",
            "Unitsread",
            "Valid",
            "Active",
            "RecorderID",
            "UoM",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let mut table = Table::new(format!("p{}", self.year), columns);
        for r in &self.rows {
            table.rows.push(vec![
                Value::Integer(r.profile_id),
                Value::Text(r.datefield.format("%Y-%m-%d %H:%M:%S").to_string()),
                Value::Real(r.units_read),
                Value::Integer(i64::from(r.valid)),
                Value::Integer(i64::from(r.active)),
                Value::Text(r.recorder_id.clone()),
                Value::Text(r.unit.clone()),
            ]);
        }
        table
    }
}

/// Estimated cost of fetching all profiles for a year.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FetchEstimate {
    pub year: i32,
    pub profiles: usize,
    pub minutes: f64,
    pub megabytes: f64,
}

// Empirical per-profile fetch cost: about 0.7 s and 2.69 MB each.
const SECS_PER_PROFILE: f64 = 0.7;
const MB_PER_PROFILE: f64 = 2.69;

/// Estimate fetch time and memory usage for a year's profiles.
pub fn fetch_estimate(db: &DatabaseConn, year: i32) -> Result<FetchEstimate> {
    let (_, plist) = meta_profiles(db, year, Unit::All)?;
    let profiles = plist.len();
    Ok(FetchEstimate {
        year,
        profiles,
        minutes: profiles as f64 * SECS_PER_PROFILE / 60.0,
        megabytes: profiles as f64 * MB_PER_PROFILE,
    })
}

/// Fetch one month of measurements for the given profiles and join each row
/// to its metadata. Rows come back ordered by `(Datefield, ProfileID)`.
pub fn fetch_month(
    db: &DatabaseConn,
    meta: &HashMap<i64, MetaProfile>,
    profile_ids: &[i64],
    month: u32,
) -> Result<Vec<Reading>> {
    let context = format!("Profiletable month {month}");
    let subquery = profile_ids.iter().join(", ");
    let query = format!(
        "SELECT pt.ProfileID, pt.Datefield, pt.Unitsread, pt.Valid
         FROM Profiletable pt
         WHERE pt.ProfileID IN ({subquery})
           AND CAST(strftime('%m', pt.Datefield) AS INTEGER) = ?1
         ORDER BY pt.Datefield, pt.ProfileID"
    );

    let mut stmt = db
        .conn
        .prepare(&query)
        .map_err(|e| DlrError::fetch(context.clone(), e))?;
    let rows = stmt
        .query_map([month], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, NaiveDateTime>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(|e| DlrError::fetch(context.clone(), e))?;

    let mut readings = Vec::new();
    for row in rows {
        let (profile_id, datefield, units_read, valid_raw) =
            row.map_err(|e| DlrError::fetch(context.clone(), e))?;
        let valid = parse_flag(
            &valid_raw,
            &format!("measurement for profile {profile_id} at {datefield}"),
        )?;
        let mp = meta.get(&profile_id).ok_or_else(|| {
            DlrError::Consistency(format!(
                "measurement row references profile {profile_id} with no metadata"
            ))
        })?;
        readings.push(Reading {
            profile_id,
            datefield,
            units_read,
            valid,
            active: mp.active,
            recorder_id: mp.recorder_id.clone(),
            unit: mp.unit.clone(),
        });
    }
    Ok(readings)
}

/// Fetch all measurement rows for one survey year, month by month.
///
/// Transient per-month fetch failures are skipped with a warning and show up
/// in the returned outcome report; consistency errors abort the whole year.
pub fn fetch_year(db: &DatabaseConn, year: i32, unit: Unit) -> Result<YearBatch> {
    let (metaprofiles, plist) = meta_profiles(db, year, unit)?;
    if plist.is_empty() {
        return Err(DlrError::NotFound(format!(
            "no profiles for year {year} with unit {unit}"
        )));
    }
    let meta: HashMap<i64, MetaProfile> = metaprofiles
        .into_iter()
        .map(|m| (m.profile_id, m))
        .collect();

    let mut rows = Vec::new();
    let mut outcomes = Vec::new();
    for month in 1..=12 {
        match fetch_month(db, &meta, &plist, month) {
            Ok(fetched) => {
                outcomes.push(MonthOutcome::Fetched {
                    month,
                    rows: fetched.len(),
                });
                rows.extend(fetched);
            }
            Err(e) if e.is_transient() => {
                warn!("year {}: skipping month {}: {}", year, month, e);
                outcomes.push(MonthOutcome::Skipped {
                    month,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        "year {}: fetched {} rows across {} profiles ({} month(s) skipped)",
        year,
        rows.len(),
        plist.len(),
        outcomes
            .iter()
            .filter(|o| matches!(o, MonthOutcome::Skipped { .. }))
            .count()
    );
    Ok(YearBatch {
        year,
        rows,
        outcomes,
    })
}

// Preview size for sample fetches, matching the source system's caps.
const SAMPLE_ROW_LIMIT: u32 = 1000;
const SAMPLE_PROFILE_LIMIT: usize = 9;

/// Fetch a bounded preview of a year's readings: the first few profiles,
/// capped at 1000 rows.
pub fn sample_profiles(db: &DatabaseConn, year: i32) -> Result<Vec<Reading>> {
    let (metaprofiles, plist) = meta_profiles(db, year, Unit::All)?;
    let sample_ids: Vec<i64> = plist.into_iter().take(SAMPLE_PROFILE_LIMIT).collect();
    if sample_ids.is_empty() {
        return Err(DlrError::NotFound(format!("no profiles for year {year}")));
    }
    let meta: HashMap<i64, MetaProfile> = metaprofiles
        .into_iter()
        .map(|m| (m.profile_id, m))
        .collect();

    let context = "Profiletable sample";
    let subquery = sample_ids.iter().join(", ");
    let query = format!(
        "SELECT pt.ProfileID, pt.Datefield, pt.Unitsread, pt.Valid
         FROM Profiletable pt
         WHERE pt.ProfileID IN ({subquery})
         ORDER BY pt.Datefield, pt.ProfileID
         LIMIT {SAMPLE_ROW_LIMIT}"
    );

    let mut stmt = db
        .conn
        .prepare(&query)
        .map_err(|e| DlrError::fetch(context, e))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, NaiveDateTime>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(|e| DlrError::fetch(context, e))?;

    let mut readings = Vec::new();
    for row in rows {
        let (profile_id, datefield, units_read, valid_raw) =
            row.map_err(|e| DlrError::fetch(context, e))?;
        let valid = parse_flag(
            &valid_raw,
            &format!("measurement for profile {profile_id} at {datefield}"),
        )?;
        let mp = meta.get(&profile_id).ok_or_else(|| {
            DlrError::Consistency(format!(
                "measurement row references profile {profile_id} with no metadata"
            ))
        })?;
        readings.push(Reading {
            profile_id,
            datefield,
            units_read,
            valid,
            active: mp.active,
            recorder_id: mp.recorder_id.clone(),
            unit: mp.unit.clone(),
        });
    }
    Ok(readings)
}

/// Subset readings to a date range. Days run 00:00 to 23:55; both dates must
/// fall within the data bounds and `start` must not be after `end`.
pub fn filter_period(rows: &[Reading], start: NaiveDate, end: NaiveDate) -> Result<Vec<Reading>> {
    let data_start = rows
        .iter()
        .map(|r| r.datefield)
        .min()
        .ok_or_else(|| DlrError::InvalidArgument("no readings to subset".to_string()))?;
    let data_end = rows
        .iter()
        .map(|r| r.datefield)
        .max()
        .ok_or_else(|| DlrError::InvalidArgument("no readings to subset".to_string()))?;

    if start > end {
        return Err(DlrError::InvalidArgument(format!(
            "period start {start} must be before period end {end}"
        )));
    }

    // Snap to the data bounds when the requested date is the boundary day,
    // so a partial first/last day does not trip the range check.
    let start_dt = if start == data_start.date() {
        data_start
    } else {
        datetime_at(start, 0, 0)?
    };
    let end_dt = if end == data_end.date() {
        data_end
    } else {
        datetime_at(end, 23, 55)?
    };

    if start_dt < data_start || start_dt > data_end || end_dt < data_start || end_dt > data_end {
        return Err(DlrError::InvalidArgument(format!(
            "period [{start} .. {end}] falls outside the data bounds \
             [{data_start} .. {data_end}]"
        )));
    }

    Ok(rows
        .iter()
        .filter(|r| r.datefield >= start_dt && r.datefield <= end_dt)
        .cloned()
        .collect())
}

fn datetime_at(date: NaiveDate, hour: u32, minute: u32) -> Result<NaiveDateTime> {
    date.and_hms_opt(hour, minute, 0)
        .ok_or_else(|| DlrError::InvalidArgument(format!("invalid time of day on {date}")))
}

/// Per-year outcome of a multi-year save sweep.
#[derive(Debug, Clone, Serialize)]
pub enum YearOutcome {
    Saved {
        year: i32,
        rows: usize,
        skipped_months: Vec<u32>,
        path: PathBuf,
    },
    /// The output file already existed from a previous run.
    Checkpointed { year: i32, path: PathBuf },
    Skipped { year: i32, reason: String },
}

/// Fetch and persist every year in `[start_year, end_year]` as one Parquet
/// file per year.
///
/// A year whose output file already exists is skipped, so an interrupted
/// run resumes at the first incomplete year. Years that fail with
/// not-found or transient fetch errors are reported and skipped;
/// consistency errors abort the sweep.
pub fn save_all_profiles(
    db: &DatabaseConn,
    start_year: i32,
    end_year: i32,
    dir: &Path,
) -> Result<Vec<YearOutcome>> {
    if start_year > end_year {
        return Err(DlrError::InvalidArgument(format!(
            "start year {start_year} is after end year {end_year}"
        )));
    }
    std::fs::create_dir_all(dir)?;

    let mut outcomes = Vec::new();
    for year in start_year..=end_year {
        let path = dir.join(format!("p{year}.parquet"));
        if path.exists() {
            info!("year {}: checkpoint exists at {}, skipping", year, path.display());
            outcomes.push(YearOutcome::Checkpointed { year, path });
            continue;
        }
        match fetch_year(db, year, Unit::All) {
            Ok(batch) => {
                crate::persist::write_table(&batch.to_table(), &path)?;
                info!("year {}: saved {} rows to {}", year, batch.rows.len(), path.display());
                outcomes.push(YearOutcome::Saved {
                    year,
                    rows: batch.rows.len(),
                    skipped_months: batch.skipped_months(),
                    path,
                });
            }
            Err(e) if matches!(e, DlrError::NotFound(_)) || e.is_transient() => {
                warn!("year {}: skipping: {}", year, e);
                outcomes.push(YearOutcome::Skipped {
                    year,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fixture_db;

    #[test]
    fn test_fetch_year_joins_metadata() {
        let db = fixture_db();
        let batch = fetch_year(&db, 2012, Unit::All).unwrap();

        assert!(!batch.rows.is_empty());
        assert!(batch.skipped_months().is_empty());
        let r = &batch.rows[0];
        assert!(!r.recorder_id.is_empty());
        assert!(!r.unit.is_empty());

        // within a month, rows are ordered by (Datefield, ProfileID)
        let january: Vec<_> = batch
            .rows
            .iter()
            .filter(|r| r.datefield.format("%m").to_string() == "01")
            .collect();
        let mut sorted = january.clone();
        sorted.sort_by_key(|r| (r.datefield, r.profile_id));
        assert_eq!(january, sorted);
    }

    #[test]
    fn test_fetch_year_unit_filter() {
        let db = fixture_db();
        let batch = fetch_year(&db, 2012, Unit::ActivePower).unwrap();
        assert!(batch.rows.iter().all(|r| r.profile_id == 5002));

        // no frequency profiles in 2012 at all
        assert!(matches!(
            fetch_year(&db, 2012, Unit::Frequency),
            Err(DlrError::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_month_is_skipped_and_reported() {
        let db = fixture_db();
        // poison one February row so the month's fetch fails mid-iteration
        db.execute(
            "INSERT INTO Profiletable (ProfileID, Datefield, Unitsread, Valid)
             VALUES (5001, '2012-02-20 00:00:00', 'oops', 'Y')",
        )
        .unwrap();

        let batch = fetch_year(&db, 2012, Unit::All).unwrap();
        assert_eq!(batch.skipped_months(), vec![2]);
        // the other months' rows are all present
        assert!(batch
            .rows
            .iter()
            .all(|r| r.datefield.format("%m").to_string() != "02"));
        assert!(!batch.rows.is_empty());
        // the skip carries a reason
        assert!(batch.outcomes.iter().any(
            |o| matches!(o, MonthOutcome::Skipped { month: 2, reason } if !reason.is_empty())
        ));
    }

    #[test]
    fn test_measurement_without_metadata_aborts() {
        let db = fixture_db();
        let (metaprofiles, _) = meta_profiles(&db, 2012, Unit::All).unwrap();
        // metadata map missing 5002 while its rows are still requested
        let meta: HashMap<i64, MetaProfile> = metaprofiles
            .into_iter()
            .filter(|m| m.profile_id != 5002)
            .map(|m| (m.profile_id, m))
            .collect();
        let err = fetch_month(&db, &meta, &[5001, 5002], 1);
        assert!(matches!(err, Err(DlrError::Consistency(_))));
    }

    #[test]
    fn test_fetch_estimate() {
        let db = fixture_db();
        let est = fetch_estimate(&db, 2012).unwrap();
        assert_eq!(est.profiles, 2);
        assert!(est.minutes > 0.0);
        assert!(est.megabytes > 0.0);
    }

    #[test]
    fn test_sample_profiles_bounded() {
        let db = fixture_db();
        let rows = sample_profiles(&db, 2012).unwrap();
        assert!(!rows.is_empty());
        assert!(rows.len() <= 1000);
    }

    #[test]
    fn test_sample_covers_at_most_nine_profiles() {
        let db = fixture_db();
        // pad 2012 out well past the sample cap
        for id in 6001..=6012 {
            db.execute(&format!(
                "INSERT INTO profiles VALUES ({id}, 'Y', 'REC_P{id}', 1)"
            ))
            .unwrap();
            db.execute(&format!("INSERT INTO LinkTable VALUES ({id}, 0, 1000)"))
                .unwrap();
            db.execute(&format!(
                "INSERT INTO Profiletable VALUES ({id}, '2012-01-01 00:00:00', 230.0, 'Y')"
            ))
            .unwrap();
        }

        let rows = sample_profiles(&db, 2012).unwrap();
        let distinct: std::collections::HashSet<i64> =
            rows.iter().map(|r| r.profile_id).collect();
        assert_eq!(distinct.len(), 9);
    }

    #[test]
    fn test_filter_period() {
        let db = fixture_db();
        let batch = fetch_year(&db, 2012, Unit::All).unwrap();

        let jan = filter_period(
            &batch.rows,
            NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2012, 1, 31).unwrap(),
        )
        .unwrap();
        assert!(!jan.is_empty());
        assert!(jan
            .iter()
            .all(|r| r.datefield.format("%m").to_string() == "01"));

        // start after end
        assert!(matches!(
            filter_period(
                &batch.rows,
                NaiveDate::from_ymd_opt(2012, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
            ),
            Err(DlrError::InvalidArgument(_))
        ));

        // outside the data bounds
        assert!(matches!(
            filter_period(
                &batch.rows,
                NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2015, 2, 1).unwrap(),
            ),
            Err(DlrError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_save_all_resumes_past_existing_files() {
        let db = fixture_db();
        let dir = tempfile::tempdir().unwrap();

        // a previous run already wrote 2012; its content must survive
        let checkpoint = dir.path().join("p2012.parquet");
        std::fs::write(&checkpoint, b"prior run").unwrap();

        let outcomes = save_all_profiles(&db, 2012, 2014, dir.path()).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(
            outcomes[0],
            YearOutcome::Checkpointed { year: 2012, .. }
        ));
        assert!(matches!(
            outcomes[1],
            YearOutcome::Saved { year: 2013, rows, .. } if rows > 0
        ));
        // no groups exist for 2014; the sweep reports it and carries on
        assert!(matches!(
            outcomes[2],
            YearOutcome::Skipped { year: 2014, .. }
        ));

        assert_eq!(std::fs::read(&checkpoint).unwrap(), b"prior run");
        assert!(dir.path().join("p2013.parquet").exists());
        assert!(!dir.path().join("p2014.parquet").exists());
    }

    #[test]
    fn test_save_all_rejects_reversed_range() {
        let db = fixture_db();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            save_all_profiles(&db, 2013, 2012, dir.path()),
            Err(DlrError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_to_table_shape() {
        let db = fixture_db();
        let batch = fetch_year(&db, 2012, Unit::All).unwrap();
        let table = batch.to_table();
        assert_eq!(table.name, "p2012");
        assert_eq!(table.columns.len(), 7);
        assert_eq!(table.len(), batch.rows.len());
    }
}
