//! Survey answer anonymization
//!
//! Free-text answer tables are masked according to CSV rule files keyed by
//! answer-table name. A rule marks a `(QuestionaireID, ColumnNo)` pair for
//! anonymization; every answer row belonging to that questionnaire gets the
//! flagged column overwritten with a fixed sentinel. The masked table is
//! persisted under a new name; the source table is never modified.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::database::{fetch_table, DatabaseConn, DlrTable, Value};
use crate::errors::{DlrError, Result};
use crate::persist::save_tables;

/// Value written over every anonymized cell.
pub const ANON_SENTINEL: &str = "a";

/// Answer tables and their rule files under the `anonymise` data directory.
pub const ANON_TABLES: &[(DlrTable, &str)] = &[
    (DlrTable::AnswersBlob, "blobQs.csv"),
    (DlrTable::AnswersChar, "charQs.csv"),
];

/// One row of a rule file.
#[derive(Debug, Clone, Deserialize)]
pub struct AnonRule {
    #[serde(rename = "QuestionaireID")]
    pub questionaire_id: i64,
    #[serde(rename = "ColumnNo")]
    pub column_no: i64,
    #[serde(rename = "anonymise")]
    pub anonymise: i64,
}

/// Outcome of anonymizing one answer table.
#[derive(Debug, Clone, Serialize)]
pub struct AnonReport {
    pub source: String,
    pub output: String,
    pub cells_masked: usize,
    pub path: PathBuf,
}

/// Load a rule file. Only rules with `anonymise == 1` are returned.
pub fn load_rules(path: &Path) -> Result<Vec<AnonRule>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        DlrError::Rule(format!("failed to read rule file {}: {}", path.display(), e))
    })?;
    let mut rules = Vec::new();
    for record in reader.deserialize() {
        let rule: AnonRule = record.map_err(|e| {
            DlrError::Rule(format!("malformed rule in {}: {}", path.display(), e))
        })?;
        if rule.anonymise == 1 {
            rules.push(rule);
        }
    }
    Ok(rules)
}

/// Anonymize both answer tables and persist the masked copies under
/// `<source>_anon` in `out_dir`.
pub fn anonymise_answers(
    db: &DatabaseConn,
    rules_dir: &Path,
    out_dir: &Path,
) -> Result<Vec<AnonReport>> {
    // AnswerID -> QuestionaireID, from the master answer register
    let answers = fetch_table(db, DlrTable::Answers)?;
    let questionaire_of: HashMap<i64, i64> = answers
        .integer_column("AnswerID")?
        .into_iter()
        .zip(answers.integer_column("QuestionaireID")?)
        .collect();

    let mut reports = Vec::new();
    for (table_id, rule_file) in ANON_TABLES {
        let rules = load_rules(&rules_dir.join(rule_file))?;
        let mut table = fetch_table(db, *table_id)?;
        let id_col = table.column_index("AnswerID").ok_or_else(|| {
            DlrError::Consistency(format!("{} has no AnswerID column", table.name))
        })?;

        // flagged columns per questionnaire
        let mut flagged: HashMap<i64, Vec<i64>> = HashMap::new();
        for rule in &rules {
            flagged
                .entry(rule.questionaire_id)
                .or_default()
                .push(rule.column_no);
        }

        let mut cells_masked = 0;
        for (&answer_id, qid) in &questionaire_of {
            let Some(columns) = flagged.get(qid) else {
                continue;
            };
            let row = table.find_row_by_integer(id_col, answer_id).ok_or_else(|| {
                DlrError::Rule(format!(
                    "answer {answer_id} (questionnaire {qid}) is flagged but missing \
                     from {}",
                    table.name
                ))
            })?;
            for column_no in columns {
                let col = table.column_index(&column_no.to_string()).ok_or_else(|| {
                    DlrError::Rule(format!(
                        "rule for questionnaire {qid} names column {column_no}, which \
                         does not exist in {}",
                        table.name
                    ))
                })?;
                table.set(row, col, Value::Text(ANON_SENTINEL.to_string()))?;
                cells_masked += 1;
            }
        }

        let source = table.name.clone();
        table.name = format!("{}_anon", source.to_lowercase());
        let paths = save_tables(std::slice::from_ref(&table), out_dir)?;
        info!(
            "anonymised {}: {} cell(s) masked, saved as {}",
            source, cells_masked, table.name
        );
        reports.push(AnonReport {
            source,
            output: table.name.clone(),
            cells_masked,
            path: paths.into_iter().next().unwrap_or_default(),
        });
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::read_table;
    use crate::testutil::{fixture_db, write_fixture_rules};

    #[test]
    fn test_load_rules_keeps_flagged_only() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture_rules(dir.path());
        let rules = load_rules(&dir.path().join("blobQs.csv")).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].questionaire_id, 3);
        assert_eq!(rules[0].column_no, 2);
    }

    #[test]
    fn test_anonymise_masks_flagged_cells() {
        let db = fixture_db();
        let rules_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        write_fixture_rules(rules_dir.path());

        let reports = anonymise_answers(&db, rules_dir.path(), out_dir.path()).unwrap();
        assert_eq!(reports.len(), 2);

        let blob_report = reports.iter().find(|r| r.source == "Answers_blob").unwrap();
        assert_eq!(blob_report.output, "answers_blob_anon");
        assert_eq!(blob_report.cells_masked, 1);

        // answer 9001 (questionnaire 3) has column "2" masked in the output
        let out = read_table(&blob_report.path, &blob_report.output).unwrap();
        let id_col = out.column_index("AnswerID").unwrap();
        let col2 = out.column_index("2").unwrap();
        let row = out.find_row_by_integer(id_col, 9001).unwrap();
        assert_eq!(out.get(row, col2).and_then(|v| v.as_text()), Some("a"));

        // answer 9002 (questionnaire 4) is untouched
        let row2 = out.find_row_by_integer(id_col, 9002).unwrap();
        assert_ne!(out.get(row2, col2).and_then(|v| v.as_text()), Some("a"));

        // the source table in the database is never modified
        let src = fetch_table(&db, DlrTable::AnswersBlob).unwrap();
        let src_row = src.find_row_by_integer(id_col, 9001).unwrap();
        assert_ne!(src.get(src_row, col2).and_then(|v| v.as_text()), Some("a"));
    }

    #[test]
    fn test_rule_naming_missing_column_fails() {
        let db = fixture_db();
        let rules_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        // column 42 does not exist in Answers_blob
        std::fs::write(
            rules_dir.path().join("blobQs.csv"),
            "QuestionaireID,ColumnNo,anonymise\n3,42,1\n",
        )
        .unwrap();
        std::fs::write(
            rules_dir.path().join("charQs.csv"),
            "QuestionaireID,ColumnNo,anonymise\n",
        )
        .unwrap();

        let err = anonymise_answers(&db, rules_dir.path(), out_dir.path());
        assert!(matches!(err, Err(DlrError::Rule(_))));
    }

    #[test]
    fn test_rule_for_missing_answer_row_fails() {
        let db = fixture_db();
        let rules_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        write_fixture_rules(rules_dir.path());
        // register an answer for questionnaire 3 that has no blob row
        db.execute("INSERT INTO Answers (AnswerID, QuestionaireID) VALUES (9099, 3)")
            .unwrap();

        let err = anonymise_answers(&db, rules_dir.path(), out_dir.path());
        assert!(matches!(err, Err(DlrError::Rule(_))));
    }

    #[test]
    fn test_missing_rule_file_fails() {
        let db = fixture_db();
        let rules_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let err = anonymise_answers(&db, rules_dir.path(), out_dir.path());
        assert!(matches!(err, Err(DlrError::Rule(_))));
    }
}
