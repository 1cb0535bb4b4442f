//! Shared in-memory fixture database for tests
//!
//! Mirrors the DLR read surface: a strict 4-level group tree over two
//! survey years, three linked profiles, measurements across the first
//! months of each year, and a pair of answer tables with rule files.

use std::path::Path;

use crate::database::DatabaseConn;

/// Build an in-memory database with the DLR schema and a small, internally
/// consistent data set.
pub(crate) fn fixture_db() -> DatabaseConn {
    let db = DatabaseConn::open_in_memory().unwrap();

    let schema = [
        "CREATE TABLE LinkTable (ProfileID INTEGER, AnswerID INTEGER, GroupID INTEGER)",
        "CREATE TABLE \"Groups\" (GroupID INTEGER PRIMARY KEY, ParentID INTEGER, \
         GroupName TEXT, ContextID INTEGER)",
        "CREATE TABLE profiles (ProfileId INTEGER PRIMARY KEY, Active TEXT, \
         RecorderID TEXT, \"Unit of measurement\" INTEGER)",
        "CREATE TABLE ProfileUnitsOfMeasure (UnitsID INTEGER PRIMARY KEY, Description TEXT)",
        "CREATE TABLE Profiletable (ProfileID INTEGER, Datefield TEXT, \
         Unitsread REAL, Valid TEXT)",
        "CREATE TABLE Answers (AnswerID INTEGER PRIMARY KEY, QuestionaireID INTEGER)",
        "CREATE TABLE Answers_blob (AnswerID INTEGER PRIMARY KEY, \"1\" TEXT, \"2\" TEXT)",
        "CREATE TABLE Answers_char (AnswerID INTEGER PRIMARY KEY, \"1\" TEXT, \"2\" TEXT)",
    ];
    for sql in schema {
        db.execute(sql).unwrap();
    }

    // 4-level group tree: roots, survey types, years, locations.
    // ParentID NULL on one root exercises the root-marker normalization;
    // "Tembisa " exercises name trimming.
    let groups = [
        "INSERT INTO \"Groups\" VALUES (1, NULL, 'Domestic', NULL)",
        "INSERT INTO \"Groups\" VALUES (2, 0, 'Non-domestic', NULL)",
        "INSERT INTO \"Groups\" VALUES (10, 1, 'Eskom LR', NULL)",
        "INSERT INTO \"Groups\" VALUES (11, 1, 'NRS LR', NULL)",
        "INSERT INTO \"Groups\" VALUES (100, 10, '2012', NULL)",
        "INSERT INTO \"Groups\" VALUES (101, 10, '2013', NULL)",
        "INSERT INTO \"Groups\" VALUES (102, 11, '2012', NULL)",
        "INSERT INTO \"Groups\" VALUES (1000, 100, 'Tembisa ', 7)",
        "INSERT INTO \"Groups\" VALUES (1001, 101, 'Soweto', 7)",
        "INSERT INTO \"Groups\" VALUES (1002, 102, 'Windhoek', 8)",
    ];
    for sql in groups {
        db.execute(sql).unwrap();
    }

    // Profile links for 2012 (5001, 5002) and 2013 (5003); 5004 is linked
    // to group 0 and must never resolve. Answer links carry profile_id 0.
    let links = [
        "INSERT INTO LinkTable VALUES (5001, 0, 1000)",
        "INSERT INTO LinkTable VALUES (5002, 0, 1000)",
        "INSERT INTO LinkTable VALUES (5003, 0, 1001)",
        "INSERT INTO LinkTable VALUES (5004, 0, 0)",
        "INSERT INTO LinkTable VALUES (0, 9001, 1000)",
        "INSERT INTO LinkTable VALUES (0, 9002, 1002)",
        "INSERT INTO LinkTable VALUES (0, 0, 0)",
    ];
    for sql in links {
        db.execute(sql).unwrap();
    }

    let units = [
        "INSERT INTO ProfileUnitsOfMeasure VALUES (1, 'V avg')",
        "INSERT INTO ProfileUnitsOfMeasure VALUES (2, 'A avg')",
        "INSERT INTO ProfileUnitsOfMeasure VALUES (3, 'kVA avg')",
        "INSERT INTO ProfileUnitsOfMeasure VALUES (4, 'kW avg')",
        "INSERT INTO ProfileUnitsOfMeasure VALUES (5, 'Hz')",
    ];
    for sql in units {
        db.execute(sql).unwrap();
    }

    let profiles = [
        "INSERT INTO profiles VALUES (5001, 'Y', 'REC_A1', 1)",
        "INSERT INTO profiles VALUES (5002, 'Y', 'REC_A2', 4)",
        "INSERT INTO profiles VALUES (5003, 'N', 'REC_B1', 2)",
    ];
    for sql in profiles {
        db.execute(sql).unwrap();
    }

    // Measurements for the first three months of 2012 and January 2013.
    // 'N ' exercises flag trimming.
    let measurements = [
        "INSERT INTO Profiletable VALUES (5001, '2012-01-01 00:00:00', 231.2, 'Y')",
        "INSERT INTO Profiletable VALUES (5002, '2012-01-01 00:00:00', 3.4, 'Y')",
        "INSERT INTO Profiletable VALUES (5001, '2012-01-01 00:05:00', 229.9, 'N ')",
        "INSERT INTO Profiletable VALUES (5001, '2012-02-01 00:00:00', 230.4, 'Y')",
        "INSERT INTO Profiletable VALUES (5002, '2012-02-01 00:00:00', 3.1, 'Y')",
        "INSERT INTO Profiletable VALUES (5001, '2012-03-01 00:00:00', 232.0, 'Y')",
        "INSERT INTO Profiletable VALUES (5003, '2013-01-01 00:00:00', 12.7, 'Y')",
    ];
    for sql in measurements {
        db.execute(sql).unwrap();
    }

    let answers = [
        "INSERT INTO Answers VALUES (9001, 3)",
        "INSERT INTO Answers VALUES (9002, 4)",
        "INSERT INTO Answers_blob VALUES (9001, 'four people', '12 Main Rd')",
        "INSERT INTO Answers_blob VALUES (9002, 'two people', '7 Hill St')",
        "INSERT INTO Answers_char VALUES (9001, 'owner', 'P O Box 1')",
        "INSERT INTO Answers_char VALUES (9002, 'tenant', 'P O Box 2')",
    ];
    for sql in answers {
        db.execute(sql).unwrap();
    }

    db
}

/// Write the fixture anonymization rule files into `dir`.
///
/// `blobQs.csv` flags questionnaire 3 column 2 (and carries an unflagged
/// rule that must be ignored); `charQs.csv` flags questionnaire 4 column 2.
pub(crate) fn write_fixture_rules(dir: &Path) {
    std::fs::write(
        dir.join("blobQs.csv"),
        "QuestionaireID,ColumnNo,anonymise\n3,2,1\n3,1,0\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("charQs.csv"),
        "QuestionaireID,ColumnNo,anonymise\n4,2,1\n",
    )
    .unwrap();
}
