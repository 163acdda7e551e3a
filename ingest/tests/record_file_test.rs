use std::io::Write;

use ingest::RecordFile;
use tempfile::{NamedTempFile, tempdir};

const AARON_1954: &str =
    "aaronha01,1954,1,ML1,NL,122,468,58,131,27,6,13,69,2,2,28,39,,3,6,4,13,122";
const AARON_1955: &str =
    "aaronha01,1955,1,ML1,NL,153,602,105,189,37,9,27,106,3,1,49,61,5,3,7,4,20,153";
const ABBOTT_1989: &str =
    "abbotji01,1989,1,CAL,AL,29,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,29";

#[test]
fn test_append_and_read_back() {
    let dir = tempdir().unwrap();
    let mut record_file = RecordFile::open(dir.path().join("records.dat")).unwrap();

    let first = record_file.append(AARON_1954).unwrap();
    let second = record_file.append(ABBOTT_1989).unwrap();
    assert_eq!(first, 0);
    assert!(second > first);

    let record = record_file.player_record(first).unwrap();
    assert_eq!(record.player_id, "aaronha01");
    assert_eq!(record.year, 1954);
    assert_eq!(record.hits, 131);

    let record = record_file.player_record(second).unwrap();
    assert_eq!(record.player_id, "abbotji01");
    assert_eq!(record.games, 29);
}

#[test]
fn test_import_csv_sets_offsets() {
    let mut csv = NamedTempFile::new().unwrap();
    writeln!(csv, "{}", AARON_1954).unwrap();
    writeln!(csv, "{}", AARON_1955).unwrap();
    writeln!(csv, "{}", ABBOTT_1989).unwrap();

    let dir = tempdir().unwrap();
    let mut record_file = RecordFile::open(dir.path().join("records.dat")).unwrap();
    let records = record_file.import_csv(csv.path()).unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].player_id, "aaronha01");
    assert_eq!(records[0].offset, 0);
    assert!(records[1].offset > records[0].offset);
    assert!(records[2].offset > records[1].offset);

    // Every stored offset reads back to the record it was produced for.
    for record in &records {
        let read = record_file.player_record(record.offset).unwrap();
        assert_eq!(read.player_id, record.player_id);
    }
}

#[test]
fn test_batting_summary_aggregates_consecutive_records() {
    let dir = tempdir().unwrap();
    let mut record_file = RecordFile::open(dir.path().join("records.dat")).unwrap();

    let first = record_file.append(AARON_1954).unwrap();
    record_file.append(AARON_1955).unwrap();
    let other = record_file.append(ABBOTT_1989).unwrap();

    let summary = record_file.batting_summary(first).unwrap();
    assert_eq!(summary.player_id, "aaronha01");
    assert_eq!(summary.years, 2);
    assert_eq!(summary.games, 122 + 153);
    assert_eq!(summary.at_bats, 468 + 602);
    assert_eq!(summary.doubles, 27 + 37);
    assert_eq!(summary.triples, 6 + 9);
    assert_eq!(summary.home_runs, 13 + 27);
    // Singles are the leftover hits: (131+189) total hits minus extra bases.
    assert_eq!(summary.singles, (131 + 189) - (27 + 37) - (6 + 9) - (13 + 27));
    let average = summary.batting_average();
    assert!((average - 320.0 / 1070.0).abs() < 1e-9);

    // The scan must stop at the next player's run.
    let summary = record_file.batting_summary(other).unwrap();
    assert_eq!(summary.player_id, "abbotji01");
    assert_eq!(summary.years, 1);
    assert_eq!(summary.games, 29);

    let printed = record_file.batting_summary(first).unwrap().to_string();
    assert!(printed.contains("Batting summary for: aaronha01"));
    assert!(printed.contains("Overall Batting Average: 0.299"));
}
