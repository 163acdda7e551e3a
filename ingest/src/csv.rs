//! Parser for the comma-separated batting record format.

use std::{
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::Path,
};

use shared_types::StorageError;

use crate::record::BattingRecord;

// Column order of the batting format.
pub const NUM_COLUMNS: usize = 23;
pub const PLAYER_ID: usize = 0;
pub const YEAR: usize = 1;
pub const STINT: usize = 2;
pub const TEAM: usize = 3;
pub const LEAGUE: usize = 4;
pub const GAMES: usize = 5;
pub const AT_BATS: usize = 6;
pub const RUNS: usize = 7;
pub const HITS: usize = 8;
pub const DOUBLES: usize = 9;
pub const TRIPLES: usize = 10;
pub const HOME_RUNS: usize = 11;
pub const RBI: usize = 12;
pub const STOLEN_BASES: usize = 13;
pub const CAUGHT_STEALING: usize = 14;
pub const BASE_ON_BALLS: usize = 15;
pub const STRIKE_OUTS: usize = 16;
pub const INTENTIONAL_WALKS: usize = 17;
pub const HIT_BY_PITCH: usize = 18;
pub const SACRIFICE_HITS: usize = 19;
pub const SACRIFICE_FLIES: usize = 20;
pub const GROUND_INTO_DOUBLE_PLAY: usize = 21;
pub const GAMES_PLAYED_IN_FIELD: usize = 22;

/// Splits a batting line into its columns, requiring the full column count.
pub fn parse_columns(line: &str) -> Result<Vec<&str>, StorageError> {
    let columns: Vec<&str> = line.split(',').collect();
    if columns.len() < NUM_COLUMNS {
        return Err(StorageError::InvalidInput(format!(
            "expected {} columns, got {}",
            NUM_COLUMNS,
            columns.len()
        )));
    }
    Ok(columns)
}

/// Line-by-line reader over a batting CSV file, yielding one raw record per
/// line. Blank lines are skipped.
pub struct BattingCsvParser {
    lines: Lines<BufReader<File>>,
}

impl BattingCsvParser {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
        })
    }
}

impl Iterator for BattingCsvParser {
    type Item = Result<BattingRecord, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(parse_columns(&line).map(|columns| {
                BattingRecord::new(columns[PLAYER_ID].to_string(), line.to_string())
            }));
        }
    }
}
