use shared_types::StorageError;

use crate::csv;

/// One raw line from the batting CSV, keyed by player id. `offset` is the
/// record's byte position in the record file once it has been stored there.
#[derive(Debug, Clone)]
pub struct BattingRecord {
    pub player_id: String,
    pub line: String,
    pub offset: i64,
}

impl BattingRecord {
    pub fn new(player_id: String, line: String) -> Self {
        Self {
            player_id,
            line,
            offset: -1,
        }
    }
}

/// A fully parsed batting line. The trailing ten numeric columns are not
/// guaranteed to be present in the source data; missing values parse as -1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerBattingRecord {
    pub player_id: String,
    pub year: i32,
    pub stint: i32,
    pub team: String,
    pub league: String,
    pub games: i32,
    pub at_bats: i32,
    pub runs: i32,
    pub hits: i32,
    pub doubles: i32,
    pub triples: i32,
    pub home_runs: i32,
    pub rbi: i32,
    pub stolen_bases: i32,
    pub caught_stealing: i32,
    pub base_on_balls: i32,
    pub strike_outs: i32,
    pub intentional_walks: i32,
    pub hit_by_pitch: i32,
    pub sacrifice_hits: i32,
    pub sacrifice_flies: i32,
    pub ground_into_double_play: i32,
    pub games_played_in_field: i32,
}

impl PlayerBattingRecord {
    pub fn parse(line: &str) -> Result<Self, StorageError> {
        let columns = csv::parse_columns(line)?;
        Ok(Self {
            player_id: columns[csv::PLAYER_ID].to_string(),
            year: required(&columns, csv::YEAR)?,
            stint: required(&columns, csv::STINT)?,
            team: columns[csv::TEAM].to_string(),
            league: columns[csv::LEAGUE].to_string(),
            games: required(&columns, csv::GAMES)?,
            at_bats: required(&columns, csv::AT_BATS)?,
            runs: required(&columns, csv::RUNS)?,
            hits: required(&columns, csv::HITS)?,
            doubles: required(&columns, csv::DOUBLES)?,
            triples: required(&columns, csv::TRIPLES)?,
            home_runs: required(&columns, csv::HOME_RUNS)?,
            rbi: required(&columns, csv::RBI)?,
            stolen_bases: optional(&columns, csv::STOLEN_BASES)?,
            caught_stealing: optional(&columns, csv::CAUGHT_STEALING)?,
            base_on_balls: optional(&columns, csv::BASE_ON_BALLS)?,
            strike_outs: optional(&columns, csv::STRIKE_OUTS)?,
            intentional_walks: optional(&columns, csv::INTENTIONAL_WALKS)?,
            hit_by_pitch: optional(&columns, csv::HIT_BY_PITCH)?,
            sacrifice_hits: optional(&columns, csv::SACRIFICE_HITS)?,
            sacrifice_flies: optional(&columns, csv::SACRIFICE_FLIES)?,
            ground_into_double_play: optional(&columns, csv::GROUND_INTO_DOUBLE_PLAY)?,
            games_played_in_field: optional(&columns, csv::GAMES_PLAYED_IN_FIELD)?,
        })
    }

    /// Singles are not a column of their own; they are the hits left over
    /// after the extra-base hits.
    pub fn singles(&self) -> i32 {
        self.hits - (self.doubles + self.triples + self.home_runs)
    }

    pub fn batting_average(&self) -> f64 {
        if self.at_bats == 0 {
            0.0
        } else {
            f64::from(self.hits) / f64::from(self.at_bats)
        }
    }
}

fn required(columns: &[&str], index: usize) -> Result<i32, StorageError> {
    columns[index].trim().parse().map_err(|_| {
        StorageError::InvalidInput(format!(
            "column {} is not a number: {:?}",
            index, columns[index]
        ))
    })
}

fn optional(columns: &[&str], index: usize) -> Result<i32, StorageError> {
    if columns[index].trim().is_empty() {
        Ok(-1)
    } else {
        required(columns, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let line = "aaronha01,1954,1,ML1,NL,122,468,58,131,27,6,13,69,2,2,28,39,,3,6,4,13,122";
        let record = PlayerBattingRecord::parse(line).unwrap();
        assert_eq!(record.player_id, "aaronha01");
        assert_eq!(record.year, 1954);
        assert_eq!(record.hits, 131);
        assert_eq!(record.home_runs, 13);
        // Empty intentional walks column parses as -1.
        assert_eq!(record.intentional_walks, -1);
        assert_eq!(record.singles(), 131 - 27 - 6 - 13);
    }

    #[test]
    fn test_parse_rejects_bad_number() {
        let line = "aaronha01,xyz,1,ML1,NL,122,468,58,131,27,6,13,69,2,2,28,39,,3,6,4,13,122";
        assert!(matches!(
            PlayerBattingRecord::parse(line),
            Err(StorageError::InvalidInput(_))
        ));
    }
}
