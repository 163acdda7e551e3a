use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use shared_types::StorageError;

use crate::{
    csv::BattingCsvParser,
    record::{BattingRecord, PlayerBattingRecord},
};

/// Append-only store of raw batting lines. Record format: `[length(4)]
/// [utf-8 line bytes]`. The byte offset of a record is its identity and is
/// what the tree stores as the value for the player id.
pub struct RecordFile {
    file: File,
}

impl RecordFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// Appends one line and returns the offset it was stored at.
    pub fn append(&mut self, line: &str) -> Result<i64, StorageError> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_u32::<LittleEndian>(line.len() as u32)?;
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        Ok(offset as i64)
    }

    /// Imports every record from the CSV file, storing each line and setting
    /// its offset.
    pub fn import_csv<P: AsRef<Path>>(
        &mut self,
        csv_path: P,
    ) -> Result<Vec<BattingRecord>, StorageError> {
        let mut records = Vec::new();
        for parsed in BattingCsvParser::open(csv_path)? {
            let mut record = parsed?;
            record.offset = self.append(&record.line)?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn player_record(&mut self, offset: i64) -> Result<PlayerBattingRecord, StorageError> {
        let line = self.read_line_at(offset as u64)?;
        PlayerBattingRecord::parse(&line)
    }

    /// Aggregates the run of consecutive records for the player whose first
    /// record sits at `offset`. The source data keeps a player's stints
    /// adjacent, so the scan stops at the first foreign record or at end of
    /// file.
    pub fn batting_summary(&mut self, offset: i64) -> Result<BattingSummary, StorageError> {
        let mut record = self.player_record(offset)?;
        let mut summary = BattingSummary::new(record.player_id.clone());
        loop {
            summary.add(&record);
            let position = self.file.stream_position()?;
            if position >= self.file.metadata()?.len() {
                break;
            }
            let line = self.read_line_at(position)?;
            let next = PlayerBattingRecord::parse(&line)?;
            if next.player_id != summary.player_id {
                break;
            }
            record = next;
        }
        Ok(summary)
    }

    fn read_line_at(&mut self, offset: u64) -> Result<String, StorageError> {
        self.file.seek(SeekFrom::Start(offset))?;
        let length = self.file.read_u32::<LittleEndian>()? as usize;
        let mut buf = vec![0u8; length];
        self.file.read_exact(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|_| StorageError::CorruptedData("record line is not valid UTF-8".to_string()))
    }
}

/// Career totals over one player's consecutive records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattingSummary {
    pub player_id: String,
    pub years: i32,
    pub games: i32,
    pub at_bats: i32,
    pub singles: i32,
    pub doubles: i32,
    pub triples: i32,
    pub home_runs: i32,
}

impl BattingSummary {
    fn new(player_id: String) -> Self {
        Self {
            player_id,
            years: 0,
            games: 0,
            at_bats: 0,
            singles: 0,
            doubles: 0,
            triples: 0,
            home_runs: 0,
        }
    }

    fn add(&mut self, record: &PlayerBattingRecord) {
        self.years += 1;
        self.games += record.games;
        self.at_bats += record.at_bats;
        self.singles += record.singles();
        self.doubles += record.doubles;
        self.triples += record.triples;
        self.home_runs += record.home_runs;
    }

    pub fn batting_average(&self) -> f64 {
        if self.at_bats == 0 {
            0.0
        } else {
            f64::from(self.singles + self.doubles + self.triples + self.home_runs)
                / f64::from(self.at_bats)
        }
    }
}

impl fmt::Display for BattingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batting summary for: {}", self.player_id)?;
        writeln!(f, "Number of years played: {}", self.years)?;
        writeln!(f, "Total Games: {}", self.games)?;
        writeln!(f, "Total at bats: {}", self.at_bats)?;
        writeln!(f, "Total singles: {}", self.singles)?;
        writeln!(f, "Total doubles: {}", self.doubles)?;
        writeln!(f, "Total triples: {}", self.triples)?;
        writeln!(f, "Total Home runs: {}", self.home_runs)?;
        write!(f, "Overall Batting Average: {:.3}", self.batting_average())
    }
}
