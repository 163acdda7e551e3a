use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::info;

use bptree::{BPlusTree, DirRemoteStore, IndexManifest};
use ingest::{BattingConverter, KEY_LENGTH, RECORD_LENGTH, RecordFile};
use shared_types::StorageError;

#[derive(Parser)]
#[command(
    name = "indexer",
    about = "Builds and queries a B+ tree index over batting records"
)]
struct Cli {
    /// Node file holding the index
    #[arg(long, default_value = "batting.idx")]
    index: PathBuf,

    /// Record data file holding the raw batting lines
    #[arg(long, default_value = "batting.dat")]
    data: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a batting CSV file and build the index
    Build {
        csv: PathBuf,
        /// Tree order (maximum fan-out of an internal node)
        #[arg(long, default_value_t = 7)]
        order: usize,
    },
    /// Look up one player and print a career batting summary
    Get { player_id: String },
    /// List the players within an inclusive id range
    Range { lo: String, hi: String },
    /// Copy the finished index to a remote destination and seal it
    Sync { dest: PathBuf },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), StorageError> {
    match cli.command {
        Command::Build { csv, order } => {
            let manifest = IndexManifest::new(order, KEY_LENGTH, RECORD_LENGTH);
            manifest.save_to_file(manifest_path(&cli.index))?;
            let mut record_file = RecordFile::open(&cli.data)?;
            let mut tree = BPlusTree::open(&cli.index, order, BattingConverter)?;
            let records = record_file.import_csv(&csv)?;
            let total = records.len();
            // A player's stints sit on consecutive lines; the index points at
            // the first one, where the summary scan starts.
            let mut indexed = 0usize;
            let mut last_id: Option<String> = None;
            for record in records {
                if last_id.as_deref() != Some(record.player_id.as_str()) {
                    tree.insert(record.player_id.clone(), record.offset)?;
                    indexed += 1;
                    last_id = Some(record.player_id);
                }
            }
            info!("stored {total} batting records, indexed {indexed} players");
            Ok(())
        }
        Command::Get { player_id } => {
            let mut tree = open_tree(&cli.index)?;
            match tree.search(&player_id)? {
                Some(offset) => {
                    let mut record_file = RecordFile::open(&cli.data)?;
                    println!("{}", record_file.batting_summary(offset)?);
                }
                None => println!("{player_id}: no batting records"),
            }
            Ok(())
        }
        Command::Range { lo, hi } => {
            let mut tree = open_tree(&cli.index)?;
            let mut record_file = RecordFile::open(&cli.data)?;
            for offset in tree.range(&lo, &hi)? {
                let record = record_file.player_record(offset)?;
                println!("{}\t{}", record.player_id, offset);
            }
            Ok(())
        }
        Command::Sync { dest } => {
            let mut tree = open_tree(&cli.index)?;
            tree.sync(Box::new(DirRemoteStore::new(dest)))?;
            info!("index synced and sealed");
            Ok(())
        }
    }
}

fn open_tree(index: &Path) -> Result<BPlusTree<String, i64, BattingConverter>, StorageError> {
    let manifest = IndexManifest::load_from_file(manifest_path(index))?;
    BPlusTree::open(index, manifest.order, BattingConverter)
}

fn manifest_path(index: &Path) -> PathBuf {
    index.with_extension("manifest")
}
