//! aptkv admin binary
//!
//! Inspect and maintain a storage directory from the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use aptkv::{Config, KvError, KvStore, PrefixReader, Reader, Storage, Writer};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// aptkv admin tool
#[derive(Parser, Debug)]
#[command(name = "aptkv")]
#[command(about = "Inspect and maintain an aptkv storage directory")]
#[command(version)]
struct Args {
    /// Storage directory
    #[arg(short, long, default_value = "./aptkv_data")]
    db: PathBuf,

    /// MemTable size limit in MB before flush
    #[arg(short = 'm', long, default_value = "4")]
    memtable_mb: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the value stored under a key
    Get {
        key: String,
    },

    /// Store a value under a key
    Put {
        key: String,
        value: String,
    },

    /// Delete a key
    Delete {
        key: String,
    },

    /// List pairs whose key starts with a prefix (all pairs by default)
    Scan {
        #[arg(default_value = "")]
        prefix: String,

        /// Print keys only
        #[arg(long)]
        keys_only: bool,
    },

    /// Merge all tables and drop deleted data
    Compact,

    /// Print engine counters
    Stats,

    /// Check every table, set damaged ones aside and rebuild the manifest
    Recover,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,aptkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(KvError::NotFound) => {
            eprintln!("not found");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> aptkv::Result<()> {
    let Args {
        db,
        memtable_mb,
        command,
    } = args;

    if let Commands::Recover = command {
        let report = KvStore::recover(&db)?;
        println!("tables kept: {}", report.tables_kept.len());
        for path in &report.tables_quarantined {
            println!("quarantined: {}", path.display());
        }
        return Ok(());
    }

    let config = Config::builder()
        .data_dir(db)
        .memtable_size_limit(memtable_mb * 1024 * 1024)
        .build();
    let store = KvStore::open_with(config)?;

    match command {
        Commands::Get { key } => {
            let value = store.get(key.as_bytes())?;
            println!("{}", escape(&value));
        }
        Commands::Put { key, value } => store.put(key.as_bytes(), value.as_bytes())?,
        Commands::Delete { key } => store.delete(key.as_bytes())?,
        Commands::Scan { prefix, keys_only } => {
            store.process_by_prefix(prefix.as_bytes(), &mut |key, value| {
                if keys_only {
                    println!("{}", escape(key));
                } else {
                    println!("{}\t{}", escape(key), escape(value));
                }
                Ok(())
            })?;
        }
        Commands::Compact => {
            let before = store.stats()?;
            store.compact_db()?;
            let after = store.stats()?;
            println!(
                "tables: {} -> {}, bytes: {} -> {}",
                before.sstable_count, after.sstable_count, before.sstable_bytes, after.sstable_bytes
            );
        }
        Commands::Stats => {
            let stats = store.stats()?;
            println!("memtable entries: {}", stats.memtable_entries);
            println!("memtable bytes:   {}", stats.memtable_bytes);
            println!("sstables:         {}", stats.sstable_count);
            println!("sstable bytes:    {}", stats.sstable_bytes);
        }
        Commands::Recover => {}
    }

    store.close()
}

/// Printable form of a byte string (non-printable bytes as `\xNN`)
fn escape(bytes: &[u8]) -> String {
    bytes
        .iter()
        .flat_map(|&b| std::ascii::escape_default(b))
        .map(char::from)
        .collect()
}
