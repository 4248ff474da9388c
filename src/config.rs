//! Configuration for aptkv
//!
//! One `Config` per storage handle. Build it with `Config::builder()` or
//! start from `Config::default()` and override fields.

use std::path::PathBuf;

use crate::error::{KvError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Layout
    // -------------------------------------------------------------------------
    /// Directory owned by the handle:
    ///   {data_dir}/
    ///     ├── LOCK             (held while the handle is open)
    ///     ├── wal.log
    ///     └── sstables/        (tables + MANIFEST)
    pub data_dir: PathBuf,

    /// Where `create_temporary` makes scratch directories; the system temp
    /// dir when unset
    pub temp_dir: Option<PathBuf>,

    // -------------------------------------------------------------------------
    // Durability
    // -------------------------------------------------------------------------
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // Memory
    // -------------------------------------------------------------------------
    /// Approximate memtable bytes that trigger a flush
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Tables
    // -------------------------------------------------------------------------
    /// Bloom filter density; 0 writes tables without a filter
    pub bloom_bits_per_key: usize,

    /// Check every table's data checksum at open instead of trusting it
    pub verify_checksums: bool,
}

/// When the WAL is fsynced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// After every write group; nothing acknowledged is lost on power failure
    EveryWrite,

    /// After `count` write groups; a crash may lose up to `count - 1`
    /// acknowledged groups, but never part of one
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./aptkv_data"),
            temp_dir: None,
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 4 * 1024 * 1024,
            bloom_bits_per_key: 10,
            verify_checksums: false,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.memtable_size_limit == 0 {
            return Err(KvError::Config(
                "memtable_size_limit must be greater than zero".to_string(),
            ));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(KvError::Config(
                "EveryNEntries sync count must be greater than zero".to_string(),
            ));
        }
        if self.bloom_bits_per_key > 64 {
            return Err(KvError::Config(format!(
                "bloom_bits_per_key must be at most 64, got {}",
                self.bloom_bits_per_key
            )));
        }
        Ok(())
    }
}

/// Chained setters over `Config::default()`
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(path.into());
        self
    }

    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Flush threshold in bytes
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    pub fn bloom_bits_per_key(mut self, bits: usize) -> Self {
        self.config.bloom_bits_per_key = bits;
        self
    }

    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.config.verify_checksums = verify;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
