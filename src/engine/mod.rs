//! Storage engine
//!
//! Ties the WAL, the memtable and the table set of one directory together.
//! Every change arrives as a write group (a put, a delete, a batch or a
//! transaction commit) which is logged, numbered and applied under one
//! lock. Reads go through the memtable and tables directly or through a
//! `ReadView` pinned at a point in time.

mod conflict;
mod view;

pub use conflict::SnapshotGuard;
pub use view::ReadView;

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::memtable::MemTable;
use crate::storage::{CompactionStats, RepairReport, StorageManager};
use crate::wal::{Operation, WalRecovery, WalWriter};

use conflict::ConflictTracker;

/// Point-in-time counters for one engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub memtable_bytes: usize,
    pub memtable_entries: usize,
    pub sstable_count: usize,
    pub sstable_bytes: u64,
    /// Number of write groups applied since open
    pub last_sequence: u64,
}

/// An open storage directory
///
/// ## Concurrency: one writer, many readers
///
/// - **Writes** (put/delete/batch/commit/flush/compact): Serialized by
///   `write_lock`. Order: write_lock → WAL → memtable → storage
///
/// - **Reads** (get, read views): No write_lock needed
///   - MemTable snapshots are an `Arc` clone under a short read lock
///   - SSTable readers are shared and seek under their own file mutex
///
/// A read view takes the memtable snapshot before the table list. A flush
/// publishes its table before clearing the memtable, so a view may see a
/// flushed entry twice but never miss it.
pub struct Engine {
    config: Config,

    /// `{data_dir}/sstables`
    storage_dir: PathBuf,

    wal: Mutex<WalWriter>,

    /// Writes not yet in a table
    memtable: MemTable,

    storage: StorageManager,

    /// Held for every write group, flush and compaction
    write_lock: Mutex<()>,

    /// Number of applied write groups
    sequence: AtomicU64,

    conflicts: Arc<Mutex<ConflictTracker>>,

    /// Held open for the exclusive advisory lock; released on drop
    _lock_file: File,
}

impl Engine {
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";
    const LOCK_FILENAME: &'static str = "LOCK";

    /// Open the directory named by `config`, creating it if needed
    ///
    /// On startup:
    /// 1. Validate config, create the data directory, take the lock
    /// 2. Load the live SSTables from the manifest
    /// 3. Replay the WAL, flush what it held, then truncate it
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;
        let lock_file = Self::lock_dir(&config.data_dir)?;

        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        let storage = StorageManager::open_with(
            &storage_dir,
            config.bloom_bits_per_key,
            config.verify_checksums,
        )?;
        let memtable = MemTable::new();

        let mut recovered = false;
        if wal_path.exists() {
            let (entries, result) = WalRecovery::recover(&wal_path)?;
            if result.entries_recovered > 0 || result.entries_corrupted > 0 {
                tracing::info!(
                    recovered = result.entries_recovered,
                    corrupted = result.entries_corrupted,
                    last_lsn = result.last_lsn,
                    "WAL recovery"
                );
            }

            for entry in entries {
                memtable.apply(entry.operation);
            }

            // Recovered data must be durable in a table before the WAL goes
            if !memtable.is_empty() {
                tracing::info!(entries = memtable.entry_count(), "flushing recovered entries");
                storage.flush(&memtable)?;
                memtable.clear();
                recovered = true;
            }
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;
        if recovered {
            wal.truncate()?;
        }

        tracing::info!(
            dir = %config.data_dir.display(),
            sstables = storage.sstable_count(),
            "engine opened"
        );

        Ok(Self {
            config,
            storage_dir,
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
            sequence: AtomicU64::new(0),
            conflicts: Arc::new(Mutex::new(ConflictTracker::default())),
            _lock_file: lock_file,
        })
    }

    /// Open `path` with every other setting at its default
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config {
            data_dir: path.to_path_buf(),
            ..Config::default()
        };
        Self::open(config)
    }

    /// Rebuild the table manifest of a directory that is not open
    ///
    /// Takes the directory lock for the duration, so it fails with
    /// `LockHeld` while a handle has the directory open.
    pub fn repair(data_dir: &Path) -> Result<RepairReport> {
        fs::create_dir_all(data_dir)?;
        let _lock = Self::lock_dir(data_dir)?;

        let report = StorageManager::repair(&data_dir.join(Self::SSTABLE_DIR))?;
        tracing::info!(
            dir = %data_dir.display(),
            kept = report.tables_kept.len(),
            quarantined = report.tables_quarantined.len(),
            "repair finished"
        );
        Ok(report)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current value of `key`, `None` when absent or deleted
    ///
    /// The memtable answers first, then tables from newest to oldest.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.memtable.get(key) {
            return Ok(entry.into_value());
        }
        Ok(self.storage.get(key)?.and_then(|entry| entry.into_value()))
    }

    /// Consistent view of everything written so far
    pub fn read_view(&self) -> ReadView {
        // Memtable first: see the type-level note on flush ordering
        let memtable = self.memtable.snapshot();
        let sstables = self.storage.tables();
        ReadView::new(memtable, sstables)
    }

    /// Read view plus a registration that lets `commit` detect conflicts
    pub fn begin_snapshot(&self) -> (ReadView, SnapshotGuard) {
        let _write_guard = self.write_lock.lock();
        let sequence = self.sequence.load(Ordering::SeqCst);
        let guard = SnapshotGuard::register(&self.conflicts, sequence);
        (self.read_view(), guard)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Upsert one key as its own write group
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    /// Delete a key (a tombstone; deleting an absent key is not an error)
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.write(Operation::Delete { key: key.to_vec() })
    }

    /// Apply a group of operations atomically, in order
    ///
    /// The group is one WAL record, so after a crash either all of it or
    /// none of it is recovered.
    pub fn write_batch(&self, operations: Vec<Operation>) -> Result<()> {
        match Self::group(operations) {
            Some(operation) => self.write(operation),
            None => Ok(()),
        }
    }

    /// Commit a transaction's buffered writes
    ///
    /// Fails with `TransactionConflict` and applies nothing if a write
    /// committed after the snapshot touched any key in `reads` or `writes`.
    pub fn commit(
        &self,
        snapshot: &SnapshotGuard,
        reads: &BTreeSet<Vec<u8>>,
        writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    ) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let _write_guard = self.write_lock.lock();

        let conflict = self.conflicts.lock().has_conflict(snapshot.sequence(), |key| {
            reads.contains(key) || writes.contains_key(key)
        });
        if conflict {
            tracing::debug!(
                snapshot = snapshot.sequence(),
                "transaction aborted by conflicting commit"
            );
            return Err(KvError::TransactionConflict);
        }

        let count = writes.len();
        let operations = writes
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => Operation::Put { key, value },
                None => Operation::Delete { key },
            })
            .collect();

        if let Some(operation) = Self::group(operations) {
            let sequence = self.write_locked(operation)?;
            tracing::debug!(sequence, writes = count, "transaction committed");
        }
        Ok(())
    }

    fn write(&self, operation: Operation) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.write_locked(operation).map(|_| ())
    }

    /// Internal write path (called with write lock held), returns the
    /// sequence assigned to the write
    fn write_locked(&self, operation: Operation) -> Result<u64> {
        // Logged before anything becomes visible
        self.wal.lock().append(&operation)?;

        // Open transactions need to know which keys this group touched
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut conflicts = self.conflicts.lock();
            if conflicts.is_tracking() {
                let keys = operation.keys().into_iter().map(<[u8]>::to_vec).collect();
                conflicts.record(sequence, keys);
            }
        }

        let new_size = self.memtable.apply(operation);

        // The write is logged and visible from here on and must report
        // success. A failed flush is retried by the next write, `flush`,
        // `compact` or `close`.
        if new_size >= self.config.memtable_size_limit {
            if let Err(e) = self.flush_internal() {
                tracing::warn!(
                    error = %e,
                    memtable_bytes = new_size,
                    "memtable flush failed, keeping entries in memory"
                );
            }
        }

        Ok(sequence)
    }

    /// One operation for a group: itself when alone, `Batch` otherwise
    fn group(mut operations: Vec<Operation>) -> Option<Operation> {
        match operations.len() {
            0 => None,
            1 => operations.pop(),
            _ => Some(Operation::Batch(operations)),
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Write the memtable out as a table now, whatever its size
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Flush with the write lock already held
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        // The table is published before the memtable is cleared
        self.storage.flush(&self.memtable)?;

        self.memtable.clear();
        // Everything logged so far is in a table
        self.wal.lock().truncate()?;

        Ok(())
    }

    /// Flush, then merge every table into one
    ///
    /// Views taken earlier keep reading the replaced tables until dropped.
    pub fn compact(&self) -> Result<CompactionStats> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()?;

        let stats = self.storage.compact()?;
        tracing::info!(
            tables_before = stats.tables_before,
            tables_after = stats.tables_after,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "compaction finished"
        );
        Ok(stats)
    }

    /// Flush, sync and release the directory
    ///
    /// Flushes any pending data and syncs to disk; the directory lock is
    /// released when the engine is dropped at the end of this call.
    pub fn close(self) -> Result<()> {
        self.flush()?;
        self.wal.lock().sync()?;
        tracing::info!(dir = %self.config.data_dir.display(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            memtable_bytes: self.memtable.size(),
            memtable_entries: self.memtable.entry_count(),
            sstable_count: self.storage.sstable_count(),
            sstable_bytes: self.storage.total_bytes(),
            last_sequence: self.sequence.load(Ordering::SeqCst),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Directory holding the tables and the manifest
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Approximate bytes buffered in the memtable
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Number of live tables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Take the exclusive advisory lock on `dir`
    pub(crate) fn lock_dir(dir: &Path) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(dir.join(Self::LOCK_FILENAME))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(file),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(KvError::LockHeld(dir.to_path_buf()))
            }
            Err(e) => Err(KvError::Io(e)),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("data_dir", &self.config.data_dir)
            .field("stats", &self.stats())
            .finish()
    }
}
