//! Storage Manager
//!
//! Manages multiple SSTables and coordinates reads/writes.
//!
//! ## Responsibilities
//! - Load the live SSTable set from the manifest on startup
//! - Search SSTables newest → oldest for reads
//! - Create new SSTables from MemTable flushes
//! - Full compaction into a single table
//! - Offline repair of a damaged table set

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{KvError, Result};
use crate::memtable::{MemTable, MemTableEntry};
use crate::scan::{EntrySource, MergeIterator};

use super::sstable::DEFAULT_BLOOM_BITS;
use super::{Manifest, SSTable, SSTableBuilder, SSTableReader};

/// A table in the live set
struct LiveTable {
    id: u64,
    reader: Arc<SSTableReader>,
}

/// Outcome of a full compaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub tables_before: usize,
    pub tables_after: usize,
    pub entries_written: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Outcome of an offline repair
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    /// Tables kept in the rebuilt manifest, newest first
    pub tables_kept: Vec<u64>,
    /// Damaged table files moved aside (renamed with a `.corrupt` suffix)
    pub tables_quarantined: Vec<PathBuf>,
}

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: Protected by RwLock (many concurrent readers, exclusive writer)
/// - `next_sstable_id`: Atomic counter (lock-free)
/// - Flush and compaction are serialized by the engine's write lock
pub struct StorageManager {
    /// Directory where SSTables and the manifest are stored
    data_dir: PathBuf,

    /// Live tables, ordered newest → oldest
    sstables: RwLock<Vec<LiveTable>>,

    /// Next ID for creating new SSTables (atomic, lock-free)
    next_sstable_id: AtomicU64,

    bloom_bits_per_key: usize,
}

impl StorageManager {
    /// Open or create storage in the given directory with default settings
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, DEFAULT_BLOOM_BITS, false)
    }

    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Read the manifest (or adopt every table file if there is none)
    /// 3. Open readers for each live table (loads indexes into RAM)
    /// 4. Delete table files the manifest doesn't name (crashed flush/compaction)
    pub fn open_with(path: &Path, bloom_bits_per_key: usize, verify_checksums: bool) -> Result<Self> {
        fs::create_dir_all(path)?;

        let on_disk = Self::discover(path)?;
        let max_seen = Self::highest_id_seen(path)?.unwrap_or(0);
        let manifest = Manifest::load(path)?;
        let had_manifest = manifest.is_some();

        let manifest = manifest.unwrap_or_else(|| Manifest {
            next_sstable_id: 0,
            sstables: on_disk.iter().rev().copied().collect(),
        });

        let mut sstables = Vec::with_capacity(manifest.sstables.len());
        for &id in &manifest.sstables {
            let table_path = Self::sstable_path_with_dir(path, id);
            if !table_path.exists() {
                return Err(KvError::Corruption(format!(
                    "manifest references missing table {}",
                    table_path.display()
                )));
            }
            let reader = SSTableReader::open(&table_path)?;
            if verify_checksums {
                reader.verify()?;
            }
            sstables.push(LiveTable {
                id,
                reader: Arc::new(reader),
            });
        }

        let live: BTreeSet<u64> = manifest.sstables.iter().copied().collect();
        for id in on_disk.difference(&live) {
            let orphan = Self::sstable_path_with_dir(path, *id);
            tracing::warn!(path = %orphan.display(), "removing orphaned SSTable");
            fs::remove_file(&orphan)?;
        }

        // Next ID = past everything ever seen, starting at 1
        let next_id = manifest.next_sstable_id.max(max_seen + 1).max(1);

        let manager = Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
            bloom_bits_per_key,
        };

        if !had_manifest {
            manager.store_manifest(&manifest.sstables)?;
        }

        Ok(manager)
    }

    /// Get the entry for a key (searches all SSTables newest → oldest)
    ///
    /// Returns:
    /// - `Ok(Some(Value))`: newest version is a value
    /// - `Ok(Some(Tombstone))`: newest version is a deletion
    /// - `Ok(None)`: no table knows the key
    pub fn get(&self, key: &[u8]) -> Result<Option<MemTableEntry>> {
        let sstables = self.sstables.read();

        for table in sstables.iter() {
            if let Some(entry) = table.reader.get(key)? {
                return Ok(Some(entry));
            }
        }

        Ok(None)
    }

    /// Current live tables, newest first
    pub fn tables(&self) -> Vec<Arc<SSTableReader>> {
        self.sstables
            .read()
            .iter()
            .map(|t| Arc::clone(&t.reader))
            .collect()
    }

    /// Flush a MemTable to a new SSTable
    ///
    /// Creates a new SSTable file from the MemTable's sorted entries, records
    /// it in the manifest, and adds it to the front of the list.
    pub fn flush(&self, memtable: &MemTable) -> Result<SSTable> {
        if memtable.is_empty() {
            return Err(KvError::Storage("Cannot flush empty MemTable".to_string()));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);

        // Entries are already sorted (BTreeMap)
        let mut builder = SSTableBuilder::with_bloom_bits(&path, self.bloom_bits_per_key)?;
        for (key, entry) in memtable.iter() {
            match entry {
                MemTableEntry::Value(v) => builder.add(&key, &v)?,
                MemTableEntry::Tombstone => builder.add_tombstone(&key)?,
            }
        }
        let metadata = builder.finish()?;
        let reader = Arc::new(SSTableReader::open(&path)?);

        let mut sstables = self.sstables.write();
        let mut ids: Vec<u64> = sstables.iter().map(|t| t.id).collect();
        ids.insert(0, id);
        if let Err(e) = self.store_manifest(&ids) {
            reader.mark_obsolete();
            return Err(e);
        }
        sstables.insert(0, LiveTable { id, reader });

        tracing::debug!(
            id,
            entries = metadata.entry_count,
            bytes = metadata.file_size,
            "flushed memtable to SSTable"
        );
        Ok(metadata)
    }

    /// Merge every live table into one, dropping tombstones and shadowed
    /// versions
    ///
    /// Must not run concurrently with `flush`.
    pub fn compact(&self) -> Result<CompactionStats> {
        let before: Vec<(u64, Arc<SSTableReader>)> = self
            .sstables
            .read()
            .iter()
            .map(|t| (t.id, Arc::clone(&t.reader)))
            .collect();

        let mut stats = CompactionStats {
            tables_before: before.len(),
            bytes_before: before.iter().map(|(_, r)| r.file_size()).sum(),
            ..CompactionStats::default()
        };
        if before.is_empty() {
            return Ok(stats);
        }

        let sources: Vec<EntrySource> = before
            .iter()
            .map(|(_, reader)| Box::new(reader.iter()) as EntrySource)
            .collect();

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);
        let mut builder = SSTableBuilder::with_bloom_bits(&path, self.bloom_bits_per_key)?;
        for item in MergeIterator::new(sources) {
            let (key, value) = item?;
            builder.add(&key, &value)?;
        }

        let replacement = if builder.entry_count() == 0 {
            drop(builder);
            fs::remove_file(&path)?;
            None
        } else {
            let metadata = builder.finish()?;
            stats.entries_written = metadata.entry_count;
            stats.bytes_after = metadata.file_size;
            Some(LiveTable {
                id,
                reader: Arc::new(SSTableReader::open(&path)?),
            })
        };

        let mut sstables = self.sstables.write();
        let ids: Vec<u64> = replacement.iter().map(|t| t.id).collect();
        if let Err(e) = self.store_manifest(&ids) {
            if let Some(table) = &replacement {
                table.reader.mark_obsolete();
            }
            return Err(e);
        }
        for table in sstables.iter() {
            table.reader.mark_obsolete();
        }
        *sstables = replacement.into_iter().collect();
        stats.tables_after = sstables.len();

        Ok(stats)
    }

    /// Rebuild the manifest from the table files in `path`
    ///
    /// Every table is opened and checksummed; damaged ones are renamed with
    /// a `.corrupt` suffix and left out. Must not run while the directory is
    /// open.
    pub fn repair(path: &Path) -> Result<RepairReport> {
        fs::create_dir_all(path)?;
        let mut report = RepairReport::default();

        for id in Self::discover(path)?.into_iter().rev() {
            let table_path = Self::sstable_path_with_dir(path, id);
            let checked = SSTableReader::open(&table_path).and_then(|reader| reader.verify());
            match checked {
                Ok(()) => report.tables_kept.push(id),
                Err(e) => {
                    let quarantined = table_path.with_extension("sst.corrupt");
                    tracing::warn!(
                        path = %table_path.display(),
                        error = %e,
                        "quarantining damaged SSTable"
                    );
                    fs::rename(&table_path, &quarantined)?;
                    report.tables_quarantined.push(quarantined);
                }
            }
        }

        // Quarantined ids stay reserved
        let previous = Manifest::load(path).ok().flatten().map_or(0, |m| m.next_sstable_id);
        let next_sstable_id = Self::highest_id_seen(path)?.map_or(1, |id| id + 1).max(previous);
        Manifest {
            next_sstable_id,
            sstables: report.tables_kept.clone(),
        }
        .store(path)?;

        Ok(report)
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Total bytes of live table files
    pub fn total_bytes(&self) -> u64 {
        self.sstables.read().iter().map(|t| t.reader.file_size()).sum()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next SSTable ID (for testing/debugging)
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn store_manifest(&self, ids: &[u64]) -> Result<()> {
        Manifest {
            next_sstable_id: self.next_sstable_id.load(Ordering::SeqCst),
            sstables: ids.to_vec(),
        }
        .store(&self.data_dir)
    }

    /// Ids of every table file in the directory, ascending
    fn discover(path: &Path) -> Result<BTreeSet<u64>> {
        let mut ids = BTreeSet::new();
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_path.is_file() {
                if let Some(id) = Self::parse_sstable_id(&file_path) {
                    ids.insert(id);
                }
            }
        }
        Ok(ids)
    }

    /// Highest id among live and quarantined table files
    fn highest_id_seen(path: &Path) -> Result<Option<u64>> {
        let mut highest = None;
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            let id = Self::parse_sstable_id(&file_path).or_else(|| Self::parse_quarantined_id(&file_path));
            if let Some(id) = id {
                highest = highest.max(Some(id));
            }
        }
        Ok(highest)
    }

    /// Generate the file path for an SSTable with given ID
    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    /// Generate SSTable path given a directory and ID
    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// Parse SSTable ID from filename
    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("sstable_")?;
        id_str.parse().ok()
    }

    /// "sstable_000042.sst.corrupt" → Some(42)
    fn parse_quarantined_id(path: &Path) -> Option<u64> {
        let name = path.file_name()?.to_str()?;
        name.strip_prefix("sstable_")?
            .strip_suffix(".sst.corrupt")?
            .parse()
            .ok()
    }
}
