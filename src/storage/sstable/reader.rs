//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups via in-memory
//! index, with a bloom filter in front of it.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{KvError, Result};
use crate::memtable::MemTableEntry;

use super::iterator::SSTableIterator;
use super::{
    read_u32, read_u64, BloomFilter, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION,
};

/// Reader for SSTable files with in-memory index for O(log n) lookups
///
/// Shared through `Arc` by the storage manager and by open snapshots; the
/// file handle sits behind a mutex because lookups seek.
pub struct SSTableReader {
    path: PathBuf,
    /// `None` only while being dropped
    file: Mutex<Option<BufReader<File>>>,
    /// In-memory index: key → file offset
    pub(super) index: BTreeMap<Vec<u8>, u64>,
    bloom: BloomFilter,
    entry_count: u64,
    /// Index block starting offset (end of the data block)
    index_offset: u64,
    data_crc: u32,
    file_size: u64,
    /// Set once compaction replaced this table; the file goes with the last reference
    obsolete: AtomicBool,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Loads the entire index and the bloom filter into memory, checking
    /// their checksum.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(KvError::Corruption(format!(
                "{}: file too small ({} bytes)",
                path.display(),
                file_size
            )));
        }

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(KvError::Corruption(format!(
                "{}: invalid SSTable magic {:?}",
                path.display(),
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(KvError::Corruption(format!(
                "{}: unsupported SSTable version {}",
                path.display(),
                version
            )));
        }

        let entry_count = read_u64(&header, 6);

        // Footer
        file.seek(SeekFrom::Start(file_size - FOOTER_SIZE))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = read_u64(&footer, 0);
        let bloom_offset = read_u64(&footer, 8);
        let data_crc = read_u32(&footer, 16);
        let meta_crc = read_u32(&footer, 20);

        let meta_end = file_size - FOOTER_SIZE;
        if index_offset < HEADER_SIZE || bloom_offset < index_offset || bloom_offset > meta_end {
            return Err(KvError::Corruption(format!(
                "{}: bad footer offsets (index {}, bloom {}, size {})",
                path.display(),
                index_offset,
                bloom_offset,
                file_size
            )));
        }

        // Index + bloom blocks are contiguous and share one checksum
        file.seek(SeekFrom::Start(index_offset))?;
        let mut meta = vec![0u8; (meta_end - index_offset) as usize];
        file.read_exact(&mut meta)?;

        if crc32fast::hash(&meta) != meta_crc {
            return Err(KvError::Corruption(format!(
                "{}: index checksum mismatch",
                path.display()
            )));
        }

        let split = (bloom_offset - index_offset) as usize;
        let index = Self::parse_index(path, &meta[..split], index_offset)?;
        if index.len() as u64 != entry_count {
            return Err(KvError::Corruption(format!(
                "{}: header counts {} entries, index has {}",
                path.display(),
                entry_count,
                index.len()
            )));
        }
        let bloom = BloomFilter::decode(&meta[split..])?;

        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(Some(BufReader::new(file))),
            index,
            bloom,
            entry_count,
            index_offset,
            data_crc,
            file_size,
            obsolete: AtomicBool::new(false),
        })
    }

    /// Parse index entries: [key_len(4)][offset(8)][key]
    fn parse_index(path: &Path, data: &[u8], data_end: u64) -> Result<BTreeMap<Vec<u8>, u64>> {
        let truncated = || KvError::Corruption(format!("{}: truncated index block", path.display()));

        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos < data.len() {
            if pos + 12 > data.len() {
                return Err(truncated());
            }
            let key_len = read_u32(data, pos) as usize;
            let offset = read_u64(data, pos + 4);
            pos += 12;

            if pos + key_len > data.len() {
                return Err(truncated());
            }
            if offset < HEADER_SIZE || offset >= data_end {
                return Err(KvError::Corruption(format!(
                    "{}: index offset {} outside data block",
                    path.display(),
                    offset
                )));
            }
            index.insert(data[pos..pos + key_len].to_vec(), offset);
            pos += key_len;
        }
        Ok(index)
    }

    /// Get the entry for a key: bloom check, then O(log n) index lookup
    ///
    /// Returns:
    /// - `Ok(Some(Value))`: key found with value
    /// - `Ok(Some(Tombstone))`: key deleted as of this table
    /// - `Ok(None)`: key not in this SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<MemTableEntry>> {
        if !self.might_contain(key) {
            return Ok(None);
        }
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(None),
        };
        let (_, entry) = self.read_entry_at(offset)?;
        Ok(Some(entry))
    }

    /// Read the entry stored at a data-block offset
    pub(crate) fn read_entry_at(&self, offset: u64) -> Result<(Vec<u8>, MemTableEntry)> {
        let mut guard = self.file.lock();
        let file = guard
            .as_mut()
            .ok_or_else(|| KvError::Storage(format!("{} is closed", self.path.display())))?;

        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let key_len = read_u32(&header, 0) as u64;
        let val_len = read_u32(&header, 4);

        let value_len = if val_len == TOMBSTONE_MARKER { 0 } else { val_len as u64 };
        if offset + 8 + key_len + value_len > self.index_offset {
            return Err(KvError::Corruption(format!(
                "{}: entry at {} overruns data block",
                self.path.display(),
                offset
            )));
        }

        let mut key = vec![0u8; key_len as usize];
        file.read_exact(&mut key)?;

        if val_len == TOMBSTONE_MARKER {
            return Ok((key, MemTableEntry::Tombstone));
        }

        let mut value = vec![0u8; val_len as usize];
        file.read_exact(&mut value)?;
        Ok((key, MemTableEntry::Value(value)))
    }

    /// Re-read the whole data block and check it against the footer CRC
    pub fn verify(&self) -> Result<()> {
        let mut guard = self.file.lock();
        let file = guard
            .as_mut()
            .ok_or_else(|| KvError::Storage(format!("{} is closed", self.path.display())))?;

        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut remaining = self.index_offset - HEADER_SIZE;
        let mut hasher = crc32fast::Hasher::new();
        let mut buf = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let chunk = remaining.min(buf.len() as u64) as usize;
            file.read_exact(&mut buf[..chunk])?;
            hasher.update(&buf[..chunk]);
            remaining -= chunk as u64;
        }

        let actual = hasher.finalize();
        if actual != self.data_crc {
            return Err(KvError::Corruption(format!(
                "{}: data checksum mismatch (expected {:08x}, got {:08x})",
                self.path.display(),
                self.data_crc,
                actual
            )));
        }
        Ok(())
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Size of the file on disk
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the minimum key in this SSTable (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Get the maximum key in this SSTable (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Quick check if a key might be in this SSTable (range + bloom)
    /// Returns false only if the key is definitely absent
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max && self.bloom.may_contain(key),
            _ => false, // Empty SSTable
        }
    }

    /// True when some key of this table may fall within the bounds
    pub fn overlaps(&self, start: &Bound<Vec<u8>>, end: &Bound<Vec<u8>>) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => crate::scan::overlaps(min, max, start, end),
            _ => false,
        }
    }

    /// Iterate over all entries in key order (tombstones included)
    pub fn iter(self: &Arc<Self>) -> SSTableIterator {
        SSTableIterator::new(Arc::clone(self), Bound::Unbounded, Bound::Unbounded)
    }

    /// Iterate over entries within the bounds
    pub fn range(self: &Arc<Self>, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> SSTableIterator {
        SSTableIterator::new(Arc::clone(self), start, end)
    }

    /// Delete the file once the last reference to this reader is gone
    pub(crate) fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }
}

impl Drop for SSTableReader {
    fn drop(&mut self) {
        if !self.obsolete.load(Ordering::Acquire) {
            return;
        }
        // Close the handle before unlinking
        self.file.get_mut().take();
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed obsolete SSTable"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove obsolete SSTable"
            ),
        }
    }
}
