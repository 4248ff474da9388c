//! SSTable Builder
//!
//! Streams entries in ascending key order into a new table file, then
//! appends the index, the bloom filter and the footer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{KvError, Result};

use super::{
    BloomFilter, SSTable, DEFAULT_BLOOM_BITS, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION,
};

/// Writes one SSTable; dropped without `finish` it leaves an unusable file
/// that the manifest never names
pub struct SSTableBuilder {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Offset the next entry is written at
    offset: u64,
    /// (key, entry offset) per entry, becomes the index block
    index: Vec<(Vec<u8>, u64)>,
    key_hashes: Vec<u32>,
    bloom_bits_per_key: usize,
    data_crc: crc32fast::Hasher,
    /// Reused encoding buffer
    scratch: Vec<u8>,
}

impl SSTableBuilder {
    /// Builder with the default bloom filter density
    pub fn new(path: &Path) -> Result<Self> {
        Self::with_bloom_bits(path, DEFAULT_BLOOM_BITS)
    }

    /// Builder with `bits_per_key` bloom bits (0 disables the filter)
    ///
    /// The header goes out immediately with a zero entry count, which
    /// `finish` patches.
    pub fn with_bloom_bits(path: &Path, bits_per_key: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            offset: HEADER_SIZE,
            index: Vec::new(),
            key_hashes: Vec::new(),
            bloom_bits_per_key: bits_per_key,
            data_crc: crc32fast::Hasher::new(),
            scratch: Vec::new(),
        })
    }

    /// Append a live value
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if value.len() >= TOMBSTONE_MARKER as usize {
            return Err(KvError::Storage(format!(
                "value of {} bytes is too large for an SSTable entry",
                value.len()
            )));
        }
        self.append(key, Some(value))
    }

    /// Append a deletion marker
    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.append(key, None)
    }

    fn append(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if let Some((last, _)) = self.index.last() {
            if key <= last.as_slice() {
                return Err(KvError::Storage(format!(
                    "SSTable keys must be strictly ascending: {:?} after {:?}",
                    key, last
                )));
            }
        }

        encode_entry(&mut self.scratch, key, value);
        self.writer.write_all(&self.scratch)?;
        self.data_crc.update(&self.scratch);

        self.index.push((key.to_vec(), self.offset));
        self.key_hashes.push(BloomFilter::hash(key));
        self.offset += self.scratch.len() as u64;
        Ok(())
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> u64 {
        self.index.len() as u64
    }

    /// Write index, filter and footer, patch the header and fsync
    pub fn finish(mut self) -> Result<SSTable> {
        let entry_count = self.entry_count();
        let index_offset = self.offset;

        let mut meta = Vec::new();
        for (key, offset) in &self.index {
            meta.extend_from_slice(&(key.len() as u32).to_le_bytes());
            meta.extend_from_slice(&offset.to_le_bytes());
            meta.extend_from_slice(key);
        }
        let bloom_offset = index_offset + meta.len() as u64;
        meta.extend_from_slice(&BloomFilter::build(&self.key_hashes, self.bloom_bits_per_key).encode());

        let mut footer = [0u8; 24];
        footer[0..8].copy_from_slice(&index_offset.to_le_bytes());
        footer[8..16].copy_from_slice(&bloom_offset.to_le_bytes());
        footer[16..20].copy_from_slice(&self.data_crc.finalize().to_le_bytes());
        footer[20..24].copy_from_slice(&crc32fast::hash(&meta).to_le_bytes());

        self.writer.write_all(&meta)?;
        self.writer.write_all(&footer)?;

        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| KvError::Io(e.into_error()))?;
        // Count sits after magic + version
        file.seek(SeekFrom::Start(MAGIC.len() as u64 + 2))?;
        file.write_all(&entry_count.to_le_bytes())?;
        file.sync_all()?;
        let file_size = file.metadata()?.len();

        let key_range = match (self.index.first(), self.index.last()) {
            (Some((first, _)), Some((last, _))) => Some((first.clone(), last.clone())),
            _ => None,
        };

        Ok(SSTable {
            path: self.path,
            entry_count,
            key_range,
            file_size,
        })
    }
}

/// `[key_len u32][val_len u32][key][value]`, tombstones carry no value bytes
fn encode_entry(buf: &mut Vec<u8>, key: &[u8], value: Option<&[u8]>) {
    buf.clear();
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    let value_len = value.map_or(TOMBSTONE_MARKER, |v| v.len() as u32);
    buf.extend_from_slice(&value_len.to_le_bytes());
    buf.extend_from_slice(key);
    if let Some(v) = value {
        buf.extend_from_slice(v);
    }
}
