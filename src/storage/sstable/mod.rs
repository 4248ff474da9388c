//! Immutable sorted table files
//!
//! A flush or compaction writes one table; nothing rewrites it afterwards.
//! Integers are little-endian.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "APKV" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   ... repeated for each entry, ascending key order ...  │
//! │   (ValLen = u32::MAX means tombstone, no value bytes)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (variable)                                  │
//! │   [KeyLen: u32][Offset: u64][Key]                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Bloom Block (variable, empty when disabled)             │
//! │   [Bits...][NumProbes: u8]                              │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (24 bytes)                                       │
//! │   IndexOffset: u64 | BloomOffset: u64                   │
//! │   DataCRC: u32     | MetaCRC: u32 (index + bloom)       │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod bloom;
mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use bloom::BloomFilter;
pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

pub(crate) const MAGIC: &[u8; 4] = b"APKV";

pub(crate) const VERSION: u16 = 1;

pub(crate) const HEADER_SIZE: u64 = 14;
pub(crate) const FOOTER_SIZE: u64 = 24;

/// Value length stored for a deleted key
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Bloom bits per key when a builder is created without an explicit value
pub(crate) const DEFAULT_BLOOM_BITS: usize = 10;

/// Summary of a finished table, returned by `SSTableBuilder::finish`
#[derive(Debug, Clone)]
pub struct SSTable {
    pub path: PathBuf,
    /// Values and tombstones
    pub entry_count: u64,
    /// Smallest and largest key, `None` for an empty table
    pub key_range: Option<(Vec<u8>, Vec<u8>)>,
    pub file_size: u64,
}

impl SSTable {
    /// Whether `key` falls inside the table's key range
    pub fn covers(&self, key: &[u8]) -> bool {
        self.key_range
            .as_ref()
            .is_some_and(|(min, max)| key >= min.as_slice() && key <= max.as_slice())
    }
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

pub(crate) fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}
