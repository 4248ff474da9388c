//! Storage Module
//!
//! Persistent storage layer using an SSTable format.
//!
//! ## Responsibilities
//! - Persist data to disk in sorted format
//! - Efficient range scans and point lookups
//! - Bloom filters for negative lookups
//! - Full compaction and offline repair
//!
//! ## Directory Layout
//! ```text
//! sstables/
//!   ├── MANIFEST              live table ids (JSON, atomically replaced)
//!   ├── sstable_000001.sst
//!   └── sstable_000002.sst
//! ```

mod manager;
mod manifest;
mod sstable;

pub use manager::{CompactionStats, RepairReport, StorageManager};
pub use manifest::Manifest;
pub use sstable::{BloomFilter, SSTable, SSTableBuilder, SSTableIterator, SSTableReader};
