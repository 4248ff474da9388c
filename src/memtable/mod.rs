//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Track size for flush triggers
//! - Ordered iteration for SSTable creation and prefix scans
//! - O(1) snapshots for transactions and scans
//!
//! ## Data Structure Choice
//! A BTreeMap held behind `RwLock<Arc<..>>`:
//! - Ordered keys (required for SSTable generation and range scans)
//! - Snapshots clone the `Arc`; a writer copies the map only while a
//!   snapshot still shares it (`Arc::make_mut`)

mod table;

pub use table::{MemTable, MemTableIterator, MemTableMap};

/// Entry stored in the MemTable (and returned by table lookups)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    /// Live value, `None` for a tombstone
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            MemTableEntry::Value(v) => Some(v),
            MemTableEntry::Tombstone => None,
        }
    }

    /// Approximate in-memory footprint of the payload
    pub(crate) fn payload_len(&self) -> usize {
        match self {
            MemTableEntry::Value(v) => v.len(),
            MemTableEntry::Tombstone => 0,
        }
    }
}
