//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::wal::Operation;

use super::MemTableEntry;

/// Sorted contents of a memtable
pub type MemTableMap = BTreeMap<Vec<u8>, MemTableEntry>;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<Arc<MemTableMap>>,
    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Arc::new(BTreeMap::new())),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the entry for a key (read lock)
    ///
    /// `Some(Tombstone)` means the key was deleted here and older tables
    /// must not be consulted.
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair (write lock), returning the new size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        self.insert(key, MemTableEntry::Value(value))
    }

    /// Delete a key (write lock, inserts tombstone), returning the new size
    pub fn delete(&self, key: Vec<u8>) -> usize {
        self.insert(key, MemTableEntry::Tombstone)
    }

    /// Apply a logged operation, returning the new size
    pub fn apply(&self, operation: Operation) -> usize {
        match operation {
            Operation::Put { key, value } => self.put(key, value),
            Operation::Delete { key } => self.delete(key),
            Operation::Batch(ops) => {
                let mut size = self.size();
                for op in ops {
                    size = self.apply(op);
                }
                size
            }
        }
    }

    fn insert(&self, key: Vec<u8>, entry: MemTableEntry) -> usize {
        let mut guard = self.data.write();
        let map = Arc::make_mut(&mut *guard);

        let added = key.len() + entry.payload_len();
        let removed = match map.get(&key) {
            Some(old) => key.len() + old.payload_len(),
            None => 0,
        };
        map.insert(key, entry);

        // Size only changes under the write lock, so load/store is exact
        let size = self.size.load(Ordering::Acquire) + added - removed;
        self.size.store(size, Ordering::Release);
        size
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Get entry count (live values and tombstones)
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    /// True when nothing has been written since the last clear
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Point-in-time view of the contents; later writes don't affect it
    pub fn snapshot(&self) -> Arc<MemTableMap> {
        Arc::clone(&self.data.read())
    }

    /// Iterate over all entries in sorted key order (for flush)
    pub fn iter(&self) -> MemTableIterator {
        MemTableIterator::new(self.snapshot(), Bound::Unbounded, Bound::Unbounded)
    }

    /// Iterate over entries within `[start, end)` style bounds
    pub fn range(&self, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> MemTableIterator {
        MemTableIterator::new(self.snapshot(), start, end)
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut guard = self.data.write();
        *guard = Arc::new(BTreeMap::new());
        self.size.store(0, Ordering::Release);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a memtable snapshot
///
/// Holds the snapshot and a cursor key, so it owns no borrow of the map.
pub struct MemTableIterator {
    data: Arc<MemTableMap>,
    next: Bound<Vec<u8>>,
    end: Bound<Vec<u8>>,
    done: bool,
}

impl MemTableIterator {
    pub fn new(data: Arc<MemTableMap>, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> Self {
        let done = crate::scan::is_empty_range(&start, &end);
        Self {
            data,
            next: start,
            end,
            done,
        }
    }
}

impl Iterator for MemTableIterator {
    type Item = (Vec<u8>, MemTableEntry);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let found = self
            .data
            .range::<Vec<u8>, _>((self.next.as_ref(), self.end.as_ref()))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()));

        match found {
            Some((key, entry)) => {
                self.next = Bound::Excluded(key.clone());
                Some((key, entry))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}
