//! Point-in-time read views
//!
//! A `ReadView` pins the memtable contents and the live table set at the
//! moment it was taken. Later writes, flushes and compactions never change
//! what it returns: the memtable is copy-on-write and replaced tables stay
//! on disk until the last view referencing them is dropped.

use std::ops::Bound;
use std::sync::Arc;

use crate::error::{KvError, Result};
use crate::memtable::{MemTableIterator, MemTableMap};
use crate::scan::{prefix_range, EntrySource, MergeIterator};
use crate::storage::SSTableReader;

#[derive(Clone)]
pub struct ReadView {
    memtable: Arc<MemTableMap>,
    /// Newest first
    sstables: Vec<Arc<SSTableReader>>,
}

impl ReadView {
    pub(crate) fn new(memtable: Arc<MemTableMap>, sstables: Vec<Arc<SSTableReader>>) -> Self {
        Self { memtable, sstables }
    }

    /// Value of `key` as of the view, `None` if absent or deleted
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.memtable.get(key) {
            return Ok(entry.clone().into_value());
        }
        for table in &self.sstables {
            if let Some(entry) = table.get(key)? {
                return Ok(entry.into_value());
            }
        }
        Ok(None)
    }

    /// Live pairs whose key starts with `prefix`, in ascending key order
    pub fn scan_prefix(&self, prefix: &[u8]) -> MergeIterator {
        let (start, end) = prefix_range(prefix);
        self.scan(start, end)
    }

    /// Live pairs within the bounds, in ascending key order
    pub fn scan(&self, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> MergeIterator {
        let mut sources: Vec<EntrySource> = Vec::with_capacity(self.sstables.len() + 1);

        let memtable = MemTableIterator::new(Arc::clone(&self.memtable), start.clone(), end.clone());
        sources.push(Box::new(memtable.map(Ok::<_, KvError>)));

        for table in &self.sstables {
            if table.overlaps(&start, &end) {
                sources.push(Box::new(table.range(start.clone(), end.clone())));
            }
        }

        MergeIterator::new(sources)
    }

    /// Whether at least one live key starts with `prefix`
    pub fn has_prefix(&self, prefix: &[u8]) -> Result<bool> {
        match self.scan_prefix(prefix).next() {
            Some(item) => item.map(|_| true),
            None => Ok(false),
        }
    }

    /// Number of tables pinned by this view
    pub fn sstable_count(&self) -> usize {
        self.sstables.len()
    }
}

impl std::fmt::Debug for ReadView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadView")
            .field("memtable_entries", &self.memtable.len())
            .field("sstables", &self.sstables.len())
            .finish()
    }
}
