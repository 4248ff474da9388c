//! SSTable Iterator
//!
//! Ordered iteration over a key range of an SSTable.

use std::ops::Bound;
use std::sync::Arc;

use crate::error::{KvError, Result};
use crate::memtable::MemTableEntry;

use super::SSTableReader;

/// Iterator over SSTable entries in sorted key order
///
/// Walks the in-memory index with a cursor key and reads each entry from
/// disk, so it keeps the table alive but holds no lock between steps.
pub struct SSTableIterator {
    table: Arc<SSTableReader>,
    next: Bound<Vec<u8>>,
    end: Bound<Vec<u8>>,
    done: bool,
}

impl SSTableIterator {
    pub(super) fn new(table: Arc<SSTableReader>, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> Self {
        let done = crate::scan::is_empty_range(&start, &end);
        Self {
            table,
            next: start,
            end,
            done,
        }
    }
}

impl Iterator for SSTableIterator {
    /// (key, entry): tombstones are yielded so newer tables can shadow older ones
    type Item = Result<(Vec<u8>, MemTableEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let found = self
            .table
            .index
            .range::<Vec<u8>, _>((self.next.as_ref(), self.end.as_ref()))
            .next()
            .map(|(key, &offset)| (key.clone(), offset));

        let Some((key, offset)) = found else {
            self.done = true;
            return None;
        };
        self.next = Bound::Excluded(key.clone());

        match self.table.read_entry_at(offset) {
            Ok((stored, entry)) if stored == key => Some(Ok((key, entry))),
            Ok(_) => {
                self.done = true;
                Some(Err(KvError::Corruption(format!(
                    "{}: index and data disagree at offset {}",
                    self.table.path().display(),
                    offset
                ))))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
