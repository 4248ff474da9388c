//! Scan Module
//!
//! Range arithmetic for prefix scans and the merge iterator that combines
//! the memtable with every SSTable.
//!
//! ## Prefix ranges
//! A prefix `p` covers the half-open range `[p, upper(p))` where `upper`
//! drops trailing `0xFF` bytes and increments the last remaining byte:
//! ```text
//!   [0x80]            -> [0x81]
//!   [0x61, 0xFF]      -> [0x62]
//!   [0xFF, 0xFF]      -> none (scan to end of keyspace)
//!   []                -> none (whole keyspace)
//! ```
//!
//! ## Merge order
//! Sources are ordered newest first (memtable, then SSTables newest →
//! oldest). For equal keys the newest source wins; tombstones hide the key.

use std::ops::Bound;

use crate::error::Result;
use crate::memtable::MemTableEntry;

/// Exclusive upper bound of all keys starting with `prefix`
///
/// `None` when no such bound exists (empty or all-`0xFF` prefix).
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

/// Key bounds covering exactly the keys that start with `prefix`
pub fn prefix_range(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let start = if prefix.is_empty() {
        Bound::Unbounded
    } else {
        Bound::Included(prefix.to_vec())
    };
    let end = match prefix_upper_bound(prefix) {
        Some(upper) => Bound::Excluded(upper),
        None => Bound::Unbounded,
    };
    (start, end)
}

/// True when no key can satisfy both bounds
pub(crate) fn is_empty_range(start: &Bound<Vec<u8>>, end: &Bound<Vec<u8>>) -> bool {
    match (start, end) {
        (Bound::Included(s), Bound::Included(e)) => s > e,
        (Bound::Included(s), Bound::Excluded(e))
        | (Bound::Excluded(s), Bound::Included(e))
        | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
        _ => false,
    }
}

/// True when `[min, max]` intersects the bounds
pub(crate) fn overlaps(min: &[u8], max: &[u8], start: &Bound<Vec<u8>>, end: &Bound<Vec<u8>>) -> bool {
    let after_start = match start {
        Bound::Included(s) => max >= s.as_slice(),
        Bound::Excluded(s) => max > s.as_slice(),
        Bound::Unbounded => true,
    };
    let before_end = match end {
        Bound::Included(e) => min <= e.as_slice(),
        Bound::Excluded(e) => min < e.as_slice(),
        Bound::Unbounded => true,
    };
    after_start && before_end
}

/// One sorted input of a merge
pub type EntrySource = Box<dyn Iterator<Item = Result<(Vec<u8>, MemTableEntry)>> + Send>;

/// Merges sorted sources into one ascending stream of live entries
///
/// After a source error is yielded the iterator is exhausted.
pub struct MergeIterator {
    sources: Vec<EntrySource>,
    heads: Vec<Option<(Vec<u8>, MemTableEntry)>>,
    primed: bool,
    failed: bool,
}

impl MergeIterator {
    /// `sources` must be ordered newest first
    pub fn new(sources: Vec<EntrySource>) -> Self {
        let heads = sources.iter().map(|_| None).collect();
        Self {
            sources,
            heads,
            primed: false,
            failed: false,
        }
    }

    fn refill(&mut self, index: usize) -> Result<()> {
        self.heads[index] = self.sources[index].next().transpose()?;
        Ok(())
    }

    fn prime(&mut self) -> Result<()> {
        for index in 0..self.sources.len() {
            self.refill(index)?;
        }
        self.primed = true;
        Ok(())
    }

    /// Index of the source holding the smallest key (newest on ties)
    fn winner(&self) -> Option<usize> {
        let mut winner: Option<(usize, &[u8])> = None;
        for (index, head) in self.heads.iter().enumerate() {
            if let Some((key, _)) = head {
                match winner {
                    Some((_, best)) if best <= key.as_slice() => {}
                    _ => winner = Some((index, key.as_slice())),
                }
            }
        }
        winner.map(|(index, _)| index)
    }

    fn step(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if !self.primed {
            self.prime()?;
        }

        loop {
            let Some(index) = self.winner() else {
                return Ok(None);
            };
            let Some((key, entry)) = self.heads[index].take() else {
                return Ok(None);
            };

            // Older versions of the same key are shadowed
            for other in 0..self.heads.len() {
                let shadowed = other == index
                    || matches!(&self.heads[other], Some((k, _)) if *k == key);
                if shadowed {
                    self.refill(other)?;
                }
            }

            if let MemTableEntry::Value(value) = entry {
                return Ok(Some((key, value)));
            }
        }
    }
}

impl Iterator for MergeIterator {
    /// Live (key, value) pairs in ascending key order
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.step() {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
