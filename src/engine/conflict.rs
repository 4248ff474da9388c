//! Commit conflict tracking
//!
//! A transaction reads from the snapshot taken at sequence `s`. At commit it
//! fails if any write committed after `s` touched a key the transaction read
//! or wrote. Commits are only remembered while some snapshot may still need
//! them.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub(crate) struct ConflictTracker {
    /// Snapshot sequence → number of open transactions at that sequence
    active: BTreeMap<u64, usize>,
    /// Committed writes in sequence order: (sequence, keys)
    commits: VecDeque<(u64, Vec<Vec<u8>>)>,
}

impl ConflictTracker {
    /// Whether any snapshot is open (otherwise commits need no record)
    pub(crate) fn is_tracking(&self) -> bool {
        !self.active.is_empty()
    }

    pub(crate) fn register(&mut self, sequence: u64) {
        *self.active.entry(sequence).or_insert(0) += 1;
    }

    pub(crate) fn release(&mut self, sequence: u64) {
        if let Some(count) = self.active.get_mut(&sequence) {
            *count -= 1;
            if *count == 0 {
                self.active.remove(&sequence);
            }
        }
        self.prune();
    }

    /// Remember the keys written at `sequence`
    pub(crate) fn record(&mut self, sequence: u64, keys: Vec<Vec<u8>>) {
        if self.is_tracking() {
            self.commits.push_back((sequence, keys));
        }
    }

    /// True if a commit after `since` wrote a key for which `touched` holds
    pub(crate) fn has_conflict(&self, since: u64, touched: impl Fn(&[u8]) -> bool) -> bool {
        self.commits
            .iter()
            .filter(|(sequence, _)| *sequence > since)
            .any(|(_, keys)| keys.iter().any(|k| touched(k)))
    }

    #[cfg(test)]
    pub(crate) fn recorded_commits(&self) -> usize {
        self.commits.len()
    }

    /// Drop commits no open snapshot can conflict with
    fn prune(&mut self) {
        match self.active.keys().next().copied() {
            None => self.commits.clear(),
            Some(oldest) => {
                while matches!(self.commits.front(), Some((sequence, _)) if *sequence <= oldest) {
                    self.commits.pop_front();
                }
            }
        }
    }
}

/// Registration of an open snapshot; released on drop
pub struct SnapshotGuard {
    tracker: Arc<Mutex<ConflictTracker>>,
    sequence: u64,
}

impl SnapshotGuard {
    pub(crate) fn register(tracker: &Arc<Mutex<ConflictTracker>>, sequence: u64) -> Self {
        tracker.lock().register(sequence);
        Self {
            tracker: Arc::clone(tracker),
            sequence,
        }
    }

    /// Sequence number of the last write visible to the snapshot
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        self.tracker.lock().release(self.sequence);
    }
}

impl std::fmt::Debug for SnapshotGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotGuard")
            .field("sequence", &self.sequence)
            .finish()
    }
}
