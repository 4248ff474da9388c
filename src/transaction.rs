//! Transactions
//!
//! A `KvTransaction` reads from the snapshot taken when it was opened and
//! buffers its writes until commit. Commit is first-committer-wins: it
//! fails with `TransactionConflict` if another write touched a key this
//! transaction read or wrote after the snapshot. Dropping an open
//! transaction discards it, and `discard` may be called again after the
//! transaction has finished.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::{Engine, ReadView, SnapshotGuard};
use crate::error::{KvError, Result};
use crate::traits::{Reader, Transaction, Writer};

struct Open {
    view: ReadView,
    snapshot: SnapshotGuard,
    /// Buffered writes, `None` = delete
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    /// Keys read from the snapshot
    reads: BTreeSet<Vec<u8>>,
}

pub struct KvTransaction {
    engine: Arc<Engine>,
    /// `None` once committed or discarded
    state: Mutex<Option<Open>>,
}

impl KvTransaction {
    pub(crate) fn begin(engine: Arc<Engine>) -> Self {
        let (view, snapshot) = engine.begin_snapshot();
        Self {
            engine,
            state: Mutex::new(Some(Open {
                view,
                snapshot,
                writes: BTreeMap::new(),
                reads: BTreeSet::new(),
            })),
        }
    }

    /// Whether commit or discard has already run
    pub fn is_closed(&self) -> bool {
        self.state.lock().is_none()
    }

    /// Number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.state.lock().as_ref().map_or(0, |open| open.writes.len())
    }

    fn buffer(&self, key: &[u8], value: Option<Vec<u8>>) -> Result<()> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or(KvError::TransactionClosed)?;
        open.writes.insert(key.to_vec(), value);
        Ok(())
    }
}

impl Reader for KvTransaction {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or(KvError::TransactionClosed)?;

        if let Some(buffered) = open.writes.get(key) {
            return buffered.clone().ok_or(KvError::NotFound);
        }
        open.reads.insert(key.to_vec());
        open.view.get(key)?.ok_or(KvError::NotFound)
    }
}

impl Writer for KvTransaction {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.buffer(key, Some(value.to_vec()))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.buffer(key, None)
    }
}

impl Transaction for KvTransaction {
    fn commit(&self) -> Result<()> {
        let open = self.state.lock().take().ok_or(KvError::TransactionClosed)?;
        // The snapshot stays registered until the commit has been checked
        self.engine.commit(&open.snapshot, &open.reads, open.writes)
    }

    /// Safe on every exit path: a finished transaction discards as a no-op
    fn discard(&self) -> Result<()> {
        self.state.lock().take();
        Ok(())
    }
}

impl std::fmt::Debug for KvTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        match state.as_ref() {
            Some(open) => f
                .debug_struct("KvTransaction")
                .field("snapshot", &open.snapshot.sequence())
                .field("writes", &open.writes.len())
                .field("reads", &open.reads.len())
                .finish(),
            None => f.debug_struct("KvTransaction").field("closed", &true).finish(),
        }
    }
}
