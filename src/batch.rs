//! Write batches
//!
//! A `WriteBatch` collects puts and deletes in memory and hands them to the
//! engine as one atomic group.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::Engine;
use crate::error::{KvError, Result};
use crate::traits::{Batch, Writer};
use crate::wal::Operation;

#[derive(Default)]
struct BatchState {
    operations: Vec<Operation>,
    closed: bool,
}

/// Buffered group of writes against one storage handle
///
/// Holding a batch keeps its handle's engine alive, so `close` on the
/// handle reports `InUse` until the batch is dropped.
pub struct WriteBatch {
    engine: Arc<Engine>,
    state: Mutex<BatchState>,
}

impl WriteBatch {
    pub(crate) fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            state: Mutex::new(BatchState::default()),
        }
    }

    /// Number of buffered operations
    pub fn len(&self) -> usize {
        self.state.lock().operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn push(&self, operation: Operation) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(KvError::BatchClosed);
        }
        state.operations.push(operation);
        Ok(())
    }
}

impl Writer for WriteBatch {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.push(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.push(Operation::Delete { key: key.to_vec() })
    }
}

impl Batch for WriteBatch {
    fn write(&self) -> Result<()> {
        let operations = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(KvError::BatchClosed);
            }
            state.closed = true;
            std::mem::take(&mut state.operations)
        };
        self.engine.write_batch(operations)
    }
}

impl std::fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("WriteBatch")
            .field("operations", &state.operations.len())
            .field("closed", &state.closed)
            .finish()
    }
}
