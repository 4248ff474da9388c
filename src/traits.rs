//! Capability traits
//!
//! Callers depend on the narrowest capability they need: something that
//! only reads takes `&dyn Reader`, an importer that groups writes takes a
//! `Batch`, and so on. Every method takes `&self` so the traits stay
//! object safe and handles can be shared between threads.
//!
//! ```text
//!   Reader ──┐
//!   Writer ──┼── Storage (+ PrefixReader, lifecycle)
//!            ├── Transaction (Reader + Writer + commit/discard)
//!            └── Batch (Writer + write)
//! ```

use crate::error::Result;

/// Point lookups
pub trait Reader {
    /// Value stored under `key`, `KvError::NotFound` if absent
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;
}

/// Point writes
pub trait Writer {
    /// Insert or replace the value under `key`
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`; removing an absent key succeeds
    fn delete(&self, key: &[u8]) -> Result<()>;
}

/// Ordered scans over every key that starts with a byte prefix
///
/// Keys are visited in ascending unsigned byte order. An empty prefix
/// matches every key.
pub trait PrefixReader {
    /// Whether at least one key starts with `prefix`
    fn has_prefix(&self, prefix: &[u8]) -> Result<bool>;

    /// Call `f` for each matching pair in key order
    ///
    /// The first error returned by `f` stops the scan and is returned
    /// unchanged. The scan reads a snapshot taken when it starts, so `f`
    /// may write to the same storage.
    fn process_by_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()>;

    /// Matching keys in order
    fn keys_by_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Matching values in key order
    fn fetch_by_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;
}

/// Buffered writes applied all at once
///
/// `put` and `delete` only record; nothing is visible until `write`.
/// After `write` (successful or not) the batch is closed and every
/// further call fails with `KvError::BatchClosed`.
pub trait Batch: Writer {
    fn write(&self) -> Result<()>;
}

/// A unit of isolated reads and buffered writes
///
/// Reads see the snapshot taken when the transaction was opened, overlaid
/// with the transaction's own writes. After `commit` or `discard` every
/// further call fails with `KvError::TransactionClosed`.
pub trait Transaction: Reader + Writer {
    /// Apply all buffered writes atomically
    fn commit(&self) -> Result<()>;

    /// Drop all buffered writes
    fn discard(&self) -> Result<()>;
}

/// A storage handle with lifecycle control
pub trait Storage: Reader + Writer + PrefixReader {
    type Batch: Batch;
    type Transaction: Transaction;

    fn create_batch(&self) -> Result<Self::Batch>;

    fn open_transaction(&self) -> Result<Self::Transaction>;

    /// A new, empty, independent storage that disappears when dropped
    fn create_temporary(&self) -> Result<Self>
    where
        Self: Sized;

    /// Open the handle; a no-op when already open
    fn open(&self) -> Result<()>;

    /// Flush and release the handle; a no-op when already closed
    fn close(&self) -> Result<()>;

    /// Reorganize storage to reclaim space; contents are unchanged
    fn compact_db(&self) -> Result<()>;

    /// Close the handle and destroy its data
    fn drop_db(&self) -> Result<()>;
}
