//! # aptkv
//!
//! An embedded, ordered key-value store for package-repository metadata:
//! - Byte-string keys kept in unsigned lexicographic order
//! - Prefix scans, atomic write batches, snapshot-isolated transactions
//! - Write-Ahead Logging (WAL) for durability and crash recovery
//! - One exclusive handle per directory, plus throwaway temporary stores
//!
//! ## Layers
//!
//! ```text
//!   KvStore ── lifecycle, temporary stores, recover
//!     │  Reader / Writer / PrefixReader
//!     │  WriteBatch ─┐      KvTransaction ─┐
//!     ▼              ▼                     ▼ (snapshot + conflict check)
//!   Engine ── write lock ── sequence numbers ── ReadView
//!     │
//!     ├── wal::WalWriter          every write group, fsynced
//!     ├── memtable::MemTable      copy-on-write BTreeMap
//!     └── storage::StorageManager
//!            ├── MANIFEST         live tables, newest first
//!            └── sstable_*.sst    immutable, index + bloom filter
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use aptkv::{KvStore, PrefixReader, Reader, Writer};
//!
//! # fn main() -> aptkv::Result<()> {
//! let store = KvStore::open_path("/var/lib/aptly/db")?;
//! store.put(b"Pamd64 hello 2.10", b"...")?;
//! assert_eq!(store.get(b"Pamd64 hello 2.10")?, b"...".to_vec());
//! let keys = store.keys_by_prefix(b"Pamd64 ")?;
//! assert_eq!(keys.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod scan;
pub mod engine;

pub mod traits;
pub mod batch;
pub mod transaction;
pub mod store;

pub use error::{KvError, Result};
pub use config::{Config, WalSyncStrategy};
pub use engine::{Engine, EngineStats, ReadView};
pub use traits::{Batch, PrefixReader, Reader, Storage, Transaction, Writer};
pub use batch::WriteBatch;
pub use transaction::KvTransaction;
pub use store::KvStore;
pub use storage::{CompactionStats, RepairReport};

/// Crate version, as recorded in Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
