//! Write-ahead log
//!
//! Every write group is appended here before it reaches the memtable.
//! The file is a plain sequence of frames:
//!
//! ```text
//! [lsn u64][crc32 u32][len u32][bincode(WalEntry) ... len bytes]
//! [lsn u64][crc32 u32][len u32][bincode(WalEntry) ... len bytes]
//! ...
//! ```
//!
//! The CRC covers the payload. A batch or transaction commit is one
//! `Operation::Batch` frame, so replay after a crash sees all of it or
//! none of it. Replay stops at the first torn or damaged frame and the
//! file is cut back to the last good one.

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
