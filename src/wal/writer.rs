//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::borrow::Borrow;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{KvError, Result};

use super::entry::now_millis;
use super::{Operation, WalEntry, WalRecovery};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    file: File,
    /// Length of the file up to the end of the last complete frame
    len: u64,
    /// Set when a partial frame could not be removed
    poisoned: bool,
    /// LSN the next appended entry will receive
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries appended since the last fsync
    unsynced: usize,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// An existing file is appended to: LSNs continue after its last valid
    /// entry, and a torn tail is cut off first so new entries stay reachable.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let mut next_lsn = 1;

        if path.exists() {
            let result = WalRecovery::verify(path)?;
            if result.was_truncated {
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(result.valid_len)?;
                file.sync_all()?;
            }
            next_lsn = result.last_lsn + 1;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            poisoned: false,
            next_lsn,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Append an entry to the WAL, returning its LSN
    ///
    /// A failed append leaves no trace: whatever part of the frame reached
    /// the file is cut off again. If that cut fails too, the writer refuses
    /// every further append.
    pub fn append(&mut self, operation: impl Borrow<Operation>) -> Result<u64> {
        if self.poisoned {
            return Err(KvError::WalCorruption(format!(
                "{} ends in a partial frame, reopen to recover",
                self.path.display()
            )));
        }

        let lsn = self.next_lsn;
        let frame = WalEntry::encode_frame(lsn, operation.borrow(), now_millis())?;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced + 1 >= count,
        };
        let written = self.file.write_all(&frame).and_then(|()| {
            if due {
                self.file.sync_data()
            } else {
                Ok(())
            }
        });
        if let Err(e) = written {
            self.rollback();
            return Err(e.into());
        }

        self.len += frame.len() as u64;
        self.next_lsn += 1;
        self.unsynced = if due { 0 } else { self.unsynced + 1 };

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Cut the file back to the last complete frame
    fn rollback(&mut self) {
        if let Err(e) = self.file.set_len(self.len) {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "could not remove partial WAL frame"
            );
            self.poisoned = true;
        }
    }

    /// Discard every entry (their effects are durable elsewhere)
    ///
    /// LSNs keep increasing across truncations.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.unsynced = 0;
        self.poisoned = false;
        Ok(())
    }

    /// Get the LSN the next entry will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
