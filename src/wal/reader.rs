//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{KvError, Result};

use super::entry::{FrameHeader, HEADER_SIZE};
use super::WalEntry;

/// Outcome of reading one frame
pub(crate) enum Frame {
    /// A complete, checksummed entry
    Entry(WalEntry),
    /// Clean end of file
    Eof,
    /// The file ends in the middle of a frame (interrupted append)
    TornTail { offset: u64 },
    /// A complete frame that fails validation
    Corrupt { offset: u64, reason: String },
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset just past the last frame read successfully
    position: u64,
    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file and `WalCorruption` for a
    /// torn or damaged frame.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.next_frame()? {
            Frame::Entry(entry) => Ok(Some(entry)),
            Frame::Eof => Ok(None),
            Frame::TornTail { offset } => Err(KvError::WalCorruption(format!(
                "incomplete entry at offset {}",
                offset
            ))),
            Frame::Corrupt { offset, reason } => Err(KvError::WalCorruption(format!(
                "bad entry at offset {}: {}",
                offset, reason
            ))),
        }
    }

    /// Offset just past the last valid entry read so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame> {
        let offset = self.position;
        let remaining = self.file_len - offset;
        if remaining == 0 {
            return Ok(Frame::Eof);
        }
        if remaining < HEADER_SIZE as u64 {
            return Ok(Frame::TornTail { offset });
        }

        let mut header_bytes = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header_bytes)?;
        let header = match FrameHeader::parse(&header_bytes) {
            Ok(header) => header,
            Err(e) => {
                return Ok(Frame::Corrupt {
                    offset,
                    reason: e.to_string(),
                })
            }
        };

        let frame_len = WalEntry::frame_len(header.len);
        if remaining < frame_len {
            return Ok(Frame::TornTail { offset });
        }

        let mut payload = vec![0u8; header.len as usize];
        self.reader.read_exact(&mut payload)?;

        match WalEntry::decode_payload(&header, &payload) {
            Ok(entry) => {
                self.position += frame_len;
                Ok(Frame::Entry(entry))
            }
            Err(e) => Ok(Frame::Corrupt {
                offset,
                reason: e.to_string(),
            }),
        }
    }
}

/// Iterator over WAL entries; stops after the first error
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
