//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their
//! on-disk framing: `[LSN (8)][CRC (4)][Len (4)][bincode payload]`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};

/// Frame header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest payload a single frame may carry (256 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 256 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },

    /// A group of operations applied all-or-nothing, in order
    Batch(Vec<Operation>),
}

impl Operation {
    /// Every key this operation touches, in application order
    pub fn keys(&self) -> Vec<&[u8]> {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => vec![key.as_slice()],
            Operation::Batch(ops) => ops.iter().flat_map(|op| op.keys()).collect(),
        }
    }
}

/// Decoded frame header
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: u32,
}

impl FrameHeader {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(KvError::WalCorruption(format!(
                "truncated header: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&bytes[0..8]);
        crc.copy_from_slice(&bytes[8..12]);
        len.copy_from_slice(&bytes[12..16]);

        let header = Self {
            lsn: u64::from_le_bytes(lsn),
            crc: u32::from_le_bytes(crc),
            len: u32::from_le_bytes(len),
        };
        if header.len > MAX_PAYLOAD_SIZE {
            return Err(KvError::WalCorruption(format!(
                "payload length {} exceeds maximum {}",
                header.len, MAX_PAYLOAD_SIZE
            )));
        }
        Ok(header)
    }
}

/// Borrowed twin of `WalEntry`; serializes to identical bytes
#[derive(Serialize)]
struct WalEntryRef<'a> {
    lsn: u64,
    operation: &'a Operation,
    timestamp: u64,
}

/// Wall-clock time in unix millis
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl WalEntry {
    /// Create an entry stamped with the current wall-clock time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self {
            lsn,
            operation,
            timestamp: now_millis(),
        }
    }

    /// Encode header + payload into one frame
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Self::encode_frame(self.lsn, &self.operation, self.timestamp)
    }

    /// Frame an operation without taking ownership of it
    pub(crate) fn encode_frame(lsn: u64, operation: &Operation, timestamp: u64) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&WalEntryRef {
            lsn,
            operation,
            timestamp,
        })?;
        if payload.len() as u64 > MAX_PAYLOAD_SIZE as u64 {
            return Err(KvError::Serialization(format!(
                "WAL entry of {} bytes exceeds maximum {}",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }
        let crc = crc32fast::hash(&payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&lsn.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decode one complete frame, verifying length, checksum and LSN
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::parse(bytes)?;
        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != header.len as usize {
            return Err(KvError::WalCorruption(format!(
                "payload length mismatch: header says {}, got {}",
                header.len,
                payload.len()
            )));
        }
        Self::decode_payload(&header, payload)
    }

    pub(crate) fn decode_payload(header: &FrameHeader, payload: &[u8]) -> Result<Self> {
        let actual = crc32fast::hash(payload);
        if actual != header.crc {
            return Err(KvError::WalCorruption(format!(
                "CRC mismatch at lsn {}: expected {:08x}, got {:08x}",
                header.lsn, header.crc, actual
            )));
        }

        let entry: WalEntry = bincode::deserialize(payload)
            .map_err(|e| KvError::WalCorruption(format!("undecodable payload: {}", e)))?;
        if entry.lsn != header.lsn {
            return Err(KvError::WalCorruption(format!(
                "LSN mismatch: header {}, payload {}",
                header.lsn, entry.lsn
            )));
        }
        Ok(entry)
    }

    /// Total frame size on disk
    pub fn frame_len(payload_len: u32) -> u64 {
        HEADER_SIZE as u64 + payload_len as u64
    }
}
