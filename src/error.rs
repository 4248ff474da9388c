//! Error types for aptkv
//!
//! Provides a unified error type for all operations. `NotFound` is an
//! ordinary variant so every layer can produce and match it without
//! sharing a global sentinel.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for aptkv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------
    #[error("key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // On-disk format errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("table corruption detected: {0}")]
    Corruption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Handle lifecycle
    // -------------------------------------------------------------------------
    #[error("storage at {} is locked by another handle", .0.display())]
    LockHeld(PathBuf),

    #[error("storage is not open")]
    NotOpen,

    #[error("storage is in use: {0}")]
    InUse(String),

    // -------------------------------------------------------------------------
    // Batches and transactions
    // -------------------------------------------------------------------------
    #[error("batch has already been written")]
    BatchClosed,

    #[error("transaction has already been committed or discarded")]
    TransactionClosed,

    #[error("transaction conflicts with a concurrent commit")]
    TransactionConflict,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Caller errors surfaced through prefix scans
    // -------------------------------------------------------------------------
    #[error("scan callback failed: {0}")]
    Callback(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl KvError {
    /// True for the expected "key absent" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound)
    }

    /// Wrap a caller error returned from a `process_by_prefix` callback
    pub fn callback<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        KvError::Callback(err.into())
    }
}

impl From<bincode::Error> for KvError {
    fn from(err: bincode::Error) -> Self {
        KvError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for KvError {
    fn from(err: serde_json::Error) -> Self {
        KvError::Serialization(err.to_string())
    }
}
