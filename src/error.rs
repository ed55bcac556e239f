//! Error types for pagedkv
//!
//! Provides a unified error type for all operations.

use std::io;

use thiserror::Error;

/// Result type alias using PagedKvError
pub type Result<T> = std::result::Result<T, PagedKvError>;

/// Unified error type for pagedkv operations
#[derive(Debug, Error)]
pub enum PagedKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // -------------------------------------------------------------------------
    // Backing Store Errors
    // -------------------------------------------------------------------------
    #[error("Concurrent modification detected after {attempts} attempt(s)")]
    Conflict { attempts: usize },

    #[error("Transaction is no longer active")]
    TransactionInactive,

    #[error("Store timeout: {0}")]
    StoreTimeout(String),

    #[error("Store error: {0}")]
    Store(String),

    // -------------------------------------------------------------------------
    // Journal Errors
    // -------------------------------------------------------------------------
    #[error("Journal corruption detected: {0}")]
    JournalCorruption(String),

    #[error("Journal write failed: {0}")]
    JournalWrite(String),

    // -------------------------------------------------------------------------
    // Map Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    // -------------------------------------------------------------------------
    // Stream Errors
    // -------------------------------------------------------------------------
    #[error("Stream '{0}' is write-locked")]
    WriteLocked(String),

    #[error("Stream '{0}' is closed or no longer locked by this writer")]
    StreamClosed(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl PagedKvError {
    /// Whether this is an optimistic-concurrency conflict.
    ///
    /// Conflicts surfaced to callers have already exhausted the local retry
    /// budget; callers that want to keep trying should back off first.
    pub fn is_conflict(&self) -> bool {
        matches!(self, PagedKvError::Conflict { .. })
    }
}

impl From<PagedKvError> for io::Error {
    fn from(err: PagedKvError) -> Self {
        match err {
            PagedKvError::Io(e) => e,
            PagedKvError::WriteLocked(_) => io::Error::new(io::ErrorKind::WouldBlock, err),
            PagedKvError::StreamClosed(_) => io::Error::new(io::ErrorKind::BrokenPipe, err),
            PagedKvError::StoreTimeout(_) => io::Error::new(io::ErrorKind::TimedOut, err),
            PagedKvError::JournalCorruption(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
