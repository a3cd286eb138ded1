//! Error types for shardkv
//!
//! Provides a unified error type for all operations. Lookups that miss are
//! not errors: they return `Ok(None)` or omit the key.

use thiserror::Error;

/// Result type alias using ShardError
pub type Result<T> = std::result::Result<T, ShardError>;

/// Unified error type for shardkv operations
#[derive(Debug, Error)]
pub enum ShardError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors (raised when opening or scanning binary data)
    // -------------------------------------------------------------------------
    #[error("Format error: {0}")]
    Format(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    // -------------------------------------------------------------------------
    // Decode Errors (blob interpreted as the wrong structure)
    // -------------------------------------------------------------------------
    #[error("Media type mismatch: expected {expected}, found {found}")]
    MediaTypeMismatch { expected: String, found: String },

    #[error("Decode error: {0}")]
    Decode(String),

    // -------------------------------------------------------------------------
    // Build Contract Violations
    // -------------------------------------------------------------------------
    #[error("Key added out of order: {key:?} sorts before {previous:?}")]
    OutOfOrder { key: Vec<u8>, previous: Vec<u8> },

    #[error("Duplicate key: {0:?}")]
    DuplicateKey(Vec<u8>),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Incorrect number of entries: got {actual}, expected {expected}")]
    WrongEntryCount { expected: usize, actual: usize },

    #[error("Too many chunks: {0} (max 65535)")]
    TooManyChunks(usize),

    #[error("Duplicate record: {0}")]
    DuplicateRecord(String),

    #[error("Duplicate {kind} blob in record {record}")]
    DuplicateBlob { record: String, kind: String },

    #[error("No current record: call add_record before add_blob")]
    NoCurrentRecord,

    #[error("Invalid record name: {0}")]
    InvalidName(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ShardError {
    /// True for malformed, truncated or corrupt binary data
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            ShardError::Format(_) | ShardError::ChecksumMismatch { .. }
        )
    }

    /// True for errors raised by a builder before anything is persisted
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            ShardError::OutOfOrder { .. }
                | ShardError::DuplicateKey(_)
                | ShardError::InvalidEntry(_)
                | ShardError::WrongEntryCount { .. }
                | ShardError::TooManyChunks(_)
                | ShardError::DuplicateRecord(_)
                | ShardError::DuplicateBlob { .. }
                | ShardError::NoCurrentRecord
                | ShardError::InvalidName(_)
        )
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ShardError::Format(msg.into())
    }
}
