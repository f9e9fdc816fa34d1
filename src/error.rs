//! Error types for TideKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using TideError
pub type Result<T> = std::result::Result<T, TideError>;

/// Unified error type for TideKV operations
#[derive(Debug, Error)]
pub enum TideError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Bootstrap Errors
    // -------------------------------------------------------------------------
    #[error("Invalid segment file name {name:?}: {reason}")]
    InvalidSegmentName { name: String, reason: String },

    // -------------------------------------------------------------------------
    // Value Log Errors
    // -------------------------------------------------------------------------
    #[error("Log file {0} not exists")]
    SegmentNotFound(u32),

    #[error("Active log file not exists")]
    NoActiveSegment,

    #[error("Log file {0} is closed")]
    SegmentClosed(u32),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Entry of {size} bytes exceeds segment block size {limit}")]
    EntryTooLarge { size: u64, limit: u64 },

    #[error("Compaction error: {0}")]
    Compaction(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
