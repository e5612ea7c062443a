//! Error types for the periodic log and its backing store

use chrono::NaiveDateTime;
use std::io;
use thiserror::Error;

/// Errors raised by the backing store and the periodic log
#[derive(Debug, Error)]
pub enum LogError {
    /// The backing medium failed a read or write
    #[error("I/O error on backing medium: {0}")]
    Io(#[from] io::Error),

    /// Bucket size must be between 1 and 8 bytes
    #[error("bucket size {0} is outside 1..=8")]
    InvalidBucketSize(u8),

    /// Bucket interval must fit the 12-bit header field and be positive
    #[error("bucket interval of {0}s is outside 1..=4095")]
    InvalidInterval(i64),

    /// Page size must be a non-zero power of two
    #[error("page size {0} is not a non-zero power of two")]
    InvalidPageSize(usize),

    /// The medium cannot hold the header plus at least one bucket
    #[error("allocation of {0} bytes leaves no room for buckets")]
    AllocationTooSmall(usize),

    /// An access reached past the end of the medium
    #[error("access of {len} bytes at offset {offset} exceeds capacity {capacity}")]
    OutOfBounds {
        /// Starting offset of the access
        offset: usize,
        /// Number of bytes requested
        len: usize,
        /// Capacity of the medium
        capacity: usize,
    },

    /// The value cannot be represented in a bucket of this size
    #[error("value {value} does not fit a {bucket_size}-byte bucket")]
    ValueOutOfRange {
        /// Rejected value
        value: i64,
        /// Configured bucket size
        bucket_size: u8,
    },

    /// The timestamp cannot be encoded as an anchor (years 2000..=2254)
    #[error("timestamp {0} cannot be encoded as an anchor")]
    AnchorOutOfRange(NaiveDateTime),

    /// The log has no valid interval; `format` was never called
    #[error("log has not been formatted")]
    Unformatted,

    /// The log was opened read-only
    #[error("log is read-only")]
    ReadOnly,
}

/// Result type for log and store operations
pub type Result<T> = std::result::Result<T, LogError>;
