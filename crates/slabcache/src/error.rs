//! Error types for slabcache

use thiserror::Error;

/// Result type alias for slabcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache construction and verification
///
/// Lookups and removals of absent keys are not errors; they return `None`
/// or do nothing. Allocation failure aborts the process as usual for Rust.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Configuration rejected at build time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A shard failed its structural self-check
    #[error("Shard {shard} is corrupted: {reason}")]
    Corrupted {
        /// Index of the offending shard
        shard: usize,
        /// What the check found
        reason: String,
    },
}
