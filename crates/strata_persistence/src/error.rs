//! # Persistence Error Types
//!
//! All errors that can occur while reading or writing world storage.

use thiserror::Error;

/// Errors that can occur in the persistence layer.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Underlying file operation failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Journal or snapshot bytes are not what we wrote.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// A row or journal payload could not be (de)serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot could not be decompressed.
    #[error("snapshot decompression failed: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),

    /// No world row with this id or guid.
    #[error("world not found: {0}")]
    WorldNotFound(String),

    /// No entity row with this entity id.
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// No drop item row with this entity id.
    #[error("drop item not found: {0}")]
    DropItemNotFound(String),

    /// Transaction API used out of order.
    #[error("transaction misuse: {0}")]
    Transaction(&'static str),

    /// A schema migration failed; the store must not be served.
    #[error("migration {version} ({name}) failed: {reason}")]
    Migration {
        /// Version that failed.
        version: u32,
        /// Migration name.
        name: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// Deliberate failure raised by test doubles.
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;
