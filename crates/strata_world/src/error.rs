//! # World Error Types
//!
//! All errors that can occur while simulating a world.
//!
//! [`ValidationError`] is the client-facing subset: its `Display` form is
//! the stable error code sent back to the player in an `ERROR` packet.

use strata_persistence::PersistenceError;
use strata_procedural::WorkerError;
use strata_shared::{ChunkAddr, PlayerId};
use thiserror::Error;

/// Rejected player interactions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Target coordinates are not integral.
    #[error("error_invalid_block_pos")]
    InvalidBlockPos,

    /// Face normal is not a unit axis vector.
    #[error("error_invalid_pos_n")]
    InvalidPosN,

    /// A destination voxel cannot be replaced.
    #[error("error_block_cannot_be_replace")]
    BlockCannotBeReplace,

    /// The expected block is not there.
    #[error("error_block_not_found")]
    BlockNotFound,

    /// Beds only work at night.
    #[error("error_no_time_to_sleep")]
    NoTimeToSleep,

    /// Only one bucket fill per interaction.
    #[error("error_put_already")]
    PutAlready,

    /// Target is out of reach.
    #[error("error_too_far")]
    TooFar,

    /// Target lies in a chunk that is not loaded.
    #[error("error_chunk_not_loaded")]
    ChunkNotLoaded,

    /// Sign text exceeds the allowed length.
    #[error("error_sign_text_too_long")]
    SignTextTooLong,
}

impl ValidationError {
    /// Stable error code.
    #[must_use]
    pub fn code(self) -> String {
        self.to_string()
    }
}

/// Failure to deliver packets to one player.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("connection of player {player} closed")]
pub struct ConnectionError {
    /// Player whose connection failed.
    pub player: PlayerId,
}

/// Errors that can occur in the world simulation.
#[derive(Error, Debug)]
pub enum WorldError {
    /// A player interaction was rejected.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Storage failed; the interaction was rolled back.
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    /// Configuration could not be read or is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Mob type is not registered.
    #[error("unknown mob type: {0}")]
    UnknownMobType(String),

    /// Skin does not exist for the mob type.
    #[error("unknown skin {skin} for mob type {kind}")]
    UnknownSkin {
        /// Mob type
        kind: String,
        /// Requested skin
        skin: String,
    },

    /// Chunk is not loaded.
    #[error("chunk not found: {0}")]
    ChunkNotFound(ChunkAddr),

    /// Player is not connected.
    #[error("player not found: {0}")]
    PlayerNotFound(PlayerId),

    /// Mob is not loaded.
    #[error("mob not found: {0}")]
    MobNotFound(u64),

    /// The generation worker failed.
    #[error("generation worker: {0}")]
    Worker(#[from] WorkerError),
}

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
