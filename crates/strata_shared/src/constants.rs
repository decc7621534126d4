//! # World Constants
//!
//! Values every crate must agree on. Changing chunk dimensions invalidates
//! every persisted world.

// =============================================================================
// CHUNK GEOMETRY
// =============================================================================

/// Chunk width along X in blocks.
pub const CHUNK_SIZE_X: i32 = 16;

/// Chunk height along Y in blocks.
pub const CHUNK_SIZE_Y: i32 = 40;

/// Chunk depth along Z in blocks.
pub const CHUNK_SIZE_Z: i32 = 16;

/// Number of voxels in one chunk.
#[allow(clippy::cast_sign_loss)]
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE_X * CHUNK_SIZE_Y * CHUNK_SIZE_Z) as usize;

/// Vertical visibility margin, in chunks, around a player.
pub const MAX_Y_MARGIN: i32 = 3;

// =============================================================================
// TICK CADENCE
// =============================================================================

/// Target duration of one world tick in milliseconds.
pub const TICK_INTERVAL_MS: u64 = 50;

/// Ticks between two throttled mob saves.
pub const MOB_SAVE_INTERVAL_TICKS: u32 = 200;

// =============================================================================
// CALENDAR
// =============================================================================

/// How many game seconds pass per real second.
pub const GAME_ONE_SECOND: u64 = 72;

/// Length of one game day in day-time units.
pub const GAME_DAY_SECONDS: u64 = 24_000;

/// Real seconds in one game day.
pub const REAL_SECONDS_PER_GAME_DAY: u64 = 86_400 / GAME_ONE_SECOND;

/// Day-time offset given to newly created worlds (early morning).
pub const DEFAULT_ADD_TIME: i64 = 7_000;

// =============================================================================
// PLAYERS
// =============================================================================

/// Render distance, in chunks, for players that never asked for one.
pub const DEFAULT_RENDER_DIST: i32 = 4;

/// Smallest render distance a player may request.
pub const MIN_RENDER_DIST: i32 = 2;

/// Largest render distance a player may request.
pub const MAX_RENDER_DIST: i32 = 16;

/// Distance at which a player picks up a drop item.
pub const DROP_ITEM_PICKUP_RADIUS: f64 = 1.5;
