//! # STRATA World
//!
//! Server-authoritative simulation of one voxel world.
//!
//! ## Architecture
//!
//! A single tick thread owns the [`World`]. Everything else talks to it
//! through channels: players push [`Intent`]s into the inbound channel,
//! the generation worker answers chunk requests on its own channel and
//! outbound packets are written to each player's [`PlayerConnection`].
//!
//! ```text
//! players --Intent--> [ inbound ] --+
//!                                   |
//!                    +--------------v---------------+
//!   generation <---->|  World::tick (fixed cadence) |----> store (journal)
//!   worker           |  calendar, chunks, mobs,     |
//!                    |  players, drops, intents,    |
//!                    |  packets, deferred actions   |
//!                    +--------------+---------------+
//!                                   |
//!                                   v
//!                          PlayerConnection::send
//! ```
//!
//! ## Block modifications
//!
//! A click becomes a [`WorldAction`] through the handler chain in
//! [`actions`]. Applying it persists the voxel overrides first (in one
//! transaction when there are several), then mutates memory and finally
//! broadcasts to the observers of each touched chunk.
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_world::{World, WorldConfig};
//!
//! let config = WorldConfig::load("strata.toml")?;
//! let mut world = World::open_dir(config)?;
//! let intents = world.sender();
//! world.run(&running)?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod actions;
pub mod blocks;
pub mod calendar;
pub mod chunk;
pub mod chunk_manager;
pub mod config;
pub mod drop_item;
pub mod error;
pub mod mob;
pub mod network;
pub mod player;
pub mod spiral;
pub mod tick;
pub mod tracker;
pub mod world;

pub use actions::{Explosion, PickatEvent, WorldAction};
pub use blocks::{BlockRegistry, Material, Tag};
pub use calendar::WorldCalendar;
pub use chunk::{ChunkState, ServerChunk};
pub use chunk_manager::{BlockAccess, ChunkManager};
pub use config::WorldConfig;
pub use drop_item::{DropItem, DropItemManager};
pub use error::{ValidationError, WorldError, WorldResult};
pub use mob::{Mob, MobManager, MobRegistry};
pub use network::{ChannelConnection, PacketLog, PlayerConnection, RecordingConnection};
pub use player::{GameMode, Inventory, ServerPlayer};
pub use tick::{TickLoop, TickPhase, TickStats};
pub use tracker::ModificationTracker;
pub use world::{Intent, World, WorldInfo};
