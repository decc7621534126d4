//! # STRATA Shared
//!
//! Common types used by the persistence layer, the terrain generator and
//! the world simulation.
//!
//! ## Contents
//!
//! - [`constants`]: chunk dimensions, tick cadence, calendar ratios
//! - [`math`]: world vectors, block positions, chunk addresses, boxes
//! - [`block_id`]: the numeric block/item id table
//! - [`protocol`]: packets and the block/item payloads they carry

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod block_id;
pub mod constants;
pub mod math;
pub mod protocol;

pub use constants::{CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, CHUNK_VOLUME};
pub use math::{Aabb, BlockPos, ChunkAddr, Vec3};
pub use protocol::{BlockAction, BlockItem, ItemStack, Packet, PacketName, PlayerId};
