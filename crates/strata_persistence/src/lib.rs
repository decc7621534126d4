//! # STRATA Persistence
//!
//! Durable storage for one world: metadata, per-voxel override history,
//! mobs, drop items and the schema version.
//!
//! ## Design
//!
//! Tables live in memory and are made durable by a write-ahead journal.
//! Every mutation is serialized into the journal before it touches the
//! tables. A checkpoint writes a compressed snapshot of all tables and
//! truncates the journal. Opening a store loads the snapshot and replays
//! committed journal records; incomplete transactions are discarded.
//!
//! ```rust,ignore
//! use strata_persistence::{JournalStore, WorldStore};
//!
//! let mut store = JournalStore::open("./world")?;
//! store.migrate()?;
//! store.begin()?;
//! store.block_set(world.id, pos, &item, BlockAction::Create)?;
//! store.commit()?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod migrations;
pub mod store;
pub mod tables;
pub mod wal;

pub use error::{PersistenceError, PersistenceResult};
pub use migrations::{Migration, MIGRATIONS};
pub use store::{JournalStore, NewEntity, NewWorld, WorldStore};
pub use tables::{DropItemRow, EntityRow, Indicators, JournalOp, ModifyRow, Tables, WorldRow};
pub use wal::WriteAheadLog;
