//! # World Tables
//!
//! Typed rows for every persisted table and the journal operations that
//! mutate them.
//!
//! ## Design
//!
//! Rows are keyed by a single monotonically increasing id sequence. Every
//! mutation is a `put` (insert or overwrite by id), so undoing it only needs
//! the previous value of the same key. Secondary indexes are rebuilt after a
//! snapshot load and maintained on every put.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_shared::{BlockItem, BlockPos, ChunkAddr, ItemStack, Vec3};

/// `world` table row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldRow {
    /// Row id
    pub id: u64,
    /// Public world identifier
    pub guid: String,
    /// Display title
    pub title: String,
    /// Generation seed phrase
    pub seed: String,
    /// Generator configuration, as stored JSON
    pub generator: Value,
    /// Spawn point for new and fallen players
    pub pos_spawn: Vec3,
    /// Creation time, unix seconds
    pub dt: u64,
    /// Calendar offset in day-time units
    pub add_time: i64,
}

/// `world_modify` table row: one voxel override.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModifyRow {
    /// Row id; higher ids supersede lower ones at the same position
    pub id: u64,
    /// Owning world
    pub world_id: u64,
    /// Voxel position
    pub pos: BlockPos,
    /// Full block item, `None` for air
    pub params: Option<Value>,
    /// Entity reference copied out of `params`
    pub entity_id: Option<String>,
    /// Extra state copied out of `params`
    pub extra_data: Option<Value>,
    /// Block id copied out of `params`
    pub block_id: u16,
    /// Scheduled tick counter
    pub ticks: Option<u32>,
}

impl ModifyRow {
    /// Block item stored in this row.
    #[must_use]
    pub fn item(&self) -> BlockItem {
        self.params
            .as_ref()
            .and_then(|p| serde_json::from_value(p.clone()).ok())
            .unwrap_or(BlockItem::AIR)
    }
}

/// Mob health, hunger and air.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    /// Health
    pub live: f64,
    /// Hunger
    pub food: f64,
    /// Air
    pub oxygen: f64,
}

impl Default for Indicators {
    fn default() -> Self {
        Self {
            live: 20.0,
            food: 20.0,
            oxygen: 10.0,
        }
    }
}

/// `entity` table row: one mob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    /// Row id
    pub id: u64,
    /// Unique entity identifier
    pub entity_id: String,
    /// Mob type tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Skin name
    pub skin: String,
    /// Current position
    pub pos: Vec3,
    /// Where the mob was spawned
    pub pos_spawn: Vec3,
    /// Rotation
    pub rotate: Vec3,
    /// Indicator values
    pub indicators: Indicators,
    /// Free-form state
    pub extra_data: Value,
    /// Soft-delete flag
    pub is_active: bool,
}

/// `drop_item` table row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DropItemRow {
    /// Row id
    pub id: u64,
    /// Unique entity identifier
    pub entity_id: String,
    /// Carried stacks
    pub items: Vec<ItemStack>,
    /// Position
    pub pos: Vec3,
    /// Creation time, unix seconds
    pub dt: u64,
    /// Soft-delete flag
    pub is_deleted: bool,
}

/// A single journaled mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "row", rename_all = "snake_case")]
pub enum JournalOp {
    /// Insert or overwrite a world row.
    PutWorld(WorldRow),
    /// Insert or overwrite a voxel override row.
    PutModify(ModifyRow),
    /// Insert or overwrite an entity row.
    PutEntity(EntityRow),
    /// Insert or overwrite a drop item row.
    PutDropItem(DropItemRow),
    /// Record that a chunk's mobs were generated.
    MarkChunkMobsGenerated(ChunkAddr),
    /// Set the schema version.
    SetVersion(u32),
    /// Replace every table (migrations).
    ReplaceAll(Box<Tables>),
}

/// Inverse of one applied [`JournalOp`].
#[derive(Debug)]
pub(crate) enum Undo {
    World(u64, Option<WorldRow>),
    Modify(u64, Option<ModifyRow>),
    Entity(u64, Option<EntityRow>),
    DropItem(u64, Option<DropItemRow>),
    ChunkMobs(ChunkAddr, bool),
    Version(u32),
    All(Box<Tables>),
}

/// Every persisted table of one world.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    /// `options.version`: last applied migration
    pub version: u32,
    /// Last id handed out by the shared sequence
    pub next_id: u64,
    /// `world`
    pub world: BTreeMap<u64, WorldRow>,
    /// `world_modify`
    pub world_modify: BTreeMap<u64, ModifyRow>,
    /// `entity`
    pub entity: BTreeMap<u64, EntityRow>,
    /// `drop_item`
    pub drop_item: BTreeMap<u64, DropItemRow>,
    /// `chunk`: addresses whose mobs were generated
    pub chunk: BTreeSet<ChunkAddr>,

    #[serde(skip)]
    latest_modify: HashMap<BlockPos, u64>,
    #[serde(skip)]
    chunk_modify: HashMap<ChunkAddr, BTreeSet<BlockPos>>,
    #[serde(skip)]
    entity_index: HashMap<String, u64>,
    #[serde(skip)]
    drop_item_index: HashMap<String, u64>,
}

impl Tables {
    /// Hands out the next row id.
    pub fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Rebuilds every secondary index from the row maps.
    pub fn rebuild_indexes(&mut self) {
        self.latest_modify.clear();
        self.chunk_modify.clear();
        self.entity_index.clear();
        self.drop_item_index.clear();

        // BTreeMap iterates ids ascending, so later rows win.
        for (id, row) in &self.world_modify {
            self.latest_modify.insert(row.pos, *id);
            self.chunk_modify
                .entry(row.pos.chunk_addr())
                .or_default()
                .insert(row.pos);
        }
        for (id, row) in &self.entity {
            self.entity_index.insert(row.entity_id.clone(), *id);
        }
        for (id, row) in &self.drop_item {
            self.drop_item_index.insert(row.entity_id.clone(), *id);
        }
    }

    /// Authoritative override row for a position.
    #[must_use]
    pub fn latest_modify(&self, pos: BlockPos) -> Option<&ModifyRow> {
        self.latest_modify
            .get(&pos)
            .and_then(|id| self.world_modify.get(id))
    }

    /// Authoritative override rows inside a chunk.
    pub fn chunk_modifiers(&self, addr: ChunkAddr) -> impl Iterator<Item = &ModifyRow> {
        self.chunk_modify
            .get(&addr)
            .into_iter()
            .flatten()
            .filter_map(|pos| self.latest_modify(*pos))
    }

    /// Chunk addresses holding at least one override.
    pub fn modified_chunks(&self) -> impl Iterator<Item = ChunkAddr> + '_ {
        self.chunk_modify.keys().copied()
    }

    /// World row by guid.
    #[must_use]
    pub fn world_by_guid(&self, guid: &str) -> Option<&WorldRow> {
        self.world.values().find(|w| w.guid == guid)
    }

    /// Entity row by entity id.
    #[must_use]
    pub fn entity_by_uuid(&self, entity_id: &str) -> Option<&EntityRow> {
        self.entity_index
            .get(entity_id)
            .and_then(|id| self.entity.get(id))
    }

    /// Drop item row by entity id.
    #[must_use]
    pub fn drop_item_by_uuid(&self, entity_id: &str) -> Option<&DropItemRow> {
        self.drop_item_index
            .get(entity_id)
            .and_then(|id| self.drop_item.get(id))
    }

    /// Applies one operation and returns its inverse.
    pub(crate) fn apply(&mut self, op: JournalOp) -> Undo {
        match op {
            JournalOp::PutWorld(row) => {
                let id = row.id;
                self.bump_sequence(id);
                Undo::World(id, self.world.insert(id, row))
            }
            JournalOp::PutModify(row) => {
                let id = row.id;
                self.bump_sequence(id);
                self.index_modify(&row);
                Undo::Modify(id, self.world_modify.insert(id, row))
            }
            JournalOp::PutEntity(row) => {
                let id = row.id;
                self.bump_sequence(id);
                self.entity_index.insert(row.entity_id.clone(), id);
                Undo::Entity(id, self.entity.insert(id, row))
            }
            JournalOp::PutDropItem(row) => {
                let id = row.id;
                self.bump_sequence(id);
                self.drop_item_index.insert(row.entity_id.clone(), id);
                Undo::DropItem(id, self.drop_item.insert(id, row))
            }
            JournalOp::MarkChunkMobsGenerated(addr) => {
                let was_new = self.chunk.insert(addr);
                Undo::ChunkMobs(addr, !was_new)
            }
            JournalOp::SetVersion(version) => {
                let previous = self.version;
                self.version = version;
                Undo::Version(previous)
            }
            JournalOp::ReplaceAll(tables) => {
                let mut tables = *tables;
                tables.rebuild_indexes();
                Undo::All(Box::new(std::mem::replace(self, tables)))
            }
        }
    }

    /// Reverts one applied operation.
    pub(crate) fn undo(&mut self, undo: Undo) {
        match undo {
            Undo::World(id, previous) => {
                restore(&mut self.world, id, previous);
            }
            Undo::Modify(id, previous) => {
                let pos = self.world_modify.get(&id).map(|r| r.pos);
                restore(&mut self.world_modify, id, previous);
                if let Some(pos) = pos {
                    self.reindex_position(pos);
                }
            }
            Undo::Entity(id, previous) => {
                if let Some(row) = self.entity.get(&id) {
                    self.entity_index.remove(&row.entity_id);
                }
                if let Some(row) = &previous {
                    self.entity_index.insert(row.entity_id.clone(), id);
                }
                restore(&mut self.entity, id, previous);
            }
            Undo::DropItem(id, previous) => {
                if let Some(row) = self.drop_item.get(&id) {
                    self.drop_item_index.remove(&row.entity_id);
                }
                if let Some(row) = &previous {
                    self.drop_item_index.insert(row.entity_id.clone(), id);
                }
                restore(&mut self.drop_item, id, previous);
            }
            Undo::ChunkMobs(addr, was_present) => {
                if !was_present {
                    self.chunk.remove(&addr);
                }
            }
            Undo::Version(version) => self.version = version,
            Undo::All(tables) => *self = *tables,
        }
    }

    fn bump_sequence(&mut self, id: u64) {
        self.next_id = self.next_id.max(id);
    }

    fn index_modify(&mut self, row: &ModifyRow) {
        let latest = self.latest_modify.entry(row.pos).or_insert(row.id);
        *latest = (*latest).max(row.id);
        self.chunk_modify
            .entry(row.pos.chunk_addr())
            .or_default()
            .insert(row.pos);
    }

    /// Recomputes the latest row for one position after an undo.
    fn reindex_position(&mut self, pos: BlockPos) {
        let latest = self
            .world_modify
            .iter()
            .rev()
            .find(|(_, row)| row.pos == pos)
            .map(|(id, _)| *id);
        let addr = pos.chunk_addr();
        if let Some(id) = latest {
            self.latest_modify.insert(pos, id);
        } else {
            self.latest_modify.remove(&pos);
            if let Some(set) = self.chunk_modify.get_mut(&addr) {
                set.remove(&pos);
                if set.is_empty() {
                    self.chunk_modify.remove(&addr);
                }
            }
        }
    }
}

fn restore<T>(map: &mut BTreeMap<u64, T>, id: u64, previous: Option<T>) {
    match previous {
        Some(row) => {
            map.insert(id, row);
        }
        None => {
            map.remove(&id);
        }
    }
}
