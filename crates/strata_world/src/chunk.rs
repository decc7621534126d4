//! # Server Chunk
//!
//! One loaded chunk: its voxels, who observes it, the mobs and drop items
//! anchored to it and its ticking blocks.
//!
//! ## Lifecycle
//!
//! ```text
//! New ──generate──> Loading ──blocks + overrides──> BlocksGenerated ──mobs/drops──> Ready
//! ```
//!
//! Voxels hold the generated terrain with every persisted override replayed
//! on top, so a voxel that was ever modified always reads back as its latest
//! override.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::{json, Value};
use strata_persistence::ModifyRow;
use strata_procedural::ChunkBlocks;
use strata_shared::{BlockItem, BlockPos, ChunkAddr, Packet, PacketName, PlayerId};

use crate::blocks::{BlockRegistry, TickingKind};

/// Load state of a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkState {
    /// Created, generation not requested yet.
    New,
    /// Waiting for the generation worker.
    Loading,
    /// Voxels and overrides in place, entities not loaded yet.
    BlocksGenerated,
    /// Fully loaded.
    Ready,
}

/// Outstanding generation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerationTicket {
    /// Tick the last request was sent
    pub requested_at: u64,
    /// Requests sent so far
    pub attempts: u32,
}

/// A loaded chunk.
pub struct ServerChunk {
    addr: ChunkAddr,
    state: ChunkState,
    blocks: Option<ChunkBlocks>,
    stateful: HashMap<BlockPos, BlockItem>,
    modify_list: BTreeMap<BlockPos, BlockItem>,
    observers: BTreeSet<PlayerId>,
    load_requests: BTreeSet<PlayerId>,
    mobs: BTreeSet<u64>,
    drop_items: BTreeSet<String>,
    ticking: BTreeMap<BlockPos, u32>,
    ticket: Option<GenerationTicket>,
    failed: bool,
}

impl ServerChunk {
    /// Creates an empty chunk in the `New` state.
    #[must_use]
    pub fn new(addr: ChunkAddr) -> Self {
        Self {
            addr,
            state: ChunkState::New,
            blocks: None,
            stateful: HashMap::new(),
            modify_list: BTreeMap::new(),
            observers: BTreeSet::new(),
            load_requests: BTreeSet::new(),
            mobs: BTreeSet::new(),
            drop_items: BTreeSet::new(),
            ticking: BTreeMap::new(),
            ticket: None,
            failed: false,
        }
    }

    /// Chunk address.
    #[must_use]
    pub const fn addr(&self) -> ChunkAddr {
        self.addr
    }

    /// Load state.
    #[must_use]
    pub const fn state(&self) -> ChunkState {
        self.state
    }

    /// Moves the chunk to another load state.
    pub fn set_state(&mut self, state: ChunkState) {
        self.state = state;
    }

    /// Returns true once entities are loaded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ChunkState::Ready
    }

    /// Returns true once generation gave up on this chunk.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.failed
    }

    /// Gives up on generating this chunk until it is evicted.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// Outstanding generation request.
    #[must_use]
    pub const fn ticket(&self) -> Option<GenerationTicket> {
        self.ticket
    }

    /// Records a generation request.
    pub fn set_ticket(&mut self, ticket: Option<GenerationTicket>) {
        self.ticket = ticket;
    }

    // =========================================================================
    // Voxels
    // =========================================================================

    /// Voxel at a world position; `None` before generation or outside.
    #[must_use]
    pub fn block(&self, pos: BlockPos) -> Option<BlockItem> {
        if let Some(item) = self.stateful.get(&pos) {
            return Some(item.clone());
        }
        self.blocks
            .as_ref()
            .and_then(|b| b.get_world(pos))
            .map(BlockItem::new)
    }

    /// Writes a voxel and records it in the modify list.
    ///
    /// Ignored before generation or outside the chunk.
    pub fn set_block(&mut self, pos: BlockPos, item: BlockItem, registry: &BlockRegistry) {
        let Some(blocks) = self.blocks.as_mut() else {
            return;
        };
        if !self.addr.contains(pos) {
            return;
        }
        blocks.set_world(pos, item.id);
        if registry.get(item.id).ticking.is_some() {
            self.ticking.entry(pos).or_insert(0);
        } else {
            self.ticking.remove(&pos);
        }
        if item.has_state() {
            self.stateful.insert(pos, item.clone());
        } else {
            self.stateful.remove(&pos);
        }
        self.modify_list.insert(pos, item);
    }

    /// Installs generated voxels and replays persisted overrides on top.
    pub fn apply_generated(
        &mut self,
        blocks: ChunkBlocks,
        modifiers: &[ModifyRow],
        registry: &BlockRegistry,
    ) {
        self.blocks = Some(blocks);
        self.stateful.clear();
        self.modify_list.clear();
        self.ticking.clear();
        for row in modifiers {
            self.set_block(row.pos, row.item(), registry);
        }
        self.ticket = None;
        self.failed = false;
        self.state = ChunkState::BlocksGenerated;
    }

    /// Overrides applied to this chunk.
    #[must_use]
    pub const fn modify_list(&self) -> &BTreeMap<BlockPos, BlockItem> {
        &self.modify_list
    }

    /// `CHUNK_LOADED` packet carrying the modify list.
    #[must_use]
    pub fn loaded_packet(&self) -> Packet {
        let modify_list: Vec<Value> = self
            .modify_list
            .iter()
            .map(|(pos, item)| json!({ "pos": pos, "item": item }))
            .collect();
        Packet::new(
            PacketName::ChunkLoaded,
            json!({ "addr": self.addr, "modify_list": modify_list }),
        )
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Adds an observer. Returns true if it was not observing yet.
    pub fn add_observer(&mut self, player: PlayerId) -> bool {
        self.observers.insert(player)
    }

    /// Removes an observer. Returns true if it was observing.
    pub fn remove_observer(&mut self, player: PlayerId) -> bool {
        self.load_requests.remove(&player);
        self.observers.remove(&player)
    }

    /// Returns true if anyone observes the chunk.
    #[must_use]
    pub fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    /// Observing players in ascending id order.
    #[must_use]
    pub fn observers(&self) -> Vec<PlayerId> {
        self.observers.iter().copied().collect()
    }

    /// Remembers a load request answered once the chunk is ready.
    pub fn request_load(&mut self, player: PlayerId) {
        self.load_requests.insert(player);
    }

    /// Pending load requests, cleared.
    pub fn take_load_requests(&mut self) -> Vec<PlayerId> {
        std::mem::take(&mut self.load_requests).into_iter().collect()
    }

    // =========================================================================
    // Anchored entities
    // =========================================================================

    /// Anchors a mob.
    pub fn add_mob(&mut self, id: u64) {
        self.mobs.insert(id);
    }

    /// Releases a mob.
    pub fn remove_mob(&mut self, id: u64) {
        self.mobs.remove(&id);
    }

    /// Anchored mob ids.
    #[must_use]
    pub fn mob_ids(&self) -> Vec<u64> {
        self.mobs.iter().copied().collect()
    }

    /// Anchors a drop item.
    pub fn add_drop_item(&mut self, entity_id: String) {
        self.drop_items.insert(entity_id);
    }

    /// Releases a drop item. Returns true if it was anchored here.
    pub fn remove_drop_item(&mut self, entity_id: &str) -> bool {
        self.drop_items.remove(entity_id)
    }

    /// Anchored drop item ids.
    #[must_use]
    pub fn drop_item_ids(&self) -> Vec<String> {
        self.drop_items.iter().cloned().collect()
    }

    // =========================================================================
    // Ticking
    // =========================================================================

    /// Returns true if the chunk holds ticking blocks.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        !self.ticking.is_empty()
    }

    /// Advances every ticking block by one tick.
    ///
    /// Returns the voxels that changed; the caller applies them like any
    /// other modification so they are persisted and broadcast.
    pub fn tick(&mut self, registry: &BlockRegistry) -> Vec<(BlockPos, BlockItem)> {
        let mut due = Vec::new();
        for (pos, counter) in &mut self.ticking {
            let Some(item) = self.stateful.get(pos).cloned().or_else(|| {
                self.blocks
                    .as_ref()
                    .and_then(|b| b.get_world(*pos))
                    .map(BlockItem::new)
            }) else {
                continue;
            };
            let Some(rule) = registry.get(item.id).ticking else {
                continue;
            };
            *counter += 1;
            if *counter < rule.interval {
                continue;
            }
            *counter = 0;
            if let Some(next) = step(&item, rule.kind) {
                due.push((*pos, next));
            }
        }
        due
    }
}

/// One ticking step of a block, `None` when nothing changes.
fn step(item: &BlockItem, kind: TickingKind) -> Option<BlockItem> {
    match kind {
        TickingKind::Growth { max_stage, grown } => {
            if item.extra_flag("complete") {
                return None;
            }
            let next = item.extra_int("stage").unwrap_or(0) + 1;
            if next >= max_stage {
                if let Some(grown) = grown {
                    return Some(BlockItem::new(grown));
                }
            }
            let mut out = item.clone();
            out.set_extra("stage", json!(next.min(max_stage)));
            if next >= max_stage {
                out.set_extra("complete", json!(true));
            }
            Some(out)
        }
        TickingKind::Burn => {
            let fuel = item.extra_int("fuel").unwrap_or(0);
            if fuel <= 0 {
                return None;
            }
            let mut out = item.clone();
            out.set_extra("fuel", json!(fuel - 1));
            out.set_extra("lit", json!(fuel > 1));
            Some(out)
        }
    }
}
