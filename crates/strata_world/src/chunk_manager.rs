//! # Chunk Lifecycle Manager
//!
//! Owns every loaded chunk, decides which chunks each player observes,
//! hands generation to the worker and evicts chunks nobody observes.
//!
//! ## Tick
//!
//! ```text
//! 1. sweep the invalid queue, evicting chunks that still have no observer
//! 2. drain worker responses; replay persisted overrides on arrival
//! 3. New -> request generation; Loading -> retry on timeout
//!    BlocksGenerated -> reported so the world loads mobs and drops
//! 4. tick chunks holding ticking blocks
//! ```
//!
//! Eviction is deferred to the next sweep, so a chunk whose last observer
//! leaves and another arrives within the same tick is never unloaded.

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde_json::json;
use strata_persistence::WorldStore;
use strata_procedural::{GenerationChannel, GeneratorConfig, WorkerRequest, WorkerResponse};
use strata_shared::{Aabb, BlockItem, BlockPos, ChunkAddr, Packet, PacketName, PlayerId};

use crate::blocks::BlockRegistry;
use crate::chunk::{ChunkState, GenerationTicket, ServerChunk};
use crate::config::{GenerationConfig, WorldConfig};
use crate::error::WorldResult;
use crate::player::ServerPlayer;
use crate::spiral::SpiralCache;
use crate::tracker::ModificationTracker;

/// Read access to voxels, `None` where no chunk is loaded.
pub trait BlockAccess {
    /// Voxel at a position.
    fn block_at(&self, pos: BlockPos) -> Option<BlockItem>;
}

/// Sparse voxel map where every absent position reads as air.
impl BlockAccess for HashMap<BlockPos, BlockItem> {
    fn block_at(&self, pos: BlockPos) -> Option<BlockItem> {
        Some(self.get(&pos).cloned().unwrap_or(BlockItem::AIR))
    }
}

/// Result of one visibility recomputation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisibilityChange {
    /// Newly observed chunks and whether they hold overrides
    pub added: Vec<(ChunkAddr, bool)>,
    /// Chunks no longer observed
    pub deleted: Vec<ChunkAddr>,
}

impl VisibilityChange {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }

    /// `NEARBY_CHUNKS` packet.
    #[must_use]
    pub fn packet(&self, render_dist: i32) -> Packet {
        let added: Vec<_> = self
            .added
            .iter()
            .map(|(addr, has_modifiers)| json!({ "addr": addr, "has_modifiers": has_modifiers }))
            .collect();
        Packet::new(
            PacketName::NearbyChunks,
            json!({
                "chunk_render_dist": render_dist,
                "added": added,
                "deleted": self.deleted,
            }),
        )
    }
}

/// What one chunk tick produced for the world to finish.
#[derive(Default)]
pub struct ChunkTickReport {
    /// Chunks removed by the sweep
    pub evicted: Vec<ServerChunk>,
    /// Chunks waiting for their mobs and drop items
    pub generated: Vec<ChunkAddr>,
    /// Chunks that gave up on generation this tick
    pub failed: Vec<ChunkAddr>,
    /// Voxel changes from ticking blocks
    pub block_updates: Vec<(BlockPos, BlockItem)>,
}

/// Registry and lifecycle driver of loaded chunks.
pub struct ChunkManager {
    chunks: HashMap<ChunkAddr, ServerChunk>,
    invalid: VecDeque<ChunkAddr>,
    worker: Box<dyn GenerationChannel>,
    worker_ready: bool,
    spiral: SpiralCache,
    generation: GenerationConfig,
    allow_negative_y: bool,
    max_y_margin: i32,
    tick_number: u64,
}

impl ChunkManager {
    /// Creates an empty manager bound to a generation channel.
    #[must_use]
    pub fn new(worker: Box<dyn GenerationChannel>, config: &WorldConfig) -> Self {
        Self {
            chunks: HashMap::new(),
            invalid: VecDeque::new(),
            worker,
            worker_ready: false,
            spiral: SpiralCache::new(),
            generation: config.generation,
            allow_negative_y: config.allow_negative_y,
            max_y_margin: config.max_y_margin,
            tick_number: 0,
        }
    }

    /// Sends the generator configuration to the worker.
    ///
    /// # Errors
    ///
    /// Fails when the worker is gone.
    pub fn init_worker(
        &mut self,
        generator: GeneratorConfig,
        seed: &str,
        world_guid: &str,
    ) -> WorldResult<()> {
        self.worker.send(WorkerRequest::Init {
            generator,
            seed: seed.to_string(),
            world_guid: world_guid.to_string(),
        })?;
        Ok(())
    }

    /// Returns true once the worker acknowledged its configuration.
    #[must_use]
    pub const fn is_worker_ready(&self) -> bool {
        self.worker_ready
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Inserts a chunk. Returns false if the address was already loaded.
    pub fn add(&mut self, chunk: ServerChunk) -> bool {
        let addr = chunk.addr();
        if self.chunks.contains_key(&addr) {
            return false;
        }
        self.chunks.insert(addr, chunk);
        true
    }

    /// Loaded chunk.
    #[must_use]
    pub fn get(&self, addr: ChunkAddr) -> Option<&ServerChunk> {
        self.chunks.get(&addr)
    }

    /// Loaded chunk, mutable.
    pub fn get_mut(&mut self, addr: ChunkAddr) -> Option<&mut ServerChunk> {
        self.chunks.get_mut(&addr)
    }

    /// Removes a chunk unconditionally.
    pub fn remove(&mut self, addr: ChunkAddr) -> Option<ServerChunk> {
        self.chunks.remove(&addr)
    }

    /// Number of loaded chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns true if no chunk is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Loaded addresses in ascending order.
    #[must_use]
    pub fn addrs(&self) -> Vec<ChunkAddr> {
        let mut addrs: Vec<_> = self.chunks.keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    /// Chunks loaded from the inclusive chunk range covered by `aabb`.
    ///
    /// Never creates chunks.
    #[must_use]
    pub fn get_in_aabb(&self, aabb: &Aabb) -> Vec<&ServerChunk> {
        let (lo, hi) = aabb.chunk_range();
        let mut found = Vec::new();
        for y in lo.y..=hi.y {
            for z in lo.z..=hi.z {
                for x in lo.x..=hi.x {
                    if let Some(chunk) = self.chunks.get(&ChunkAddr::new(x, y, z)) {
                        found.push(chunk);
                    }
                }
            }
        }
        found
    }

    /// Voxel at a world position; `None` until the chunk is generated.
    #[must_use]
    pub fn get_block(&self, pos: BlockPos) -> Option<BlockItem> {
        self.chunks.get(&pos.chunk_addr()).and_then(|c| c.block(pos))
    }

    // =========================================================================
    // Eviction
    // =========================================================================

    /// Queues a chunk for the next sweep.
    pub fn invalidate(&mut self, addr: ChunkAddr) {
        self.invalid.push_back(addr);
    }

    /// Drains the invalid queue, evicting chunks that still have no
    /// observer. Chunks observed again since they were queued stay.
    pub fn unload_invalid_chunks(&mut self) -> Vec<ServerChunk> {
        let mut evicted = Vec::new();
        while let Some(addr) = self.invalid.pop_front() {
            let idle = self.chunks.get(&addr).is_some_and(|c| !c.has_observers());
            if idle {
                if let Some(chunk) = self.chunks.remove(&addr) {
                    evicted.push(chunk);
                }
            }
        }
        if !evicted.is_empty() {
            tracing::debug!("evicted {} chunks, {} loaded", evicted.len(), self.chunks.len());
        }
        evicted
    }

    fn detach(&mut self, addr: ChunkAddr, player: PlayerId) {
        if let Some(chunk) = self.chunks.get_mut(&addr) {
            chunk.remove_observer(player);
            if !chunk.has_observers() {
                self.invalid.push_back(addr);
            }
        }
    }

    // =========================================================================
    // Visibility
    // =========================================================================

    /// Recomputes the chunks a player observes.
    ///
    /// Runs when `force` is set or the player crossed into another chunk.
    /// New addresses get a chunk (created if needed) observed by the
    /// player; addresses left behind are detached. Returns `None` when the
    /// check did not run.
    pub fn check_player_visible_chunks(
        &mut self,
        player: &mut ServerPlayer,
        force: bool,
        tracker: &ModificationTracker,
    ) -> Option<VisibilityChange> {
        let addr = ChunkAddr::from_world(player.pos);
        if !force && player.last_visibility_addr() == Some(addr) {
            return None;
        }

        let margin = (player.render_dist() + 1).max(1);
        let offsets = self.spiral.get(margin, self.max_y_margin);
        let mut change = VisibilityChange::default();
        let mut candidates = BTreeSet::new();

        for offset in offsets.iter() {
            let candidate = addr.offset(offset.x, offset.y, offset.z);
            if !self.allow_negative_y && candidate.y < 0 {
                continue;
            }
            candidates.insert(candidate);
            if player.nearby().contains(&candidate) {
                continue;
            }
            player.nearby_mut().insert(candidate);
            change
                .added
                .push((candidate, tracker.has_modifiers(candidate)));
            self.chunks
                .entry(candidate)
                .or_insert_with(|| ServerChunk::new(candidate))
                .add_observer(player.id);
        }

        let stale: Vec<ChunkAddr> = player
            .nearby()
            .iter()
            .filter(|a| !candidates.contains(a))
            .copied()
            .collect();
        for gone in stale {
            player.nearby_mut().remove(&gone);
            self.detach(gone, player.id);
            change.deleted.push(gone);
        }

        player.set_visibility_addr(addr);
        Some(change)
    }

    /// Detaches a leaving player from every chunk it observes.
    pub fn detach_player(&mut self, player: &mut ServerPlayer) {
        let nearby: Vec<ChunkAddr> = std::mem::take(player.nearby_mut()).into_iter().collect();
        for addr in nearby {
            self.detach(addr, player.id);
        }
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advances every chunk by one tick.
    pub fn tick(
        &mut self,
        store: &dyn WorldStore,
        tracker: &ModificationTracker,
        registry: &BlockRegistry,
    ) -> ChunkTickReport {
        self.tick_number += 1;
        let mut report = ChunkTickReport {
            evicted: self.unload_invalid_chunks(),
            ..ChunkTickReport::default()
        };
        self.poll_worker(store, tracker, registry);
        self.advance_generation(&mut report);

        for addr in self.addrs() {
            if let Some(chunk) = self.chunks.get_mut(&addr) {
                if chunk.is_ready() && chunk.is_ticking() {
                    report.block_updates.extend(chunk.tick(registry));
                }
            }
        }
        report
    }

    fn poll_worker(
        &mut self,
        store: &dyn WorldStore,
        tracker: &ModificationTracker,
        registry: &BlockRegistry,
    ) {
        while let Some(response) = self.worker.try_recv() {
            match response {
                WorkerResponse::Inited { world_guid } => {
                    self.worker_ready = true;
                    tracing::info!("generation worker initialized for {}", world_guid);
                }
                WorkerResponse::BlocksGenerated { addr, blocks } => {
                    let Some(chunk) = self.chunks.get_mut(&addr) else {
                        tracing::debug!("blocks for evicted chunk {} ignored", addr);
                        continue;
                    };
                    if chunk.state() != ChunkState::Loading {
                        tracing::debug!("duplicate blocks for chunk {} ignored", addr);
                        continue;
                    }
                    let modifiers = if tracker.has_modifiers(addr) {
                        match store.load_chunk_modifiers(addr) {
                            Ok(rows) => rows,
                            Err(e) => {
                                // The ticket stays, so the timeout retries.
                                tracing::warn!("loading overrides of chunk {} failed: {}", addr, e);
                                continue;
                            }
                        }
                    } else {
                        Vec::new()
                    };
                    chunk.apply_generated(blocks, &modifiers, registry);
                }
            }
        }
    }

    fn advance_generation(&mut self, report: &mut ChunkTickReport) {
        let now = self.tick_number;
        for addr in self.addrs() {
            let Some(chunk) = self.chunks.get_mut(&addr) else {
                continue;
            };
            match chunk.state() {
                ChunkState::New => {
                    if let Err(e) = self.worker.send(WorkerRequest::Generate(addr)) {
                        tracing::warn!("generation request for chunk {} failed: {}", addr, e);
                        continue;
                    }
                    chunk.set_state(ChunkState::Loading);
                    chunk.set_ticket(Some(GenerationTicket {
                        requested_at: now,
                        attempts: 1,
                    }));
                }
                ChunkState::Loading if !chunk.is_failed() => {
                    let Some(ticket) = chunk.ticket() else {
                        continue;
                    };
                    if now.saturating_sub(ticket.requested_at) < self.generation.timeout_ticks {
                        continue;
                    }
                    if ticket.attempts > self.generation.max_retries {
                        chunk.mark_failed();
                        chunk.set_ticket(None);
                        report.failed.push(addr);
                        tracing::error!(
                            "generation of chunk {} failed after {} attempts",
                            addr,
                            ticket.attempts
                        );
                        continue;
                    }
                    tracing::warn!(
                        "generation of chunk {} timed out, retry {}/{}",
                        addr,
                        ticket.attempts,
                        self.generation.max_retries
                    );
                    if let Err(e) = self.worker.send(WorkerRequest::Generate(addr)) {
                        tracing::warn!("generation request for chunk {} failed: {}", addr, e);
                    }
                    chunk.set_ticket(Some(GenerationTicket {
                        requested_at: now,
                        attempts: ticket.attempts + 1,
                    }));
                }
                ChunkState::BlocksGenerated => report.generated.push(addr),
                ChunkState::Loading | ChunkState::Ready => {}
            }
        }
    }

    /// Prunes auxiliary caches. Returns the number of dropped entries.
    pub fn gc(&mut self) -> usize {
        let mut dropped = self.spiral.prune();
        for chunk in self.chunks.values_mut() {
            if chunk.ticket().is_some() && chunk.state() != ChunkState::Loading {
                chunk.set_ticket(None);
                dropped += 1;
            }
        }
        dropped
    }
}

impl BlockAccess for ChunkManager {
    fn block_at(&self, pos: BlockPos) -> Option<BlockItem> {
        self.get_block(pos)
    }
}
