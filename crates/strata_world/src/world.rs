//! # World
//!
//! Owner of every simulation component and driver of the tick.
//!
//! ## Tick
//!
//! ```text
//! calendar ─► chunks ─► mobs ─► players ─► drop items
//!          ─► inbound ─► outbound ─► action queue ─► maintenance
//! ```
//!
//! Only the tick thread touches a `World`. Players talk to it through
//! [`Intent`]s sent over the channel returned by [`World::sender`]; the
//! world answers through each player's connection. A phase that fails is
//! logged with its name and the remaining phases still run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use strata_persistence::{JournalStore, NewWorld, WorldRow, WorldStore};
use strata_procedural::generator::NoiseTerrainGenerator;
use strata_procedural::{GenerationChannel, GenerationWorker, GeneratorConfig, WorldSeed};
use strata_shared::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z};
use strata_shared::{
    block_id, BlockAction, BlockItem, BlockPos, ChunkAddr, Packet, PacketName, PlayerId, Vec3,
};

use crate::actions::{
    make_explosion, pickat_action, ActionQueue, Deferred, Explosion, MobSpawn, PickatEvent,
    PickatInput, WorldAction, MAX_REACH,
};
use crate::blocks::BlockRegistry;
use crate::calendar::WorldCalendar;
use crate::chunk::{ChunkState, ServerChunk};
use crate::chunk_manager::ChunkManager;
use crate::config::WorldConfig;
use crate::drop_item::{deleted_packet, DropItemManager};
use crate::error::{ValidationError, WorldError, WorldResult};
use crate::mob::{delete_packet, BrainEffect, MobManager};
use crate::network::{send_all, send_selected, PacketQueue, PlayerConnection, Players, Targets};
use crate::player::{GameMode, ServerPlayer};
use crate::tick::{TickLoop, TickPhase, TickStats};
use crate::tracker::ModificationTracker;

/// Probability that a freshly generated chunk gets animals.
const NATURAL_SPAWN_CHANCE: f64 = 0.3;

/// Most animals placed in one chunk.
const NATURAL_SPAWN_MAX: usize = 3;

/// Immutable identity of the served world.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldInfo {
    /// Row id
    pub id: u64,
    /// Public identifier
    pub guid: String,
    /// Display title
    pub title: String,
    /// Seed phrase
    pub seed: String,
    /// Terrain generator
    pub generator: GeneratorConfig,
    /// Spawn point
    pub pos_spawn: Vec3,
    /// Creation time, unix seconds
    pub dt: u64,
    /// Calendar offset
    pub add_time: i64,
}

impl WorldInfo {
    fn from_row(row: WorldRow) -> WorldResult<Self> {
        let generator = GeneratorConfig::from_value(&row.generator)
            .map_err(|e| WorldError::Config(format!("generator of world {}: {e}", row.guid)))?;
        Ok(Self {
            id: row.id,
            guid: row.guid,
            title: row.title,
            seed: row.seed,
            generator,
            pos_spawn: row.pos_spawn,
            dt: row.dt,
            add_time: row.add_time,
        })
    }
}

/// Something a player asks the world to do.
pub enum Intent {
    /// A player connected.
    Join {
        /// New player id
        player_id: PlayerId,
        /// Display name
        username: String,
        /// Delivery endpoint
        connection: Box<dyn PlayerConnection>,
        /// Initial game mode
        game_mode: GameMode,
    },
    /// A player disconnected.
    Leave {
        /// Player
        player_id: PlayerId,
    },
    /// Position reported by the movement integrator.
    Move {
        /// Player
        player_id: PlayerId,
        /// Feet position
        pos: Vec3,
        /// Facing
        rotate: Vec3,
    },
    /// New render distance.
    RenderDist {
        /// Player
        player_id: PlayerId,
        /// Distance in chunks
        dist: i32,
    },
    /// Request for the modify list of an observed chunk.
    ChunkLoad {
        /// Player
        player_id: PlayerId,
        /// Chunk
        addr: ChunkAddr,
    },
    /// Click on a voxel.
    Pickat {
        /// Player
        player_id: PlayerId,
        /// Click details
        event: PickatEvent,
    },
    /// Click on a mob.
    PunchMob {
        /// Player
        player_id: PlayerId,
        /// Mob row id
        mob_id: u64,
        /// Mouse button
        button: u8,
    },
    /// Hotbar selection.
    SelectSlot {
        /// Player
        player_id: PlayerId,
        /// Hotbar index
        index: usize,
    },
    /// Chat line.
    Chat {
        /// Player
        player_id: PlayerId,
        /// Text
        text: String,
    },
}

impl Intent {
    /// Player the intent comes from.
    #[must_use]
    pub const fn player_id(&self) -> PlayerId {
        match self {
            Self::Join { player_id, .. }
            | Self::Leave { player_id }
            | Self::Move { player_id, .. }
            | Self::RenderDist { player_id, .. }
            | Self::ChunkLoad { player_id, .. }
            | Self::Pickat { player_id, .. }
            | Self::PunchMob { player_id, .. }
            | Self::SelectSlot { player_id, .. }
            | Self::Chat { player_id, .. } => *player_id,
        }
    }
}

/// The authoritative world.
pub struct World {
    pub(crate) info: WorldInfo,
    pub(crate) config: WorldConfig,
    pub(crate) calendar: WorldCalendar,
    pub(crate) store: Box<dyn WorldStore>,
    pub(crate) registry: BlockRegistry,
    pub(crate) chunks: ChunkManager,
    pub(crate) tracker: ModificationTracker,
    pub(crate) players: Players,
    pub(crate) mobs: MobManager,
    pub(crate) drop_items: DropItemManager,
    pub(crate) packets: PacketQueue,
    pub(crate) actions: ActionQueue,
    pub(crate) rng: ChaCha8Rng,
    seed: WorldSeed,
    tick_loop: TickLoop,
    inbound_tx: Sender<Intent>,
    inbound_rx: Receiver<Intent>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Spawn point of a new world: above the generated surface at the origin.
fn spawn_point(generator: &GeneratorConfig, seed: WorldSeed) -> Vec3 {
    let surface = match *generator {
        GeneratorConfig::Flat { ground_level } => ground_level,
        GeneratorConfig::Terrain { sea_level } => NoiseTerrainGenerator::new(seed, sea_level)
            .surface_height(0, 0)
            .max(sea_level),
    };
    Vec3::new(0.5, f64::from(surface + 1), 0.5)
}

impl World {
    /// Opens the configured world, creating it on first use.
    ///
    /// Pending migrations run first; the modification tracker is rebuilt
    /// and the generation worker configured.
    ///
    /// # Errors
    ///
    /// Invalid configuration, a failed migration, an unreadable world row
    /// or a dead worker. All of them are fatal.
    pub fn open(
        config: WorldConfig,
        mut store: Box<dyn WorldStore>,
        generation: Box<dyn GenerationChannel>,
    ) -> WorldResult<Self> {
        config.validate()?;
        let applied = store.migrate()?;
        tracing::info!(
            "schema version {}, {} migrations applied",
            store.schema_version()?,
            applied
        );

        let row = match store.get_world(&config.world_guid)? {
            Some(row) => row,
            None => {
                let seed = WorldSeed::from_phrase(&config.world_seed);
                let row = store.insert_world(NewWorld {
                    guid: config.world_guid.clone(),
                    title: config.world_title.clone(),
                    seed: config.world_seed.clone(),
                    generator: config.generator.to_value(),
                    pos_spawn: spawn_point(&config.generator, seed),
                })?;
                tracing::info!("created world {} ({})", row.guid, row.title);
                row
            }
        };
        let info = WorldInfo::from_row(row)?;
        let seed = WorldSeed::from_phrase(&info.seed);

        let tracker = ModificationTracker::restore(store.as_ref())?;
        let mut chunks = ChunkManager::new(generation, &config);
        chunks.init_worker(info.generator.clone(), &info.seed, &info.guid)?;
        let (inbound_tx, inbound_rx) = unbounded();

        tracing::info!("world {} opened", info.guid);
        Ok(Self {
            calendar: WorldCalendar::compute(unix_now(), info.dt, info.add_time),
            registry: BlockRegistry::standard(),
            chunks,
            tracker,
            players: Players::new(),
            mobs: MobManager::new(&config.mobs, seed.derive(1).value()),
            drop_items: DropItemManager::new(&config.drop_items, seed.derive(2).value()),
            packets: PacketQueue::new(),
            actions: ActionQueue::new(),
            rng: ChaCha8Rng::seed_from_u64(seed.derive(3).value()),
            seed,
            tick_loop: TickLoop::from_millis(config.tick_interval_ms),
            inbound_tx,
            inbound_rx,
            info,
            config,
            store,
        })
    }

    /// Opens the world stored in `config.world_dir` with a threaded
    /// generation worker.
    ///
    /// # Errors
    ///
    /// See [`World::open`]; also fails when the journal cannot be read.
    pub fn open_dir(config: WorldConfig) -> WorldResult<Self> {
        let store = JournalStore::open(&config.world_dir)?;
        let worker = GenerationWorker::spawn()?;
        Self::open(config, Box::new(store), Box::new(worker))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Sender for player intents, drained once per tick.
    #[must_use]
    pub fn sender(&self) -> Sender<Intent> {
        self.inbound_tx.clone()
    }

    /// World identity.
    #[must_use]
    pub const fn info(&self) -> &WorldInfo {
        &self.info
    }

    /// Calendar as of the last tick.
    #[must_use]
    pub const fn calendar(&self) -> WorldCalendar {
        self.calendar
    }

    /// Storage.
    #[must_use]
    pub fn store(&self) -> &dyn WorldStore {
        self.store.as_ref()
    }

    /// Materials.
    #[must_use]
    pub const fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// Loaded chunks.
    #[must_use]
    pub const fn chunks(&self) -> &ChunkManager {
        &self.chunks
    }

    /// Chunks with persisted overrides.
    #[must_use]
    pub const fn tracker(&self) -> &ModificationTracker {
        &self.tracker
    }

    /// Connected player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&ServerPlayer> {
        self.players.get(&id)
    }

    /// Connected player, mutable.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut ServerPlayer> {
        self.players.get_mut(&id)
    }

    /// Live mobs.
    #[must_use]
    pub const fn mobs(&self) -> &MobManager {
        &self.mobs
    }

    /// Live drops.
    #[must_use]
    pub const fn drop_items(&self) -> &DropItemManager {
        &self.drop_items
    }

    /// Deferred actions not yet due.
    #[must_use]
    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn tick_number(&self) -> u64 {
        self.tick_loop.tick_count()
    }

    /// Tick timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        self.tick_loop.stats()
    }

    // =========================================================================
    // Loop
    // =========================================================================

    /// Runs one tick without waiting.
    pub fn tick(&mut self) {
        let tick = self.tick_loop.begin_tick();
        for phase in TickPhase::ALL {
            let started = Instant::now();
            if let Err(e) = self.run_phase(phase, tick) {
                tracing::error!("tick {} phase {} failed: {}", tick, phase, e);
            }
            self.tick_loop.record_phase(phase, started.elapsed());
        }
        self.tick_loop.end_tick();
    }

    /// Ticks at the configured cadence until `running` is cleared, then
    /// shuts down.
    ///
    /// # Errors
    ///
    /// Only the final checkpoint can fail.
    pub fn run(&mut self, running: &AtomicBool) -> WorldResult<()> {
        tracing::info!(
            "world {} running at {}ms per tick",
            self.info.guid,
            self.config.tick_interval_ms
        );
        while running.load(Ordering::Relaxed) {
            self.tick();
            self.tick_loop.wait_for_next_tick();
        }
        self.shutdown()
    }

    /// Sleeps out the rest of the current tick.
    pub fn wait_for_next_tick(&self) {
        self.tick_loop.wait_for_next_tick();
    }

    /// Saves every live mob and writes a checkpoint.
    ///
    /// # Errors
    ///
    /// Checkpoint failure.
    pub fn shutdown(&mut self) -> WorldResult<()> {
        let failed = self.mobs.save_all(self.store.as_mut());
        if failed > 0 {
            tracing::warn!("{} mobs could not be saved at shutdown", failed);
        }
        self.store.checkpoint()?;
        tracing::info!("world {} stopped after {} ticks", self.info.guid, self.tick_number());
        Ok(())
    }

    fn run_phase(&mut self, phase: TickPhase, tick: u64) -> WorldResult<()> {
        match phase {
            TickPhase::Calendar => {
                self.calendar = WorldCalendar::compute(unix_now(), self.info.dt, self.info.add_time);
                Ok(())
            }
            TickPhase::Chunks => self.chunks_phase(tick),
            TickPhase::Mobs => self.mobs_phase(),
            TickPhase::Players => self.players_phase(),
            TickPhase::DropItems => self.drop_items_phase(),
            TickPhase::Inbound => {
                let intents: Vec<Intent> = self.inbound_rx.try_iter().collect();
                for intent in intents {
                    self.handle_intent(intent);
                }
                Ok(())
            }
            TickPhase::Outbound => {
                self.packets.flush(&mut self.players);
                Ok(())
            }
            TickPhase::ActionQueue => self.action_queue_phase(tick),
            TickPhase::Maintenance => self.maintenance_phase(tick),
        }
    }

    /// Moves the calendar. Persisted before it takes effect.
    ///
    /// # Errors
    ///
    /// Storage failure; the calendar is unchanged.
    pub fn set_add_time(&mut self, add_time: i64) -> WorldResult<()> {
        self.store.update_world_add_time(self.info.id, add_time)?;
        self.info.add_time = add_time;
        self.calendar = WorldCalendar::compute(unix_now(), self.info.dt, add_time);
        Ok(())
    }

    // =========================================================================
    // Chunks
    // =========================================================================

    fn chunks_phase(&mut self, tick: u64) -> WorldResult<()> {
        let report = self
            .chunks
            .tick(self.store.as_ref(), &self.tracker, &self.registry);

        for chunk in report.evicted {
            self.release_chunk(&chunk);
        }
        for addr in report.generated {
            if let Err(e) = self.finish_chunk(addr) {
                tracing::warn!("finishing chunk {} failed, retrying next tick: {}", addr, e);
            }
        }
        for addr in report.failed {
            if let Some(chunk) = self.chunks.get_mut(addr) {
                for player in chunk.take_load_requests() {
                    if let Some(p) = self.players.get_mut(&player) {
                        p.send_error("error_chunk_generation_failed");
                    }
                }
            }
        }

        for (pos, to) in report.block_updates {
            let Some(from) = self.chunks.get_block(pos) else {
                continue;
            };
            self.actions.push(tick, None, Deferred::Update { pos, from, to });
        }
        Ok(())
    }

    /// Mobs of an evicted chunk are saved and forgotten, its drops leave
    /// the live set.
    fn release_chunk(&mut self, chunk: &ServerChunk) {
        let mobs = self.mobs.unload_many(self.store.as_mut(), &chunk.mob_ids());
        let drops = self.drop_items.unload_many(&chunk.drop_item_ids());
        if !mobs.is_empty() || drops > 0 {
            tracing::debug!(
                "chunk {} released {} mobs and {} drops",
                chunk.addr(),
                mobs.len(),
                drops
            );
        }
    }

    /// `BlocksGenerated -> Ready`: adopts persisted mobs and drops, places
    /// the first animals of a never-populated chunk and answers pending
    /// load requests.
    fn finish_chunk(&mut self, addr: ChunkAddr) -> WorldResult<()> {
        let populated = self.store.chunk_mobs_generated(addr)?;
        let mut mob_ids = self.mobs.load_chunk(self.store.as_ref(), addr)?;
        let drop_ids = match self.drop_items.load_chunk(self.store.as_ref(), addr) {
            Ok(ids) => ids,
            Err(e) => {
                self.mobs.forget(&mob_ids);
                return Err(e);
            }
        };
        if !populated && self.config.mobs.natural_spawn {
            mob_ids.extend(self.populate_chunk(addr));
        }

        let Some(chunk) = self.chunks.get_mut(addr) else {
            return Ok(());
        };
        for id in &mob_ids {
            chunk.add_mob(*id);
        }
        for id in &drop_ids {
            chunk.add_drop_item(id.clone());
        }
        chunk.set_state(ChunkState::Ready);
        let requests = chunk.take_load_requests();
        let observers = chunk.observers();
        let loaded = chunk.loaded_packet();

        send_selected(&mut self.players, &[loaded], &requests, &[]);
        let mut packets = Vec::new();
        if !mob_ids.is_empty() {
            packets.push(self.mobs.add_packet(&mob_ids));
        }
        if !drop_ids.is_empty() {
            packets.push(self.drop_items.added_packet(&drop_ids));
        }
        send_selected(&mut self.players, &packets, &observers, &[]);
        Ok(())
    }

    /// Spawns the natural animals of a chunk in one transaction together
    /// with the populated flag. On failure nothing is kept.
    fn populate_chunk(&mut self, addr: ChunkAddr) -> Vec<u64> {
        let spawns = self.natural_spawns(addr);
        let mut spawned = Vec::new();
        match self.spawn_with_flag(addr, &spawns, &mut spawned) {
            Ok(()) => spawned,
            Err(e) => {
                // Fails harmlessly when the commit itself already reverted.
                self.store.rollback().ok();
                self.mobs.forget(&spawned);
                tracing::warn!("populating chunk {} rolled back: {}", addr, e);
                Vec::new()
            }
        }
    }

    fn spawn_with_flag(
        &mut self,
        addr: ChunkAddr,
        spawns: &[MobSpawn],
        spawned: &mut Vec<u64>,
    ) -> WorldResult<()> {
        self.store.begin()?;
        for spawn in spawns {
            spawned.push(self.mobs.spawn(self.store.as_mut(), spawn)?);
        }
        self.store.set_chunk_mobs_generated(addr)?;
        self.store.commit()?;
        Ok(())
    }

    /// Deterministic per address: animals stand on grass open to the sky.
    #[allow(clippy::cast_sign_loss)]
    fn natural_spawns(&self, addr: ChunkAddr) -> Vec<MobSpawn> {
        let Some(chunk) = self.chunks.get(addr) else {
            return Vec::new();
        };
        let purpose = u64::from(addr.x as u32)
            ^ (u64::from(addr.z as u32) << 32)
            ^ (u64::from(addr.y as u32) << 16);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.derive(4).derive(purpose).value());
        if !rng.gen_bool(NATURAL_SPAWN_CHANCE) {
            return Vec::new();
        }
        let kinds = self.mobs.registry().kinds();
        if kinds.is_empty() {
            return Vec::new();
        }

        let origin = addr.origin();
        let mut spawns = Vec::new();
        for _ in 0..rng.gen_range(1..=NATURAL_SPAWN_MAX) {
            let column = origin.offset(rng.gen_range(0..CHUNK_SIZE_X), 0, rng.gen_range(0..CHUNK_SIZE_Z));
            let kind = kinds[rng.gen_range(0..kinds.len())];
            let skins = self.mobs.registry().skins(kind);
            if skins.is_empty() {
                continue;
            }
            let skin = skins[rng.gen_range(0..skins.len())];
            let ground = (0..CHUNK_SIZE_Y - 1).rev().map(|y| column.up(y)).find(|pos| {
                chunk.block(*pos).is_some_and(|b| b.id == block_id::GRASS_BLOCK)
                    && chunk.block(pos.up(1)).is_some_and(|b| b.is_air())
            });
            if let Some(ground) = ground {
                spawns.push(MobSpawn {
                    kind: kind.to_string(),
                    skin: skin.to_string(),
                    pos: ground.up(1).bottom_center(),
                    rotate: Vec3::new(0.0, 0.0, rng.gen_range(0.0..std::f64::consts::TAU)),
                });
            }
        }
        spawns
    }

    // =========================================================================
    // Mobs
    // =========================================================================

    fn mobs_phase(&mut self) -> WorldResult<()> {
        for (mob_id, _, effects) in self.mobs.tick(self.store.as_mut()) {
            if let Err(e) = self.apply_brain_effects(None, mob_id, effects) {
                tracing::warn!("effects of mob {} failed: {}", mob_id, e);
            }
        }
        Ok(())
    }

    fn punch_mob(&mut self, player_id: PlayerId, mob_id: u64, button: u8) -> WorldResult<()> {
        let player = self
            .players
            .get(&player_id)
            .ok_or(WorldError::PlayerNotFound(player_id))?;
        if player.game_mode == GameMode::Spectator {
            return Ok(());
        }
        let mob = self.mobs.get(mob_id).ok_or(WorldError::MobNotFound(mob_id))?;
        if player.pos.distance(mob.row.pos) > MAX_REACH {
            return Err(ValidationError::TooFar.into());
        }
        let held = player.inventory.current().cloned();
        let addr = mob.chunk_addr();

        let effects = self
            .mobs
            .punch(self.store.as_mut(), mob_id, button, held.as_ref())?;
        self.apply_brain_effects(Some(player_id), mob_id, effects)?;

        let observers = self
            .chunks
            .get(addr)
            .map(ServerChunk::observers)
            .unwrap_or_default();
        if self.mobs.get(mob_id).is_some_and(|m| !m.is_alive()) {
            // killed -> unloaded
            self.mobs.unload(self.store.as_mut(), mob_id);
            if let Some(chunk) = self.chunks.get_mut(addr) {
                chunk.remove_mob(mob_id);
            }
            self.packets
                .push(Targets::Selected(observers), vec![delete_packet(&[mob_id])], Vec::new());
        } else if let Some(update) = self.mobs.update_packet(mob_id) {
            self.packets
                .push(Targets::Selected(observers), vec![update], Vec::new());
        }
        Ok(())
    }

    /// Position reported by the movement integrator for a mob.
    ///
    /// A mob crossing into another loaded chunk is re-anchored there; one
    /// walking into an unloaded chunk is saved and unloaded.
    ///
    /// # Errors
    ///
    /// [`WorldError::MobNotFound`].
    pub fn move_mob(&mut self, mob_id: u64, pos: Vec3, rotate: Vec3) -> WorldResult<()> {
        let (from, to) = self.mobs.move_to(mob_id, pos, rotate)?;
        let mut observers = self
            .chunks
            .get(from)
            .map(ServerChunk::observers)
            .unwrap_or_default();
        if from != to {
            if let Some(chunk) = self.chunks.get_mut(from) {
                chunk.remove_mob(mob_id);
            }
            match self.chunks.get_mut(to) {
                Some(chunk) => {
                    chunk.add_mob(mob_id);
                    for id in chunk.observers() {
                        if !observers.contains(&id) {
                            observers.push(id);
                        }
                    }
                }
                None => {
                    self.mobs.unload(self.store.as_mut(), mob_id);
                    self.packets
                        .push(Targets::Selected(observers), vec![delete_packet(&[mob_id])], Vec::new());
                    return Ok(());
                }
            }
        }
        if let Some(update) = self.mobs.update_packet(mob_id) {
            self.packets
                .push(Targets::Selected(observers), vec![update], Vec::new());
        }
        Ok(())
    }

    /// Turns brain effects into a world action at the mob.
    fn apply_brain_effects(
        &mut self,
        player: Option<PlayerId>,
        mob_id: u64,
        effects: Vec<BrainEffect>,
    ) -> WorldResult<()> {
        let Some(mob) = self.mobs.get(mob_id) else {
            return Ok(());
        };
        let pos = mob.row.pos;
        let kind = mob.row.kind.clone();
        let mut action = WorldAction::new(None);
        for effect in effects {
            match effect {
                BrainEffect::Drop(items) => action.add_drop(pos, items, true),
                BrainEffect::Sound(tag) => action.add_sound(&kind, tag, pos, false),
                BrainEffect::ReplaceHeld(item) => {
                    if let Some(p) = player.and_then(|id| self.players.get_mut(&id)) {
                        p.inventory.set_current(Some(item));
                        let packet = p.inventory.packet();
                        p.send(&[packet]);
                    }
                }
            }
        }
        if action.is_empty() {
            return Ok(());
        }
        self.apply_actions(player, action)
    }

    // =========================================================================
    // Players
    // =========================================================================

    fn players_phase(&mut self) -> WorldResult<()> {
        let ids: Vec<PlayerId> = self.players.keys().copied().collect();
        for id in ids {
            self.update_visibility(id, false);
            if let Err(e) = self.pickup_drops(id) {
                tracing::warn!("drop pickup of player {} failed: {}", id, e);
            }
        }
        Ok(())
    }

    /// Recomputes the chunks a player observes once it moved, and tells
    /// it about mobs and drops entering or leaving its view.
    fn update_visibility(&mut self, id: PlayerId, force: bool) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        if !player.take_moved() && !force {
            return;
        }
        let Some(change) = self
            .chunks
            .check_player_visible_chunks(player, force, &self.tracker)
        else {
            return;
        };
        if change.is_empty() {
            return;
        }

        let mut packets = vec![change.packet(player.render_dist())];
        let (mut added_mobs, mut added_drops) = (Vec::new(), Vec::new());
        for (addr, _) in &change.added {
            if let Some(chunk) = self.chunks.get(*addr).filter(|c| c.is_ready()) {
                added_mobs.extend(chunk.mob_ids());
                added_drops.extend(chunk.drop_item_ids());
            }
        }
        let (mut gone_mobs, mut gone_drops) = (Vec::new(), Vec::new());
        for addr in &change.deleted {
            if let Some(chunk) = self.chunks.get(*addr) {
                gone_mobs.extend(chunk.mob_ids());
                gone_drops.extend(chunk.drop_item_ids());
            }
        }
        if !added_mobs.is_empty() {
            packets.push(self.mobs.add_packet(&added_mobs));
        }
        if !added_drops.is_empty() {
            packets.push(self.drop_items.added_packet(&added_drops));
        }
        if !gone_mobs.is_empty() {
            packets.push(delete_packet(&gone_mobs));
        }
        if !gone_drops.is_empty() {
            packets.push(deleted_packet(&gone_drops));
        }
        player.send(&packets);
    }

    /// Collects drops within reach. Stacks that do not fit entirely stay
    /// on the ground.
    fn pickup_drops(&mut self, id: PlayerId) -> WorldResult<()> {
        let Some(player) = self.players.get(&id) else {
            return Ok(());
        };
        if player.game_mode == GameMode::Spectator {
            return Ok(());
        }
        let near = self
            .drop_items
            .near(player.pos, self.drop_items.pickup_radius(), &self.chunks);
        let mut collected = false;

        for entity_id in near {
            let fits = match (self.players.get(&id), self.drop_items.get(&entity_id)) {
                (Some(player), Some(drop)) => {
                    let mut probe = player.inventory.clone();
                    drop.row.items.iter().all(|stack| probe.add(stack) == 0)
                }
                _ => false,
            };
            if !fits {
                continue;
            }
            let Some(drop) = self.drop_items.pickup(self.store.as_mut(), &entity_id)? else {
                continue;
            };
            let addr = drop.chunk_addr();
            let observers = match self.chunks.get_mut(addr) {
                Some(chunk) => {
                    chunk.remove_drop_item(&entity_id);
                    chunk.observers()
                }
                None => Vec::new(),
            };
            if let Some(player) = self.players.get_mut(&id) {
                for stack in &drop.row.items {
                    player.inventory.add(stack);
                }
            }
            self.packets.push(
                Targets::Selected(observers),
                vec![deleted_packet(&[entity_id])],
                Vec::new(),
            );
            collected = true;
        }

        if collected {
            if let Some(player) = self.players.get(&id) {
                self.packets.push(
                    Targets::Selected(vec![id]),
                    vec![player.inventory.packet()],
                    Vec::new(),
                );
            }
        }
        Ok(())
    }

    // =========================================================================
    // Drop items
    // =========================================================================

    fn drop_items_phase(&mut self) -> WorldResult<()> {
        self.drop_items.unsettle(&self.chunks, &self.registry);
        for crossing in self.drop_items.tick(&self.chunks, &self.registry) {
            if let Some(chunk) = self.chunks.get_mut(crossing.from) {
                chunk.remove_drop_item(&crossing.entity_id);
            }
            if let Some(chunk) = self.chunks.get_mut(crossing.to) {
                chunk.add_drop_item(crossing.entity_id);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Intents
    // =========================================================================

    fn handle_intent(&mut self, intent: Intent) {
        let player_id = intent.player_id();
        let result = match intent {
            Intent::Join {
                player_id,
                username,
                connection,
                game_mode,
            } => {
                self.join(player_id, username, connection, game_mode);
                Ok(())
            }
            Intent::Leave { player_id } => {
                self.leave(player_id);
                Ok(())
            }
            Intent::Move {
                player_id,
                pos,
                rotate,
            } => self.move_player(player_id, pos, rotate),
            Intent::RenderDist { player_id, dist } => self
                .players
                .get_mut(&player_id)
                .map(|p| p.set_render_dist(dist))
                .ok_or(WorldError::PlayerNotFound(player_id)),
            Intent::ChunkLoad { player_id, addr } => self.chunk_load(player_id, addr),
            Intent::Pickat { player_id, event } => self.pickat(player_id, &event),
            Intent::PunchMob {
                player_id,
                mob_id,
                button,
            } => self.punch_mob(player_id, mob_id, button),
            Intent::SelectSlot { player_id, index } => match self.players.get_mut(&player_id) {
                Some(player) => {
                    player.inventory.select(index);
                    let packet = player.inventory.packet();
                    player.send(&[packet]);
                    Ok(())
                }
                None => Err(WorldError::PlayerNotFound(player_id)),
            },
            Intent::Chat { player_id, text } => {
                let mut action = WorldAction::new(None);
                action.chat_message = Some(text);
                self.apply_actions(Some(player_id), action)
            }
        };
        if let Err(e) = result {
            self.report_error(player_id, &e);
        }
    }

    /// Validation errors go back to the player as their code; anything
    /// else is logged as well.
    fn report_error(&mut self, player_id: PlayerId, error: &WorldError) {
        let message = match error {
            WorldError::Validation(v) => {
                tracing::debug!("player {} rejected: {}", player_id, v);
                v.code()
            }
            other => {
                tracing::warn!("intent of player {} failed: {}", player_id, other);
                other.to_string()
            }
        };
        if let Some(player) = self.players.get_mut(&player_id) {
            player.send_error(&message);
        }
    }

    fn join(
        &mut self,
        id: PlayerId,
        username: String,
        connection: Box<dyn PlayerConnection>,
        game_mode: GameMode,
    ) {
        if self.players.contains_key(&id) {
            self.leave(id);
        }
        let mut player = ServerPlayer::new(id, username, self.info.pos_spawn, connection);
        player.game_mode = game_mode;
        player.set_render_dist(self.config.default_render_dist);
        player.send(&[player.state_packet(), player.inventory.packet()]);
        send_all(&mut self.players, &[player.state_packet()], &[]);
        tracing::info!("player {} ({}) joined", id, player.username);
        self.players.insert(id, player);
        self.update_visibility(id, true);
    }

    fn leave(&mut self, id: PlayerId) {
        if let Some(mut player) = self.players.remove(&id) {
            self.chunks.detach_player(&mut player);
            tracing::info!("player {} ({}) left", id, player.username);
        }
    }

    fn move_player(&mut self, id: PlayerId, pos: Vec3, rotate: Vec3) -> WorldResult<()> {
        let allow_negative_y = self.config.allow_negative_y;
        let spawn = self.info.pos_spawn;
        let player = self
            .players
            .get_mut(&id)
            .ok_or(WorldError::PlayerNotFound(id))?;
        if pos.y < 0.0 && !allow_negative_y {
            player.move_to(spawn, rotate);
            player.send(&[Packet::new(PacketName::Teleport, json!({ "pos": spawn }))]);
        } else {
            player.move_to(pos, rotate);
        }
        let state = player.state_packet();
        self.packets.push(Targets::All, vec![state], vec![id]);
        Ok(())
    }

    fn chunk_load(&mut self, id: PlayerId, addr: ChunkAddr) -> WorldResult<()> {
        let observing = self
            .players
            .get(&id)
            .ok_or(WorldError::PlayerNotFound(id))?
            .nearby()
            .contains(&addr);
        let chunk = self
            .chunks
            .get_mut(addr)
            .filter(|_| observing)
            .ok_or(WorldError::ChunkNotFound(addr))?;
        if chunk.is_ready() {
            let packet = chunk.loaded_packet();
            if let Some(player) = self.players.get_mut(&id) {
                player.send(&[packet]);
            }
        } else {
            chunk.request_load(id);
        }
        Ok(())
    }

    /// Resolves a click and applies the resulting action.
    ///
    /// # Errors
    ///
    /// Validation or storage failure; nothing was applied.
    pub fn pickat(&mut self, player_id: PlayerId, event: &PickatEvent) -> WorldResult<()> {
        let view = self
            .players
            .get(&player_id)
            .ok_or(WorldError::PlayerNotFound(player_id))?
            .view();
        let input = PickatInput {
            world: &self.chunks,
            registry: &self.registry,
            player: &view,
            is_night: self.calendar.is_night(),
            seed: self.rng.gen(),
        };
        let action = pickat_action(&input, event)?;
        if action.is_empty() {
            return Ok(());
        }
        self.apply_actions(Some(player_id), action)
    }

    // =========================================================================
    // Deferred actions and maintenance
    // =========================================================================

    fn action_queue_phase(&mut self, tick: u64) -> WorldResult<()> {
        for (player, work) in self.actions.take_due(tick) {
            let result = match work {
                Deferred::Update { pos, from, to } => self.apply_block_update(pos, &from, to),
                Deferred::Explode(explosion) => self.explode(player, &explosion),
            };
            if let Err(e) = result {
                tracing::warn!("deferred action failed: {}", e);
            }
        }
        Ok(())
    }

    /// Applies a scheduled voxel change. A voxel that changed since the
    /// change was computed keeps its newer state.
    fn apply_block_update(
        &mut self,
        pos: BlockPos,
        from: &BlockItem,
        to: BlockItem,
    ) -> WorldResult<()> {
        if self.chunks.get_block(pos).as_ref() != Some(from) {
            tracing::debug!("stale block update at {} dropped", pos);
            return Ok(());
        }
        let kind = if from.id == to.id {
            BlockAction::Modify
        } else {
            BlockAction::Replace
        };
        let mut action = WorldAction::new(None);
        action.add_block(pos, to, kind);
        self.apply_actions(None, action)
    }

    /// Detonates against the current voxels.
    ///
    /// # Errors
    ///
    /// Storage failure; nothing was destroyed.
    pub fn explode(&mut self, player: Option<PlayerId>, explosion: &Explosion) -> WorldResult<()> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.rng.gen());
        let mut action = WorldAction::new(None);
        make_explosion(&mut action, &self.chunks, &self.registry, explosion, &mut rng);
        self.apply_actions(player, action)
    }

    fn maintenance_phase(&mut self, tick: u64) -> WorldResult<()> {
        if tick % self.config.gc_interval_ticks == 0 {
            let dropped = self.chunks.gc();
            if dropped > 0 {
                tracing::debug!("gc dropped {} cache entries", dropped);
            }
        }
        if tick % self.config.checkpoint_interval_ticks == 0 {
            self.store.checkpoint()?;
            tracing::info!("checkpoint at tick {}", tick);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::RecordingConnection;
    use strata_procedural::InlineGeneration;

    fn flat_world() -> (World, std::path::PathBuf) {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("test_world_{id}"));
        let config = WorldConfig {
            world_dir: dir.clone(),
            generator: GeneratorConfig::Flat { ground_level: 4 },
            default_render_dist: 2,
            max_y_margin: 1,
            allow_negative_y: false,
            ..WorldConfig::default()
        };
        let store = JournalStore::open(&dir).unwrap();
        let world =
            World::open(config, Box::new(store), Box::new(InlineGeneration::new())).unwrap();
        (world, dir)
    }

    #[test]
    fn test_open_creates_world_once() {
        let (world, dir) = flat_world();
        assert_eq!(world.info().generator, GeneratorConfig::Flat { ground_level: 4 });
        assert_eq!(world.info().pos_spawn, Vec3::new(0.5, 5.0, 0.5));
        let id = world.info().id;
        drop(world);

        let config = WorldConfig {
            world_dir: dir.clone(),
            ..WorldConfig::default()
        };
        let store = JournalStore::open(&dir).unwrap();
        let reopened =
            World::open(config, Box::new(store), Box::new(InlineGeneration::new())).unwrap();
        assert_eq!(reopened.info().id, id);
        assert_eq!(reopened.info().generator, GeneratorConfig::Flat { ground_level: 4 });
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_join_loads_chunks_around_spawn() {
        let (mut world, dir) = flat_world();
        let (conn, log) = RecordingConnection::new(1);
        world
            .sender()
            .send(Intent::Join {
                player_id: 1,
                username: "ada".into(),
                connection: Box::new(conn),
                game_mode: GameMode::Survival,
            })
            .unwrap();
        for _ in 0..4 {
            world.tick();
        }

        assert!(world.player(1).is_some());
        assert_eq!(log.named(PacketName::NearbyChunks).len(), 1);
        let spawn_chunk = world.chunks().get(ChunkAddr::new(0, 0, 0)).unwrap();
        assert!(spawn_chunk.is_ready());
        assert!(world.chunks().get(ChunkAddr::new(0, -1, 0)).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_fall_below_zero_teleports_to_spawn() {
        let (mut world, dir) = flat_world();
        let (conn, log) = RecordingConnection::new(1);
        let tx = world.sender();
        tx.send(Intent::Join {
            player_id: 1,
            username: "ada".into(),
            connection: Box::new(conn),
            game_mode: GameMode::Survival,
        })
        .unwrap();
        tx.send(Intent::Move {
            player_id: 1,
            pos: Vec3::new(3.0, -2.0, 3.0),
            rotate: Vec3::ZERO,
        })
        .unwrap();
        world.tick();

        assert_eq!(world.player(1).unwrap().pos, world.info().pos_spawn);
        assert_eq!(log.named(PacketName::Teleport).len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_player_gets_no_reply() {
        let (mut world, dir) = flat_world();
        world
            .sender()
            .send(Intent::RenderDist {
                player_id: 9,
                dist: 3,
            })
            .unwrap();
        world.tick();
        assert!(world.player(9).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
