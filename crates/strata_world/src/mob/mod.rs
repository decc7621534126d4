//! # Mob Manager
//!
//! Live mobs keyed by row id, each driven by a [`Brain`] chosen from its
//! type. Mobs are anchored to the chunk containing their position; a mob
//! is only simulated while that chunk is loaded.
//!
//! ## Saves
//!
//! Ticking mobs are saved at most once every `save_interval_ticks`. Each
//! mob starts at a random offset in that window so saves spread evenly
//! over ticks instead of landing on the same one. Unloading and killing
//! save synchronously.

pub mod brain;

use std::collections::{BTreeMap, HashMap};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use strata_persistence::{EntityRow, Indicators, NewEntity, WorldStore};
use strata_shared::{ChunkAddr, ItemStack, Packet, PacketName, Vec3};

pub use brain::{BeeBrain, Brain, BrainEffect, ChickenBrain, CowBrain, SheepBrain};

use crate::actions::MobSpawn;
use crate::config::MobConfig;
use crate::error::{WorldError, WorldResult};

/// Damage of one punch.
pub const PUNCH_DAMAGE: f64 = 5.0;

/// Mouse button that attacks.
pub const BUTTON_ATTACK: u8 = 1;

/// Mouse button that uses the held item.
pub const BUTTON_USE: u8 = 3;

/// Registration of one mob type.
pub struct MobType {
    /// Valid skins
    pub skins: &'static [&'static str],
    /// Brain factory
    pub brain: fn() -> Box<dyn Brain>,
    /// Initial state merged into `extra_data`
    pub extra: fn() -> Value,
}

/// Known mob types.
pub struct MobRegistry {
    types: HashMap<&'static str, MobType>,
}

impl Default for MobRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl MobRegistry {
    /// Registry without types.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Adds or replaces a type.
    pub fn register(&mut self, kind: &'static str, mob_type: MobType) {
        self.types.insert(kind, mob_type);
    }

    /// Built-in animals.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "chicken",
            MobType {
                skins: &["base"],
                brain: || Box::new(ChickenBrain),
                extra: || json!({}),
            },
        );
        registry.register(
            "cow",
            MobType {
                skins: &["base", "brown"],
                brain: || Box::new(CowBrain),
                extra: || json!({}),
            },
        );
        registry.register(
            "sheep",
            MobType {
                skins: &["base", "black"],
                brain: || Box::new(SheepBrain),
                extra: || json!({ "sheared": false }),
            },
        );
        registry.register(
            "bee",
            MobType {
                skins: &["base"],
                brain: || Box::new(BeeBrain),
                extra: || json!({ "pollen": 0 }),
            },
        );
        registry
    }

    /// Sorted type tags.
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.types.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Skins of a type; empty for unknown types.
    #[must_use]
    pub fn skins(&self, kind: &str) -> &'static [&'static str] {
        match self.types.get(kind) {
            Some(mob_type) => mob_type.skins,
            None => &[],
        }
    }

    /// Checks a type/skin pair.
    ///
    /// # Errors
    ///
    /// [`WorldError::UnknownMobType`] or [`WorldError::UnknownSkin`].
    pub fn get(&self, kind: &str, skin: &str) -> WorldResult<&MobType> {
        let mob_type = self
            .types
            .get(kind)
            .ok_or_else(|| WorldError::UnknownMobType(kind.to_string()))?;
        if !mob_type.skins.contains(&skin) {
            return Err(WorldError::UnknownSkin {
                kind: kind.to_string(),
                skin: skin.to_string(),
            });
        }
        Ok(mob_type)
    }
}

/// A live mob.
pub struct Mob {
    /// Persisted state
    pub row: EntityRow,
    brain: Box<dyn Brain>,
    save_offset: u32,
}

impl Mob {
    /// Row id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.row.id
    }

    /// Anchor chunk.
    #[must_use]
    pub fn chunk_addr(&self) -> ChunkAddr {
        ChunkAddr::from_world(self.row.pos)
    }

    /// Returns false once killed.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.row.extra_data.get("is_alive").and_then(Value::as_bool) != Some(false)
    }

    /// Client view of the mob.
    #[must_use]
    pub fn state(&self) -> Value {
        json!({
            "id": self.row.id,
            "entity_id": self.row.entity_id,
            "type": self.row.kind,
            "skin": self.row.skin,
            "pos": self.row.pos,
            "rotate": self.row.rotate,
            "indicators": self.row.indicators,
            "extra_data": self.row.extra_data,
        })
    }
}

/// Effects of one mob, with where they happen.
pub type MobEffects = (u64, Vec3, Vec<BrainEffect>);

/// Live mobs of one world.
pub struct MobManager {
    mobs: BTreeMap<u64, Mob>,
    registry: MobRegistry,
    save_interval: u32,
    rng: ChaCha8Rng,
}

impl MobManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(config: &MobConfig, seed: u64) -> Self {
        Self {
            mobs: BTreeMap::new(),
            registry: MobRegistry::standard(),
            save_interval: config.save_interval_ticks.max(1),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Mob types.
    #[must_use]
    pub const fn registry(&self) -> &MobRegistry {
        &self.registry
    }

    /// Live mob.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&Mob> {
        self.mobs.get(&id)
    }

    /// Number of live mobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mobs.len()
    }

    /// Returns true if no mob is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mobs.is_empty()
    }

    /// Live ids, ascending.
    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        self.mobs.keys().copied().collect()
    }

    fn adopt(&mut self, row: EntityRow, brain: Box<dyn Brain>) -> u64 {
        let id = row.id;
        let save_offset = self.rng.gen_range(0..self.save_interval);
        self.mobs.insert(id, Mob { row, brain, save_offset });
        id
    }

    /// Creates, persists and adopts a new mob.
    ///
    /// # Errors
    ///
    /// Unknown type or skin, or a storage failure; nothing is adopted.
    pub fn spawn(&mut self, store: &mut dyn WorldStore, spawn: &MobSpawn) -> WorldResult<u64> {
        let mob_type = self.registry.get(&spawn.kind, &spawn.skin)?;
        let brain = (mob_type.brain)();
        let mut extra = (mob_type.extra)();
        if let Some(map) = extra.as_object_mut() {
            map.insert("is_alive".into(), json!(true));
        }
        let row = store.create_entity(NewEntity {
            kind: spawn.kind.clone(),
            skin: spawn.skin.clone(),
            pos: spawn.pos,
            rotate: spawn.rotate,
            indicators: Indicators::default(),
            extra_data: extra,
        })?;
        tracing::debug!("mob {} ({}) spawned at {:?}", row.id, row.kind, row.pos);
        Ok(self.adopt(row, brain))
    }

    /// Adopts every active mob persisted in a chunk.
    ///
    /// Rows of unknown types are skipped with a warning. Returns the ids
    /// newly adopted.
    ///
    /// # Errors
    ///
    /// Storage failure; nothing is adopted.
    pub fn load_chunk(&mut self, store: &dyn WorldStore, addr: ChunkAddr) -> WorldResult<Vec<u64>> {
        let rows = store.load_entities(addr)?;
        let mut adopted = Vec::new();
        for row in rows {
            if self.mobs.contains_key(&row.id) {
                continue;
            }
            let brain = match self.registry.get(&row.kind, &row.skin) {
                Ok(mob_type) => (mob_type.brain)(),
                Err(e) => {
                    tracing::warn!("mob {} not loaded: {}", row.id, e);
                    continue;
                }
            };
            adopted.push(self.adopt(row, brain));
        }
        Ok(adopted)
    }

    /// Ticks every live mob; throttled saves failing are logged.
    pub fn tick(&mut self, store: &mut dyn WorldStore) -> Vec<MobEffects> {
        let interval = self.save_interval;
        let mut all = Vec::new();
        for mob in self.mobs.values_mut() {
            if !mob.is_alive() {
                continue;
            }
            let effects = mob.brain.tick(&mut mob.row, &mut self.rng);
            if mob.save_offset % interval == 0 {
                if let Err(e) = store.save_entity(&mob.row) {
                    tracing::warn!("saving mob {} failed: {}", mob.row.id, e);
                }
            }
            mob.save_offset = mob.save_offset.wrapping_add(1);
            if !effects.is_empty() {
                all.push((mob.row.id, mob.row.pos, effects));
            }
        }
        all
    }

    /// Saves one mob now.
    ///
    /// # Errors
    ///
    /// Unknown mob or storage failure.
    pub fn save(&self, store: &mut dyn WorldStore, id: u64) -> WorldResult<()> {
        let mob = self.mobs.get(&id).ok_or(WorldError::MobNotFound(id))?;
        store.save_entity(&mob.row)?;
        Ok(())
    }

    /// Saves every live mob, continuing past failures.
    ///
    /// Returns how many saves failed.
    pub fn save_all(&self, store: &mut dyn WorldStore) -> usize {
        let mut failed = 0;
        for mob in self.mobs.values() {
            if let Err(e) = store.save_entity(&mob.row) {
                tracing::warn!("saving mob {} failed: {}", mob.row.id, e);
                failed += 1;
            }
        }
        failed
    }

    /// A player clicked a mob: button 3 uses the held item on it, button 1
    /// attacks it.
    ///
    /// # Errors
    ///
    /// Unknown mob or storage failure.
    pub fn punch(
        &mut self,
        store: &mut dyn WorldStore,
        id: u64,
        button: u8,
        held: Option<&ItemStack>,
    ) -> WorldResult<Vec<BrainEffect>> {
        let mob = self.mobs.get_mut(&id).ok_or(WorldError::MobNotFound(id))?;
        if !mob.is_alive() {
            return Ok(Vec::new());
        }
        match button {
            BUTTON_USE => {
                let effects = mob.brain.on_use(&mut mob.row, held);
                if !effects.is_empty() {
                    store.save_entity(&mob.row)?;
                }
                Ok(effects)
            }
            BUTTON_ATTACK => {
                let mut effects = mob.brain.on_damage(&mut mob.row);
                effects.extend(self.change_live(store, id, -PUNCH_DAMAGE)?);
                Ok(effects)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Changes health; reaching zero kills the mob.
    ///
    /// # Errors
    ///
    /// Unknown mob or storage failure.
    pub fn change_live(
        &mut self,
        store: &mut dyn WorldStore,
        id: u64,
        delta: f64,
    ) -> WorldResult<Vec<BrainEffect>> {
        let mob = self.mobs.get_mut(&id).ok_or(WorldError::MobNotFound(id))?;
        mob.row.indicators.live = (mob.row.indicators.live + delta).max(0.0);
        if mob.row.indicators.live <= 0.0 {
            return self.kill(store, id);
        }
        store.save_entity(&mob.row)?;
        Ok(Vec::new())
    }

    /// Kills a mob: it stops ticking, is flagged inactive and saved. The
    /// caller unloads it afterwards.
    ///
    /// # Errors
    ///
    /// Unknown mob or storage failure.
    pub fn kill(&mut self, store: &mut dyn WorldStore, id: u64) -> WorldResult<Vec<BrainEffect>> {
        let mob = self.mobs.get_mut(&id).ok_or(WorldError::MobNotFound(id))?;
        if !mob.is_alive() {
            return Ok(Vec::new());
        }
        mob.row.indicators.live = 0.0;
        brain::set_extra(&mut mob.row, "is_alive", json!(false));
        mob.row.is_active = false;
        store.save_entity(&mob.row)?;
        tracing::info!("mob {} ({}) killed", id, mob.row.kind);
        Ok(mob.brain.on_kill(&mut mob.row))
    }

    /// Saves and forgets a mob. A failed save is logged; the mob is
    /// forgotten anyway.
    pub fn unload(&mut self, store: &mut dyn WorldStore, id: u64) -> Option<Mob> {
        let mob = self.mobs.remove(&id)?;
        if let Err(e) = store.save_entity(&mob.row) {
            tracing::error!("saving unloaded mob {} failed: {}", id, e);
        }
        Some(mob)
    }

    /// Drops mobs from memory without saving, for spawns whose
    /// transaction was rolled back.
    pub fn forget(&mut self, ids: &[u64]) {
        for id in ids {
            self.mobs.remove(id);
        }
    }

    /// Unloads the listed mobs. Returns the ids actually unloaded.
    pub fn unload_many(&mut self, store: &mut dyn WorldStore, ids: &[u64]) -> Vec<u64> {
        ids.iter()
            .copied()
            .filter(|id| self.unload(store, *id).is_some())
            .collect()
    }

    /// Moves a mob. Returns the previous and the new anchor chunk.
    ///
    /// # Errors
    ///
    /// [`WorldError::MobNotFound`].
    pub fn move_to(&mut self, id: u64, pos: Vec3, rotate: Vec3) -> WorldResult<(ChunkAddr, ChunkAddr)> {
        let mob = self.mobs.get_mut(&id).ok_or(WorldError::MobNotFound(id))?;
        let from = mob.chunk_addr();
        mob.row.pos = pos;
        mob.row.rotate = rotate;
        Ok((from, mob.chunk_addr()))
    }

    /// `MOB_ADD` for the listed mobs.
    #[must_use]
    pub fn add_packet(&self, ids: &[u64]) -> Packet {
        let mobs: Vec<Value> = ids.iter().filter_map(|id| self.mobs.get(id)).map(Mob::state).collect();
        Packet::new(PacketName::MobAdd, json!({ "mobs": mobs }))
    }

    /// `MOB_UPDATE` for one mob.
    #[must_use]
    pub fn update_packet(&self, id: u64) -> Option<Packet> {
        self.mobs
            .get(&id)
            .map(|mob| Packet::new(PacketName::MobUpdate, mob.state()))
    }
}

/// `MOB_DELETE` for the listed ids.
#[must_use]
pub fn delete_packet(ids: &[u64]) -> Packet {
    Packet::new(PacketName::MobDelete, json!({ "ids": ids }))
}
