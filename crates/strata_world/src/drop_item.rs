//! # Drop Items
//!
//! Item stacks lying in the world. A drop is created with a small random
//! throw, falls until it rests on a solid voxel and is collected by the
//! first player that comes close enough.
//!
//! Like mobs, drops are anchored to the chunk containing them and are
//! only live while that chunk is loaded. Collection deletes the row first;
//! the in-memory drop disappears only after the store accepted it.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use strata_persistence::{DropItemRow, WorldStore};
use strata_shared::{Aabb, ChunkAddr, ItemStack, Packet, PacketName, Vec3};

use crate::blocks::BlockRegistry;
use crate::chunk_manager::{BlockAccess, ChunkManager};
use crate::config::DropItemConfig;
use crate::error::WorldResult;

/// Downward acceleration per tick.
pub const GRAVITY: f64 = 0.04;

/// Horizontal speed kept per tick.
const DRAG: f64 = 0.98;

/// Speed of a fresh throw.
const THROW_SPEED: f64 = 0.375;

/// A drop being simulated.
#[derive(Clone, Debug, PartialEq)]
pub struct DropItem {
    /// Persisted state
    pub row: DropItemRow,
    /// Velocity in blocks per tick
    pub velocity: Vec3,
    /// Resting on a solid voxel
    pub on_ground: bool,
}

impl DropItem {
    /// Anchor chunk.
    #[must_use]
    pub fn chunk_addr(&self) -> ChunkAddr {
        ChunkAddr::from_world(self.row.pos)
    }
}

/// A drop that crossed into another chunk this tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Crossing {
    /// Drop entity id
    pub entity_id: String,
    /// Previous anchor
    pub from: ChunkAddr,
    /// New anchor
    pub to: ChunkAddr,
}

/// Live drops of one world.
pub struct DropItemManager {
    items: BTreeMap<String, DropItem>,
    pickup_radius: f64,
    rng: ChaCha8Rng,
}

impl DropItemManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(config: &DropItemConfig, seed: u64) -> Self {
        Self {
            items: BTreeMap::new(),
            pickup_radius: config.pickup_radius,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Collection distance.
    #[must_use]
    pub const fn pickup_radius(&self) -> f64 {
        self.pickup_radius
    }

    /// Live drop.
    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<&DropItem> {
        self.items.get(entity_id)
    }

    /// Number of live drops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Random throw: mostly upwards, a little sideways.
    pub fn random_velocity(&mut self) -> Vec3 {
        let mut r = || self.rng.gen::<f64>();
        let v = Vec3::new(r() - r(), r() * 0.75, r() - r());
        if v.length() == 0.0 {
            return Vec3::new(0.0, THROW_SPEED, 0.0);
        }
        v.normalize() * THROW_SPEED
    }

    /// Persists and adopts a new drop.
    ///
    /// # Errors
    ///
    /// Storage failure; nothing is adopted.
    pub fn create(
        &mut self,
        store: &mut dyn WorldStore,
        items: Vec<ItemStack>,
        pos: Vec3,
        velocity: Vec3,
    ) -> WorldResult<&DropItem> {
        let row = store.create_drop_item(items, pos)?;
        let entity_id = row.entity_id.clone();
        Ok(self.items.entry(entity_id).or_insert(DropItem {
            row,
            velocity,
            on_ground: false,
        }))
    }

    /// Adopts the drops persisted in a chunk. Returns the ids newly adopted.
    ///
    /// # Errors
    ///
    /// Storage failure; nothing is adopted.
    pub fn load_chunk(&mut self, store: &dyn WorldStore, addr: ChunkAddr) -> WorldResult<Vec<String>> {
        let mut adopted = Vec::new();
        for row in store.load_drop_items(addr)? {
            if self.items.contains_key(&row.entity_id) {
                continue;
            }
            adopted.push(row.entity_id.clone());
            self.items.insert(
                row.entity_id.clone(),
                DropItem {
                    row,
                    velocity: Vec3::ZERO,
                    on_ground: false,
                },
            );
        }
        Ok(adopted)
    }

    /// Forgets the listed drops without touching the store.
    pub fn unload_many(&mut self, ids: &[String]) -> usize {
        ids.iter().filter(|id| self.items.remove(*id).is_some()).count()
    }

    /// Moves every airborne drop one tick.
    ///
    /// Drops over unloaded voxels freeze until the voxels load.
    pub fn tick(&mut self, world: &dyn BlockAccess, registry: &BlockRegistry) -> Vec<Crossing> {
        let mut crossings = Vec::new();
        for (entity_id, item) in &mut self.items {
            if item.on_ground {
                continue;
            }
            let from = item.chunk_addr();
            let mut velocity = item.velocity;
            velocity.y -= GRAVITY;
            let next = item.row.pos + velocity;

            let Some(target) = world.block_at(next.floored()) else {
                continue;
            };
            if registry.get(target.id).is_solid() {
                if velocity.y < 0.0 {
                    let top = f64::from(next.floored().y) + 1.0;
                    item.row.pos = Vec3::new(item.row.pos.x, top, item.row.pos.z);
                    item.velocity = Vec3::ZERO;
                    item.on_ground = true;
                } else {
                    item.velocity = Vec3::new(0.0, velocity.y, 0.0);
                }
            } else {
                item.row.pos = next;
                item.velocity = Vec3::new(velocity.x * DRAG, velocity.y, velocity.z * DRAG);
            }

            let to = item.chunk_addr();
            if to != from {
                crossings.push(Crossing {
                    entity_id: entity_id.clone(),
                    from,
                    to,
                });
            }
        }
        crossings
    }

    /// Wakes resting drops whose support is gone.
    pub fn unsettle(&mut self, world: &dyn BlockAccess, registry: &BlockRegistry) {
        for item in self.items.values_mut().filter(|i| i.on_ground) {
            let below = (item.row.pos - Vec3::new(0.0, 0.5, 0.0)).floored();
            let supported = world
                .block_at(below)
                .map_or(true, |b| registry.get(b.id).is_solid());
            if !supported {
                item.on_ground = false;
            }
        }
    }

    /// Drops within `radius` of `pos`, looked up through the loaded chunks.
    #[must_use]
    pub fn near(&self, pos: Vec3, radius: f64, chunks: &ChunkManager) -> Vec<String> {
        let aabb = Aabb::around(pos, Vec3::new(radius, radius, radius));
        let mut found = Vec::new();
        for chunk in chunks.get_in_aabb(&aabb) {
            for entity_id in chunk.drop_item_ids() {
                let close = self
                    .items
                    .get(&entity_id)
                    .is_some_and(|item| item.row.pos.distance(pos) <= radius);
                if close {
                    found.push(entity_id);
                }
            }
        }
        found
    }

    /// Deletes a drop from the store, then forgets it.
    ///
    /// Returns `Ok(None)` for ids that are not live.
    ///
    /// # Errors
    ///
    /// Storage failure; the drop stays live.
    pub fn pickup(&mut self, store: &mut dyn WorldStore, entity_id: &str) -> WorldResult<Option<DropItem>> {
        if !self.items.contains_key(entity_id) {
            return Ok(None);
        }
        store.delete_drop_item(entity_id)?;
        Ok(self.items.remove(entity_id))
    }

    /// `DROP_ITEM_ADDED` for the listed drops.
    #[must_use]
    pub fn added_packet(&self, ids: &[String]) -> Packet {
        let items: Vec<_> = ids
            .iter()
            .filter_map(|id| self.items.get(id))
            .map(|item| {
                json!({
                    "entity_id": item.row.entity_id,
                    "items": item.row.items,
                    "pos": item.row.pos,
                    "velocity": item.velocity,
                })
            })
            .collect();
        Packet::new(PacketName::DropItemAdded, json!({ "items": items }))
    }
}

/// `DROP_ITEM_DELETED` for the listed drops.
#[must_use]
pub fn deleted_packet(ids: &[String]) -> Packet {
    Packet::new(PacketName::DropItemDeleted, json!({ "entity_ids": ids }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use strata_persistence::JournalStore;
    use strata_shared::{block_id, BlockItem, BlockPos};

    fn temp_store() -> (JournalStore, std::path::PathBuf) {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("test_drops_{id}"));
        let mut store = JournalStore::open(&dir).unwrap();
        store.migrate().unwrap();
        (store, dir)
    }

    #[test]
    fn test_throw_has_fixed_speed() {
        let mut drops = DropItemManager::new(&DropItemConfig::default(), 5);
        for _ in 0..50 {
            let v = drops.random_velocity();
            assert!((v.length() - THROW_SPEED).abs() < 1e-9);
            assert!(v.y >= 0.0);
        }
    }

    #[test]
    fn test_drop_falls_and_rests_on_ground() {
        let (mut store, dir) = temp_store();
        let mut drops = DropItemManager::new(&DropItemConfig::default(), 5);
        let mut world = HashMap::new();
        for x in -2..3 {
            for z in -2..3 {
                world.insert(BlockPos::new(x, 3, z), BlockItem::new(block_id::STONE));
            }
        }
        let registry = BlockRegistry::standard();
        let id = drops
            .create(
                &mut store,
                vec![ItemStack::new(block_id::DIRT, 1)],
                Vec3::new(0.5, 6.0, 0.5),
                Vec3::ZERO,
            )
            .unwrap()
            .row
            .entity_id
            .clone();

        for _ in 0..100 {
            drops.tick(&world, &registry);
        }
        let item = drops.get(&id).unwrap();
        assert!(item.on_ground);
        assert!((item.row.pos.y - 4.0).abs() < 1e-9);

        world.remove(&BlockPos::new(0, 3, 0));
        drops.unsettle(&world, &registry);
        assert!(!drops.get(&id).unwrap().on_ground);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_pickup_deletes_row_first() {
        let (mut store, dir) = temp_store();
        let mut drops = DropItemManager::new(&DropItemConfig::default(), 5);
        let pos = Vec3::new(1.5, 4.0, 1.5);
        let id = drops
            .create(&mut store, vec![ItemStack::new(block_id::EGG, 2)], pos, Vec3::ZERO)
            .unwrap()
            .row
            .entity_id
            .clone();
        let addr = ChunkAddr::from_world(pos);
        assert_eq!(store.load_drop_items(addr).unwrap().len(), 1);

        let taken = drops.pickup(&mut store, &id).unwrap().unwrap();
        assert_eq!(taken.row.items, vec![ItemStack::new(block_id::EGG, 2)]);
        assert!(store.load_drop_items(addr).unwrap().is_empty());
        assert!(drops.pickup(&mut store, &id).unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
