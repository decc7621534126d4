//! Destroy cascade.
//!
//! Removing one voxel can take others with it: the other half of a door
//! or bed, hanging chains below, plants on top. [`DestroySet`] walks that
//! graph once per position and appends every removal, sound and drop to
//! the action being built.

use std::collections::HashSet;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strata_shared::{BlockItem, BlockPos, ItemStack};

use super::context::cardinal_offset;
use super::WorldAction;
use crate::blocks::{BlockRegistry, DropRule, Tag};
use crate::chunk_manager::BlockAccess;

/// Positions already scheduled for removal in one action.
pub struct DestroySet<'a> {
    world: &'a dyn BlockAccess,
    registry: &'a BlockRegistry,
    seen: HashSet<BlockPos>,
    rng: ChaCha8Rng,
}

impl<'a> DestroySet<'a> {
    /// Creates an empty set; drop rolls come from `seed`.
    #[must_use]
    pub fn new(world: &'a dyn BlockAccess, registry: &'a BlockRegistry, seed: u64) -> Self {
        Self {
            world,
            registry,
            seen: HashSet::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Returns true if `pos` is already being removed.
    #[must_use]
    pub fn contains(&self, pos: BlockPos) -> bool {
        self.seen.contains(&pos)
    }

    /// Removes `block` at `pos` and everything that depends on it.
    pub fn add(&mut self, action: &mut WorldAction, block: &BlockItem, pos: BlockPos, no_drop: bool) {
        if !self.seen.insert(pos) {
            return;
        }
        let registry = self.registry;
        let material = registry.get(block.id);

        action.add_destroy(pos, block.id);
        action.add_sound(material.name, "dig", pos.bottom_center(), true);

        if material.has_tag(Tag::Jukebox) {
            if let Some(disc) = block.extra("disc").and_then(disc_stack) {
                action.add_drop(pos.bottom_center(), vec![disc], true);
                action.stop_disc.push(pos);
            }
        }

        if material.has_tag(Tag::Pot) {
            if let Some(planted) = block.extra_int("item").and_then(|id| u16::try_from(id).ok()) {
                action.add_drop(pos.bottom_center(), vec![ItemStack::new(planted, 1)], false);
            }
        }

        if !no_drop {
            self.drop_block(action, block, pos);
        }

        for part in [material.next_part, material.previous_part].into_iter().flatten() {
            let part_pos = pos + part.offset;
            if let Some(found) = self.world.block_at(part_pos) {
                if found.id == part.id {
                    self.add(action, &found, part_pos, no_drop);
                }
            }
        }

        if material.has_tag(Tag::Bed) {
            let partner_pos = pos + cardinal_offset(block.cardinal() + 2);
            if let Some(partner) = self.world.block_at(partner_pos) {
                if partner.id == block.id {
                    self.add(action, &partner, partner_pos, true);
                }
            }
        }

        if !material.destroy_to_down.is_empty() {
            let below = pos.down(1);
            if let Some(hanging) = self.world.block_at(below) {
                if material.destroy_to_down.contains(&hanging.id) {
                    self.add(action, &hanging, below, no_drop);
                }
            }
        }
    }

    /// Removes a plant standing on `pos`, if any.
    pub fn add_plant_above(&mut self, action: &mut WorldAction, pos: BlockPos) {
        let above = pos.up(1);
        if let Some(plant) = self.world.block_at(above) {
            if self.registry.get(plant.id).has_tag(Tag::Plant) {
                self.add(action, &plant, above, false);
            }
        }
    }

    fn drop_block(&mut self, action: &mut WorldAction, block: &BlockItem, pos: BlockPos) {
        let material = self.registry.get(block.id);
        if material.has_tag(Tag::NoDrop) {
            return;
        }
        let mut items = Vec::new();
        match &material.drop {
            DropRule::Nothing => {}
            DropRule::SelfDrop => {
                if material.spawnable {
                    items.push(ItemStack::new(block.id, 1));
                }
            }
            DropRule::Item { id, chance, counts } => {
                if self.rng.gen::<f64>() <= *chance {
                    let count = if counts.is_empty() {
                        1
                    } else {
                        counts[self.rng.gen_range(0..counts.len())]
                    };
                    if count > 0 {
                        items.push(ItemStack::new(*id, count));
                    }
                }
            }
            DropRule::Seeds { complete, incomplete } => {
                let table = if block.extra_flag("complete") { complete } else { incomplete };
                for &(id, min, max) in table {
                    let count = self.rng.gen_range(min..=max.max(min));
                    if count > 0 {
                        items.push(ItemStack::new(id, count));
                    }
                }
            }
        }
        action.add_drop(pos.bottom_center(), items, false);
    }
}

fn disc_stack(value: &serde_json::Value) -> Option<ItemStack> {
    serde_json::from_value(value.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use strata_shared::{block_id, Vec3};

    fn world(blocks: &[(BlockPos, BlockItem)]) -> HashMap<BlockPos, BlockItem> {
        blocks.iter().cloned().collect()
    }

    #[test]
    fn test_bed_takes_partner_and_drops_once() {
        let foot = BlockPos::new(10, 64, 10);
        let head = BlockPos::new(10, 64, 11);
        let foot_item = BlockItem::new(block_id::RED_BED).with_rotate(Vec3::new(2.0, 0.0, 0.0));
        let head_item = BlockItem::new(block_id::RED_BED)
            .with_rotate(Vec3::new(0.0, 0.0, 0.0))
            .with_extra(json!({"is_head": true}));
        let world = world(&[(foot, foot_item.clone()), (head, head_item)]);
        let registry = BlockRegistry::standard();

        let mut action = WorldAction::new(None);
        DestroySet::new(&world, &registry, 1).add(&mut action, &foot_item, foot, false);

        let removed: Vec<_> = action.blocks.iter().map(|b| b.pos).collect();
        assert_eq!(removed, vec![foot, head]);
        let dropped: u32 = action
            .drop_items
            .iter()
            .flat_map(|d| &d.items)
            .filter(|i| i.id == block_id::RED_BED)
            .map(|i| i.count)
            .sum();
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_door_top_removes_bottom() {
        let bottom = BlockPos::new(0, 5, 0);
        let top = bottom.up(1);
        let world = world(&[
            (bottom, BlockItem::new(block_id::OAK_DOOR)),
            (top, BlockItem::new(block_id::OAK_DOOR_TOP)),
        ]);
        let registry = BlockRegistry::standard();

        let mut action = WorldAction::new(None);
        let mut set = DestroySet::new(&world, &registry, 1);
        set.add(&mut action, &BlockItem::new(block_id::OAK_DOOR_TOP), top, false);

        assert_eq!(action.blocks.len(), 2);
        assert!(set.contains(bottom));
        assert_eq!(action.drop_items.len(), 1);
        assert_eq!(action.drop_items[0].items[0].id, block_id::OAK_DOOR);
    }

    #[test]
    fn test_chain_takes_hanging_lantern() {
        let chain = BlockPos::new(0, 10, 0);
        let world = world(&[
            (chain, BlockItem::new(block_id::CHAIN)),
            (chain.down(1), BlockItem::new(block_id::CHAIN)),
            (chain.down(2), BlockItem::new(block_id::LANTERN)),
            (chain.down(3), BlockItem::new(block_id::LANTERN)),
        ]);
        let registry = BlockRegistry::standard();

        let mut action = WorldAction::new(None);
        DestroySet::new(&world, &registry, 1).add(
            &mut action,
            &BlockItem::new(block_id::CHAIN),
            chain,
            false,
        );
        // the second lantern is not hanging from a chain
        assert_eq!(action.blocks.len(), 3);
    }

    #[test]
    fn test_jukebox_ejects_disc() {
        let pos = BlockPos::new(1, 1, 1);
        let jukebox = BlockItem::new(block_id::JUKEBOX)
            .with_extra(json!({"disc": {"id": block_id::MUSIC_DISC, "count": 1}}));
        let world = world(&[(pos, jukebox.clone())]);
        let registry = BlockRegistry::standard();

        let mut action = WorldAction::new(None);
        DestroySet::new(&world, &registry, 1).add(&mut action, &jukebox, pos, false);

        assert_eq!(action.stop_disc, vec![pos]);
        let ids: Vec<_> = action.drop_items.iter().map(|d| d.items[0].id).collect();
        assert!(ids.contains(&block_id::MUSIC_DISC));
        assert!(ids.contains(&block_id::JUKEBOX));
    }

    #[test]
    fn test_crop_drops_follow_growth() {
        let pos = BlockPos::new(0, 0, 0);
        let registry = BlockRegistry::standard();
        let world = world(&[]);

        let young = BlockItem::new(block_id::WHEAT).with_extra(json!({"stage": 2}));
        let mut action = WorldAction::new(None);
        DestroySet::new(&world, &registry, 9).add(&mut action, &young, pos, false);
        assert_eq!(action.drop_items[0].items, vec![ItemStack::new(block_id::WHEAT_SEEDS, 1)]);

        let ripe = BlockItem::new(block_id::WHEAT).with_extra(json!({"stage": 7, "complete": true}));
        let mut action = WorldAction::new(None);
        DestroySet::new(&world, &registry, 9).add(&mut action, &ripe, pos, false);
        assert!(action.drop_items[0]
            .items
            .iter()
            .any(|i| i.id == block_id::WHEAT_ITEM));
    }
}
