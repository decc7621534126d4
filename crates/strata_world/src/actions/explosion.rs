//! Blast resolution.

use std::collections::BTreeSet;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use strata_shared::{BlockItem, BlockPos, ItemStack, Vec3};

use super::WorldAction;
use crate::blocks::{BlockRegistry, Tag};
use crate::chunk_manager::BlockAccess;

/// Ticks between lighting TNT and the blast.
pub const TNT_FUSE_TICKS: u64 = 40;

/// One explosion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Explosion {
    /// Centre
    pub center: Vec3,
    /// Reach in blocks
    pub radius: f64,
    /// Blocks with a higher blast resistance survive
    pub power: f64,
    /// Chance that a non-container block drops itself
    pub drop_chance: f64,
}

impl Explosion {
    /// Blast of a lit TNT block.
    #[must_use]
    pub fn tnt(pos: BlockPos) -> Self {
        Self {
            center: pos.to_vec3() + Vec3::new(0.5, 0.5, 0.5),
            radius: 3.0,
            power: 5.0,
            drop_chance: 1.0,
        }
    }
}

/// Appends the blast to `action`.
///
/// Every voxel in the sphere whose blast resistance does not exceed the
/// power is removed. Blocks standing on removed voxels (up to two high)
/// fall off; both kinds drop themselves when their material allows it,
/// containers always together with their contents.
#[allow(clippy::cast_possible_truncation)]
pub fn make_explosion(
    action: &mut WorldAction,
    world: &dyn BlockAccess,
    registry: &BlockRegistry,
    explosion: &Explosion,
    rng: &mut ChaCha8Rng,
) {
    let reach = explosion.radius.ceil() as i32;
    let mut removed = BTreeSet::new();

    for dx in -reach..=reach {
        for dy in -reach..=reach {
            for dz in -reach..=reach {
                let point = explosion.center
                    + Vec3::new(f64::from(dx), f64::from(dy), f64::from(dz));
                if point.distance(explosion.center) > explosion.radius {
                    continue;
                }
                let pos = point.floored();
                if removed.contains(&pos) {
                    continue;
                }
                let Some(block) = world.block_at(pos) else {
                    continue;
                };
                let material = registry.get(block.id);
                if block.is_air()
                    || material.has_tag(Tag::Indestructible)
                    || material.blast_resistance > explosion.power
                {
                    continue;
                }
                removed.insert(pos);
                action.add_destroy(pos, block.id);
                auto_drop(action, registry, &block, pos, explosion.drop_chance, rng);
            }
        }
    }

    let mut loose = BTreeSet::new();
    for pos in &removed {
        for height in 1..=2 {
            let above = pos.up(height);
            if removed.contains(&above) || loose.contains(&above) {
                continue;
            }
            let Some(block) = world.block_at(above) else {
                continue;
            };
            if block.is_air() || !registry.get(block.id).can_auto_drop {
                break;
            }
            loose.insert(above);
            action.add_destroy(above, block.id);
            auto_drop(action, registry, &block, above, explosion.drop_chance, rng);
        }
    }

    action.explosion_particles.push(explosion.center);
    action.add_sound("explosion", "explode", explosion.center, false);
}

fn auto_drop(
    action: &mut WorldAction,
    registry: &BlockRegistry,
    block: &BlockItem,
    pos: BlockPos,
    chance: f64,
    rng: &mut ChaCha8Rng,
) {
    let material = registry.get(block.id);
    if !material.can_auto_drop {
        return;
    }
    let container = material.has_tag(Tag::Container);
    if !container && rng.gen::<f64>() > chance {
        return;
    }
    let mut items = vec![ItemStack::new(block.id, 1)];
    if container {
        if let Some(slots) = block.extra("slots").and_then(|s| s.as_array()) {
            items.extend(
                slots
                    .iter()
                    .filter_map(|s| serde_json::from_value::<ItemStack>(s.clone()).ok()),
            );
        }
    }
    action.add_drop(pos.to_vec3() + Vec3::new(0.5, 0.5, 0.5), items, true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use serde_json::json;
    use std::collections::HashMap;
    use strata_shared::block_id;

    fn stone_cube(half: i32) -> HashMap<BlockPos, BlockItem> {
        let mut world = HashMap::new();
        for x in -half..=half {
            for y in -half..=half {
                for z in -half..=half {
                    world.insert(BlockPos::new(x, y, z), BlockItem::new(block_id::STONE));
                }
            }
        }
        world
    }

    #[test]
    fn test_radius_and_resistance() {
        let mut world = stone_cube(5);
        world.insert(BlockPos::new(1, 0, 0), BlockItem::new(block_id::OBSIDIAN));
        let registry = BlockRegistry::standard();
        let explosion = Explosion {
            center: Vec3::new(0.5, 0.5, 0.5),
            radius: 3.0,
            power: 5.0,
            drop_chance: 1.0,
        };
        let mut action = WorldAction::new(None);
        make_explosion(&mut action, &world, &registry, &explosion, &mut ChaCha8Rng::seed_from_u64(1));

        let removed: BTreeSet<_> = action.blocks.iter().map(|b| b.pos).collect();
        assert!(removed.contains(&BlockPos::new(0, 0, 0)));
        assert!(removed.contains(&BlockPos::new(3, 0, 0)));
        assert!(!removed.contains(&BlockPos::new(4, 0, 0)));
        assert!(!removed.contains(&BlockPos::new(1, 0, 0)));
        assert!(action.drop_items.is_empty());
        assert_eq!(action.explosion_particles, vec![explosion.center]);
    }

    #[test]
    fn test_containers_drop_contents() {
        let mut world = HashMap::new();
        let chest = BlockItem::new(block_id::CHEST)
            .with_extra(json!({"slots": [{"id": block_id::EGG, "count": 4}]}));
        world.insert(BlockPos::new(0, 0, 0), chest);
        let registry = BlockRegistry::standard();
        let mut action = WorldAction::new(None);
        let explosion = Explosion {
            drop_chance: 0.0,
            ..Explosion::tnt(BlockPos::new(0, 0, 0))
        };
        make_explosion(&mut action, &world, &registry, &explosion, &mut ChaCha8Rng::seed_from_u64(1));

        assert_eq!(action.drop_items.len(), 1);
        let items = &action.drop_items[0].items;
        assert_eq!(items[0].id, block_id::CHEST);
        assert_eq!(items[1], ItemStack::new(block_id::EGG, 4));
    }

    #[test]
    fn test_loose_blocks_above_fall() {
        let mut world = HashMap::new();
        let ground = BlockPos::new(0, 0, 0);
        world.insert(ground, BlockItem::new(block_id::DIRT));
        world.insert(ground.up(1), BlockItem::new(block_id::OAK_SIGN));
        let registry = BlockRegistry::standard();
        let explosion = Explosion {
            center: Vec3::new(0.5, -0.5, 0.5),
            radius: 1.0,
            power: 5.0,
            drop_chance: 1.0,
        };
        let mut action = WorldAction::new(None);
        make_explosion(&mut action, &world, &registry, &explosion, &mut ChaCha8Rng::seed_from_u64(1));

        let removed: Vec<_> = action.blocks.iter().map(|b| b.pos).collect();
        assert!(removed.contains(&ground));
        assert!(removed.contains(&ground.up(1)));
        assert!(action
            .drop_items
            .iter()
            .any(|d| d.items[0].id == block_id::OAK_SIGN));
    }
}
