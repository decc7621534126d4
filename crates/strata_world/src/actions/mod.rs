//! # World Actions
//!
//! Every voxel change goes through a [`WorldAction`]: the list of effects
//! one player interaction (or one scheduled event) produces.
//!
//! ## Pipeline
//!
//! ```text
//! PickatEvent ──► pickat_action ──► WorldAction ──► World::apply_actions
//!                 (pure: reads        (plain data)     (persist, then
//!                  voxels only)                         mutate and send)
//! ```
//!
//! Building an action never mutates the world, so a rejected interaction
//! leaves nothing behind, and a failed commit applies nothing.

mod apply;
mod context;
mod destroy;
mod explosion;
mod handlers;

use serde_json::Value;
use strata_shared::{Aabb, BlockAction, BlockItem, BlockPos, ItemStack, PlayerId, Vec3};

use crate::error::ValidationError;
use crate::player::{GameMode, Sitting};

pub use context::{calc_rotate, cardinal_offset, InteractionContext, PickatEvent, MAX_REACH};
pub use destroy::DestroySet;
pub use explosion::{make_explosion, Explosion, TNT_FUSE_TICKS};
pub use handlers::{pickat_action, PickatInput};

/// Snapshot of the acting player.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerView {
    /// Player id
    pub id: PlayerId,
    /// Display name
    pub username: String,
    /// Feet position
    pub pos: Vec3,
    /// Facing; `z` is the yaw in radians
    pub rotate: Vec3,
    /// Game mode
    pub game_mode: GameMode,
    /// Held item
    pub held: Option<ItemStack>,
    /// Body box
    pub aabb: Aabb,
}

/// One voxel override.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockChange {
    /// Position
    pub pos: BlockPos,
    /// New voxel
    pub item: BlockItem,
    /// How it was produced
    pub action: BlockAction,
    /// Id of the removed block, for destroy particles
    pub destroy_block_id: u16,
}

/// Items to spawn as a drop.
#[derive(Clone, Debug, PartialEq)]
pub struct DropSpec {
    /// Spawn position
    pub pos: Vec3,
    /// Stacks
    pub items: Vec<ItemStack>,
    /// Spawn even for players outside survival
    pub force: bool,
}

/// Sound to play.
#[derive(Clone, Debug, PartialEq)]
pub struct SoundSpec {
    /// Sound tag, usually a material name
    pub tag: String,
    /// Variant (`dig`, `place`, `click`, ...)
    pub action: String,
    /// Origin
    pub pos: Vec3,
    /// Skip the acting player, who already heard it locally
    pub except_actor: bool,
}

/// Mob to spawn.
#[derive(Clone, Debug, PartialEq)]
pub struct MobSpawn {
    /// Mob type
    pub kind: String,
    /// Skin
    pub skin: String,
    /// Position
    pub pos: Vec3,
    /// Facing
    pub rotate: Vec3,
}

/// Effects of one interaction, applied atomically by the world.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorldAction {
    /// Client-side correlation id
    pub id: Option<u64>,
    /// Chat line broadcast to everyone
    pub chat_message: Option<String>,
    /// Consume one held item
    pub decrement: bool,
    /// Consume even in creative mode
    pub ignore_creative_game_mode: bool,
    /// Wear the held instrument
    pub decrement_instrument: bool,
    /// Voxel overrides, in order
    pub blocks: Vec<BlockChange>,
    /// Drops to spawn
    pub drop_items: Vec<DropSpec>,
    /// Sounds to play
    pub play_sound: Vec<SoundSpec>,
    /// Jukeboxes to silence
    pub stop_disc: Vec<BlockPos>,
    /// Explosion particle origins
    pub explosion_particles: Vec<Vec3>,
    /// Filled bucket replacing the held empty one
    pub put_in_bucket: Option<ItemStack>,
    /// Window to open on the acting client
    pub open_window: Option<Value>,
    /// Block copied into the held slot (creative pick)
    pub clone_block: Option<BlockItem>,
    /// Seat taken by the acting player
    pub sitting: Option<Sitting>,
    /// Mob to spawn
    pub spawn_mob: Option<MobSpawn>,
    /// TNT lit at this position
    pub fuse_tnt: Option<BlockPos>,
}

impl WorldAction {
    /// Empty action tagged with a correlation id.
    #[must_use]
    pub fn new(id: Option<u64>) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Appends a voxel override.
    pub fn add_block(&mut self, pos: BlockPos, item: BlockItem, action: BlockAction) {
        self.blocks.push(BlockChange {
            pos,
            item,
            action,
            destroy_block_id: 0,
        });
    }

    /// Appends the removal of `destroyed_id` at `pos`.
    pub fn add_destroy(&mut self, pos: BlockPos, destroyed_id: u16) {
        self.blocks.push(BlockChange {
            pos,
            item: BlockItem::AIR,
            action: BlockAction::Destroy,
            destroy_block_id: destroyed_id,
        });
    }

    /// Appends a drop.
    pub fn add_drop(&mut self, pos: Vec3, items: Vec<ItemStack>, force: bool) {
        if items.is_empty() {
            return;
        }
        self.drop_items.push(DropSpec { pos, items, force });
    }

    /// Appends a sound.
    pub fn add_sound(&mut self, tag: &str, action: &str, pos: Vec3, except_actor: bool) {
        self.play_sound.push(SoundSpec {
            tag: tag.to_string(),
            action: action.to_string(),
            pos,
            except_actor,
        });
    }

    /// Records the filled bucket. Only one fill per interaction.
    ///
    /// # Errors
    ///
    /// [`ValidationError::PutAlready`] on a second fill.
    pub fn put_in_bucket(&mut self, item: ItemStack) -> Result<(), ValidationError> {
        if self.put_in_bucket.is_some() {
            return Err(ValidationError::PutAlready);
        }
        self.put_in_bucket = Some(item);
        Ok(())
    }

    /// Returns true if applying the action would do nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chat_message.is_none()
            && !self.decrement
            && !self.decrement_instrument
            && self.blocks.is_empty()
            && self.drop_items.is_empty()
            && self.play_sound.is_empty()
            && self.stop_disc.is_empty()
            && self.explosion_particles.is_empty()
            && self.put_in_bucket.is_none()
            && self.open_window.is_none()
            && self.clone_block.is_none()
            && self.sitting.is_none()
            && self.spawn_mob.is_none()
            && self.fuse_tnt.is_none()
    }
}

/// Work deferred to a later tick.
#[derive(Clone, Debug, PartialEq)]
pub enum Deferred {
    /// Replace the voxel at `pos` with `to`, unless it no longer is `from`.
    Update {
        /// Voxel position
        pos: BlockPos,
        /// Voxel the change was computed from
        from: BlockItem,
        /// Replacement
        to: BlockItem,
    },
    /// Detonate; the blast is computed against the world at that tick.
    Explode(Explosion),
}

#[derive(Clone, Debug)]
struct Scheduled {
    due: u64,
    player: Option<PlayerId>,
    work: Deferred,
}

/// Deferred work ordered by due tick, then by insertion.
#[derive(Default)]
pub struct ActionQueue {
    entries: Vec<Scheduled>,
}

impl ActionQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules work for tick `due`.
    pub fn push(&mut self, due: u64, player: Option<PlayerId>, work: Deferred) {
        self.entries.push(Scheduled { due, player, work });
    }

    /// Removes and returns everything due at or before `tick`, oldest first.
    pub fn take_due(&mut self, tick: u64) -> Vec<(Option<PlayerId>, Deferred)> {
        let (mut due, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.entries).into_iter().partition(|s| s.due <= tick);
        self.entries = waiting;
        due.sort_by_key(|s| s.due);
        due.into_iter().map(|s| (s.player, s.work)).collect()
    }

    /// Number of scheduled entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_shared::block_id;

    #[test]
    fn test_second_bucket_fill_rejected() {
        let mut action = WorldAction::new(None);
        action.put_in_bucket(ItemStack::new(block_id::WATER_BUCKET, 1)).unwrap();
        assert_eq!(
            action.put_in_bucket(ItemStack::new(block_id::WATER_BUCKET, 1)),
            Err(ValidationError::PutAlready)
        );
    }

    #[test]
    fn test_empty_drops_are_skipped() {
        let mut action = WorldAction::new(Some(3));
        action.add_drop(Vec3::ZERO, vec![], true);
        assert!(action.is_empty());
        action.add_destroy(BlockPos::new(1, 2, 3), block_id::STONE);
        assert!(!action.is_empty());
        assert_eq!(action.blocks[0].item, BlockItem::AIR);
        assert_eq!(action.blocks[0].destroy_block_id, block_id::STONE);
    }

    #[test]
    fn test_queue_releases_due_entries_in_order() {
        let mut queue = ActionQueue::new();
        let tagged = |x| Deferred::Explode(Explosion::tnt(BlockPos::new(x, 4, 0)));
        queue.push(12, None, tagged(2));
        queue.push(10, Some(7), tagged(1));
        queue.push(50, None, tagged(3));

        assert!(queue.take_due(9).is_empty());
        let due = queue.take_due(12);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0], (Some(7), tagged(1)));
        assert_eq!(due[1], (None, tagged(2)));
        assert_eq!(queue.len(), 1);
    }
}
