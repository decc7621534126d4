//! Interaction input and the read-only context handlers work from.

use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_shared::{BlockItem, BlockPos, ItemStack, Vec3};

use super::{PlayerView, WorldAction};
use crate::blocks::{BlockRegistry, Material};
use crate::chunk_manager::BlockAccess;
use crate::error::ValidationError;

/// Largest distance between the player's eyes and a block it touches.
pub const MAX_REACH: f64 = 8.0;

/// Eye height above the feet.
const EYE_HEIGHT: f64 = 1.62;

/// A click on a voxel face.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickatEvent {
    /// Client correlation id
    pub id: Option<u64>,
    /// Clicked voxel, integral coordinates
    pub pos: Vec3,
    /// Clicked face normal
    pub n: Vec3,
    /// Left click
    pub destroy_block: bool,
    /// Right click
    pub create_block: bool,
    /// Middle click
    pub clone_block: bool,
    /// Edit of block text
    pub change_extra_data: bool,
    /// Sneaking
    pub shift_key: bool,
    /// Mouse button number
    pub number: u32,
    /// Payload of an edit
    pub extra_data: Option<Value>,
}

impl PickatEvent {
    /// Clicked voxel.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidBlockPos`] for non-integral coordinates.
    pub fn block_pos(&self) -> Result<BlockPos, ValidationError> {
        BlockPos::from_vec3_exact(self.pos).ok_or(ValidationError::InvalidBlockPos)
    }

    /// Face normal; zero or one unit axis.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidPosN`] for anything else.
    pub fn normal(&self) -> Result<BlockPos, ValidationError> {
        let n = BlockPos::from_vec3_exact(self.n).ok_or(ValidationError::InvalidPosN)?;
        if n.x.abs() + n.y.abs() + n.z.abs() > 1 {
            return Err(ValidationError::InvalidPosN);
        }
        Ok(n)
    }
}

/// Unit step for cardinal direction `k` (taken modulo 4).
#[must_use]
pub const fn cardinal_offset(k: i32) -> BlockPos {
    match k.rem_euclid(4) {
        0 => BlockPos::new(0, 0, 1),
        1 => BlockPos::new(1, 0, 0),
        2 => BlockPos::new(0, 0, -1),
        _ => BlockPos::new(-1, 0, 0),
    }
}

/// Orientation of a block placed on face `n` by a player facing `rotate`.
///
/// Side faces orient the block along the normal; top and bottom faces use
/// the quadrant of the player's yaw and keep the sign of `n.y` in `y`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn calc_rotate(rotate: Vec3, n: BlockPos) -> Vec3 {
    if n.x == 0 && n.z == 0 {
        let quarter = (rotate.z / FRAC_PI_2).round() as i32;
        return Vec3::new(f64::from(quarter.rem_euclid(4)), f64::from(n.y), 0.0);
    }
    let k = (0..4).find(|k| cardinal_offset(*k) == n).unwrap_or(0);
    Vec3::new(f64::from(k), 0.0, 0.0)
}

/// Everything a handler may look at.
pub struct InteractionContext<'a> {
    /// Voxel source
    pub world: &'a dyn BlockAccess,
    /// Materials
    pub registry: &'a BlockRegistry,
    /// Acting player
    pub player: &'a PlayerView,
    /// The click
    pub event: &'a PickatEvent,
    /// Clicked voxel
    pub pos: BlockPos,
    /// Clicked face
    pub n: BlockPos,
    /// Voxel at `pos`
    pub block: BlockItem,
    /// Material of `block`
    pub material: &'a Material,
    /// Held stack
    pub held: Option<&'a ItemStack>,
    /// Material of the held stack
    pub held_material: Option<&'a Material>,
    /// Whether beds may be used
    pub is_night: bool,
    /// Seed for drop rolls
    pub seed: u64,
}

impl<'a> InteractionContext<'a> {
    /// Empty action carrying the event's correlation id.
    #[must_use]
    pub fn action(&self) -> WorldAction {
        WorldAction::new(self.event.id)
    }

    /// Voxel at `pos`, `None` where no chunk is loaded.
    #[must_use]
    pub fn block_at(&self, pos: BlockPos) -> Option<BlockItem> {
        self.world.block_at(pos)
    }

    /// Material at `pos`.
    #[must_use]
    pub fn material_at(&self, pos: BlockPos) -> Option<&'a Material> {
        self.world.block_at(pos).map(|b| self.registry.get(b.id))
    }

    /// Whether the held material carries `tag`.
    #[must_use]
    pub fn held_has(&self, tag: crate::blocks::Tag) -> bool {
        self.held_material.is_some_and(|m| m.has_tag(tag))
    }

    /// Distance check between the player's eyes and a voxel centre.
    #[must_use]
    pub fn within_reach(&self, pos: BlockPos) -> bool {
        let eye = self.player.pos + Vec3::new(0.0, EYE_HEIGHT, 0.0);
        let centre = pos.to_vec3() + Vec3::new(0.5, 0.5, 0.5);
        eye.distance(centre) <= MAX_REACH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_validation() {
        let mut event = PickatEvent {
            n: Vec3::new(0.0, -1.0, 0.0),
            ..PickatEvent::default()
        };
        assert_eq!(event.normal(), Ok(BlockPos::new(0, -1, 0)));
        event.n = Vec3::new(1.0, 1.0, 0.0);
        assert_eq!(event.normal(), Err(ValidationError::InvalidPosN));
        event.n = Vec3::new(0.5, 0.0, 0.0);
        assert_eq!(event.normal(), Err(ValidationError::InvalidPosN));
    }

    #[test]
    fn test_fractional_position_rejected() {
        let event = PickatEvent {
            pos: Vec3::new(1.5, 2.0, 3.0),
            ..PickatEvent::default()
        };
        assert_eq!(event.block_pos(), Err(ValidationError::InvalidBlockPos));
    }

    #[test]
    fn test_side_face_orientation_follows_normal() {
        for k in 0..4 {
            let rotate = calc_rotate(Vec3::ZERO, cardinal_offset(k));
            assert!((rotate.x - f64::from(k)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_top_face_orientation_follows_yaw() {
        let rotate = calc_rotate(Vec3::new(0.0, 0.0, FRAC_PI_2 * 3.0), BlockPos::new(0, 1, 0));
        assert!((rotate.x - 3.0).abs() < 1e-9);
        assert!((rotate.y - 1.0).abs() < 1e-9);
        let rotate = calc_rotate(Vec3::new(0.0, 0.0, -FRAC_PI_2), BlockPos::new(0, -1, 0));
        assert!((rotate.x - 3.0).abs() < 1e-9);
        assert!((rotate.y + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_event_deserializes_with_defaults() {
        let event: PickatEvent =
            serde_json::from_value(serde_json::json!({"pos": {"x": 1.0, "y": 2.0, "z": 3.0}}))
                .unwrap();
        assert!(!event.destroy_block);
        assert_eq!(event.block_pos(), Ok(BlockPos::new(1, 2, 3)));
    }
}
