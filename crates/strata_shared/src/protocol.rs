//! Packet vocabulary and the block/item payloads carried inside packets.
//!
//! Packets are `{name, data}` pairs. The name is a closed enum, the data is
//! free-form JSON so the network layer can forward it without knowing the
//! payload shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::math::Vec3;

/// Identifier of a connected player.
pub type PlayerId = u64;

/// Outbound packet names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacketName {
    /// Added/deleted chunk addresses around a player.
    NearbyChunks,
    /// Override list of a chunk the player asked for.
    ChunkLoaded,
    /// A voxel changed.
    BlockSet,
    /// Destroy particles for a removed voxel.
    ParticleBlockDestroy,
    /// Play a sound at a position.
    PlaySound,
    /// Stop a jukebox disc.
    StopPlayDisc,
    /// Explosion particles.
    ParticleExplosion,
    /// Mobs became visible.
    MobAdd,
    /// Mobs left the world.
    MobDelete,
    /// A mob state changed.
    MobUpdate,
    /// Drop items appeared.
    DropItemAdded,
    /// Drop items were collected or removed.
    DropItemDeleted,
    /// Chat line.
    ChatMessage,
    /// Ask the client to open a window.
    WindowOpen,
    /// Player state (sitting, sleeping) changed.
    PlayerState,
    /// Inventory contents.
    InventoryState,
    /// Teleport the player.
    Teleport,
    /// Typed error for the originating player.
    Error,
}

/// A single outbound packet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Packet name
    pub name: PacketName,
    /// Payload
    pub data: Value,
}

impl Packet {
    /// Creates a packet.
    #[must_use]
    pub fn new(name: PacketName, data: Value) -> Self {
        Self { name, data }
    }
}

/// How a voxel override was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockAction {
    /// A new block was placed.
    Create,
    /// A block was removed.
    Destroy,
    /// A block changed state in place.
    Modify,
    /// A block was swapped for another.
    Replace,
}

/// Full description of a voxel: id plus optional state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockItem {
    /// Block id
    pub id: u16,
    /// Orientation, only kept for rotatable materials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<Vec3>,
    /// Power or durability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,
    /// Reference to an entity row (chests, signs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Free-form block state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<Value>,
}

impl BlockItem {
    /// Empty voxel.
    pub const AIR: Self = Self::new(0);

    /// Plain block without state.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self {
            id,
            rotate: None,
            power: None,
            entity_id: None,
            extra_data: None,
        }
    }

    /// Same block with the given orientation.
    #[must_use]
    pub fn with_rotate(mut self, rotate: Vec3) -> Self {
        self.rotate = Some(rotate);
        self
    }

    /// Same block with the given extra state.
    #[must_use]
    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra_data = Some(extra);
        self
    }

    /// Returns true for air.
    #[must_use]
    pub const fn is_air(&self) -> bool {
        self.id == 0
    }

    /// Looks up a field of the extra state.
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra_data.as_ref().and_then(|e| e.get(key))
    }

    /// Boolean field of the extra state, `false` when absent.
    #[must_use]
    pub fn extra_flag(&self, key: &str) -> bool {
        self.extra(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Integer field of the extra state.
    #[must_use]
    pub fn extra_int(&self, key: &str) -> Option<i64> {
        self.extra(key).and_then(Value::as_i64)
    }

    /// Sets one field of the extra state, creating the object if needed.
    pub fn set_extra(&mut self, key: &str, value: Value) {
        match self.extra_data.as_mut().and_then(Value::as_object_mut) {
            Some(map) => {
                map.insert(key.to_string(), value);
            }
            None => {
                let mut map = serde_json::Map::new();
                map.insert(key.to_string(), value);
                self.extra_data = Some(Value::Object(map));
            }
        }
    }

    /// Removes one field of the extra state; an emptied object is dropped.
    pub fn remove_extra(&mut self, key: &str) -> Option<Value> {
        let map = self.extra_data.as_mut()?.as_object_mut()?;
        let removed = map.remove(key);
        if map.is_empty() {
            self.extra_data = None;
        }
        removed
    }

    /// Returns true if the voxel carries state beyond its id.
    #[must_use]
    pub const fn has_state(&self) -> bool {
        self.rotate.is_some()
            || self.power.is_some()
            || self.entity_id.is_some()
            || self.extra_data.is_some()
    }

    /// Cardinal direction 0..=3 encoded in `rotate.x`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn cardinal(&self) -> i32 {
        self.rotate
            .map_or(0, |r| (r.x.round() as i32).rem_euclid(4))
    }
}

/// A stack of items in an inventory or a drop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item id
    pub id: u16,
    /// Stack size
    pub count: u32,
    /// Durability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,
    /// Item state (disc tracks, container contents)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<Value>,
}

impl ItemStack {
    /// Creates a plain stack.
    #[must_use]
    pub const fn new(id: u16, count: u32) -> Self {
        Self {
            id,
            count,
            power: None,
            extra_data: None,
        }
    }
}
