//! # Server Player
//!
//! A connected player as the simulation sees it: position, game mode,
//! inventory and the set of chunk addresses it currently observes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::json;
use strata_shared::constants::{DEFAULT_RENDER_DIST, MAX_RENDER_DIST, MIN_RENDER_DIST};
use strata_shared::{Aabb, ChunkAddr, ItemStack, Packet, PacketName, PlayerId, Vec3};

use crate::actions::PlayerView;
use crate::network::PlayerConnection;

/// Slots in a player inventory.
pub const INVENTORY_SIZE: usize = 36;

/// Slots reachable as the held item.
pub const HOTBAR_SIZE: usize = 9;

/// Largest stack in one slot.
pub const MAX_STACK: u32 = 64;

/// Player body width.
pub const PLAYER_WIDTH: f64 = 0.6;

/// Player body height.
pub const PLAYER_HEIGHT: f64 = 1.8;

/// Game mode of a player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Items are consumed, drops spawn.
    #[default]
    Survival,
    /// Unlimited items.
    Creative,
    /// Interaction restricted.
    Adventure,
    /// Observer only.
    Spectator,
}

impl GameMode {
    /// Returns true for survival.
    #[must_use]
    pub const fn is_survival(self) -> bool {
        matches!(self, Self::Survival)
    }

    /// Returns true for creative.
    #[must_use]
    pub const fn is_creative(self) -> bool {
        matches!(self, Self::Creative)
    }
}

/// Player inventory with a selected hotbar slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Inventory {
    slots: Vec<Option<ItemStack>>,
    current: usize,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    /// Empty inventory, first hotbar slot selected.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![None; INVENTORY_SIZE],
            current: 0,
        }
    }

    /// Selected hotbar slot.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current
    }

    /// Selects a hotbar slot; out-of-range indexes are ignored.
    pub fn select(&mut self, index: usize) {
        if index < HOTBAR_SIZE {
            self.current = index;
        }
    }

    /// Held item.
    #[must_use]
    pub fn current(&self) -> Option<&ItemStack> {
        self.slots[self.current].as_ref()
    }

    /// Replaces the held item.
    pub fn set_current(&mut self, item: Option<ItemStack>) {
        self.slots[self.current] = item.filter(|i| i.count > 0);
    }

    /// Item in a slot.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&ItemStack> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Replaces the item in a slot; out-of-range indexes are ignored.
    pub fn set_slot(&mut self, index: usize, item: Option<ItemStack>) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = item.filter(|i| i.count > 0);
        }
    }

    /// Removes one of the held item. Returns false if nothing was held.
    pub fn decrement_current(&mut self) -> bool {
        let slot = &mut self.slots[self.current];
        match slot {
            Some(stack) => {
                stack.count = stack.count.saturating_sub(1);
                if stack.count == 0 {
                    *slot = None;
                }
                true
            }
            None => false,
        }
    }

    /// Wears the held instrument down by one; it breaks at zero power.
    pub fn wear_current(&mut self) {
        let slot = &mut self.slots[self.current];
        if let Some(stack) = slot {
            if let Some(power) = stack.power.as_mut() {
                *power -= 1.0;
                if *power <= 0.0 {
                    *slot = None;
                }
            }
        }
    }

    /// Adds a stack, merging into matching stacks first.
    ///
    /// Returns how many items did not fit.
    pub fn add(&mut self, stack: &ItemStack) -> u32 {
        let mut left = stack.count;
        for existing in self.slots.iter_mut().flatten() {
            if left == 0 {
                break;
            }
            if existing.id == stack.id
                && existing.extra_data == stack.extra_data
                && existing.power == stack.power
                && existing.count < MAX_STACK
            {
                let moved = left.min(MAX_STACK - existing.count);
                existing.count += moved;
                left -= moved;
            }
        }
        for slot in &mut self.slots {
            if left == 0 {
                break;
            }
            if slot.is_none() {
                let moved = left.min(MAX_STACK);
                let mut placed = stack.clone();
                placed.count = moved;
                *slot = Some(placed);
                left -= moved;
            }
        }
        left
    }

    /// Total count of an item id.
    #[must_use]
    pub fn count(&self, item_id: u16) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.id == item_id)
            .map(|s| s.count)
            .sum()
    }

    /// `INVENTORY_STATE` packet.
    #[must_use]
    pub fn packet(&self) -> Packet {
        Packet::new(
            PacketName::InventoryState,
            json!({ "current": self.current, "slots": self.slots }),
        )
    }
}

/// Seat taken on stairs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sitting {
    /// Seat position
    pub pos: Vec3,
    /// Facing
    pub rotate: Vec3,
}

/// A connected player.
pub struct ServerPlayer {
    /// Player id
    pub id: PlayerId,
    /// Display name
    pub username: String,
    /// Game mode
    pub game_mode: GameMode,
    /// Feet position
    pub pos: Vec3,
    /// Facing
    pub rotate: Vec3,
    /// Seat, while sitting
    pub sitting: Option<Sitting>,
    /// Inventory
    pub inventory: Inventory,
    render_dist: i32,
    chunk_addr: ChunkAddr,
    chunk_addr_o: Option<ChunkAddr>,
    nearby: BTreeSet<ChunkAddr>,
    moved: bool,
    connection: Box<dyn PlayerConnection>,
}

impl ServerPlayer {
    /// Creates a player at `pos` with the default render distance.
    #[must_use]
    pub fn new(
        id: PlayerId,
        username: String,
        pos: Vec3,
        connection: Box<dyn PlayerConnection>,
    ) -> Self {
        Self {
            id,
            username,
            game_mode: GameMode::default(),
            pos,
            rotate: Vec3::ZERO,
            sitting: None,
            inventory: Inventory::new(),
            render_dist: DEFAULT_RENDER_DIST,
            chunk_addr: ChunkAddr::from_world(pos),
            chunk_addr_o: None,
            nearby: BTreeSet::new(),
            moved: true,
            connection,
        }
    }

    /// Render distance in chunks.
    #[must_use]
    pub const fn render_dist(&self) -> i32 {
        self.render_dist
    }

    /// Sets the render distance, clamped to the allowed range.
    pub fn set_render_dist(&mut self, dist: i32) {
        self.render_dist = dist.clamp(MIN_RENDER_DIST, MAX_RENDER_DIST);
        self.chunk_addr_o = None;
        self.moved = true;
    }

    /// Moves the player. Standing up is implied.
    pub fn move_to(&mut self, pos: Vec3, rotate: Vec3) {
        self.pos = pos;
        self.rotate = rotate;
        self.sitting = None;
        self.moved = true;
    }

    /// Returns and clears the moved flag.
    pub fn take_moved(&mut self) -> bool {
        std::mem::take(&mut self.moved)
    }

    /// Chunk the player stands in, as of the last visibility check.
    #[must_use]
    pub const fn chunk_addr(&self) -> ChunkAddr {
        self.chunk_addr
    }

    /// Chunk of the last visibility check, `None` before the first.
    #[must_use]
    pub const fn last_visibility_addr(&self) -> Option<ChunkAddr> {
        self.chunk_addr_o
    }

    /// Records the chunk the last visibility check ran for.
    pub(crate) fn set_visibility_addr(&mut self, addr: ChunkAddr) {
        self.chunk_addr = addr;
        self.chunk_addr_o = Some(addr);
    }

    /// Observed chunk addresses.
    #[must_use]
    pub const fn nearby(&self) -> &BTreeSet<ChunkAddr> {
        &self.nearby
    }

    pub(crate) fn nearby_mut(&mut self) -> &mut BTreeSet<ChunkAddr> {
        &mut self.nearby
    }

    /// Body box.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        let half = PLAYER_WIDTH / 2.0;
        Aabb::new(
            self.pos - Vec3::new(half, 0.0, half),
            self.pos + Vec3::new(half, PLAYER_HEIGHT, half),
        )
    }

    /// Snapshot used by the interaction handlers.
    #[must_use]
    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            username: self.username.clone(),
            pos: self.pos,
            rotate: self.rotate,
            game_mode: self.game_mode,
            held: self.inventory.current().cloned(),
            aabb: self.aabb(),
        }
    }

    /// Sends packets; a failure is logged and reported as `false`.
    pub fn send(&mut self, packets: &[Packet]) -> bool {
        match self.connection.send(packets) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("dropping {} packets: {}", packets.len(), e);
                false
            }
        }
    }

    /// Sends a typed `ERROR` packet.
    pub fn send_error(&mut self, message: &str) {
        self.send(&[Packet::new(PacketName::Error, json!({ "message": message }))]);
    }

    /// `PLAYER_STATE` packet.
    #[must_use]
    pub fn state_packet(&self) -> Packet {
        Packet::new(
            PacketName::PlayerState,
            json!({
                "id": self.id,
                "username": self.username,
                "pos": self.pos,
                "rotate": self.rotate,
                "sitting": self.sitting,
                "game_mode": self.game_mode,
            }),
        )
    }
}
