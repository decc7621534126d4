//! Applying a [`WorldAction`].
//!
//! Persist first, mutate memory second, broadcast last. Voxel overrides are
//! written before anything else happens; when the store refuses them the
//! whole action is dropped and nothing in memory changes.

use std::collections::BTreeMap;

use serde_json::json;
use strata_shared::{block_id, BlockAction, ChunkAddr, ItemStack, Packet, PacketName, PlayerId};

use super::{BlockChange, Deferred, Explosion, WorldAction, TNT_FUSE_TICKS};
use crate::blocks::Tag;
use crate::error::{ValidationError, WorldError, WorldResult};
use crate::network::{send_all, send_selected};
use crate::player::GameMode;
use crate::world::World;

/// Packets of one action, grouped by the chunk whose observers get them.
#[derive(Default)]
struct ChunkPackets {
    all: BTreeMap<ChunkAddr, Vec<Packet>>,
    except_actor: BTreeMap<ChunkAddr, Vec<Packet>>,
}

impl ChunkPackets {
    fn push(&mut self, addr: ChunkAddr, packet: Packet, except_actor: bool) {
        let target = if except_actor {
            &mut self.except_actor
        } else {
            &mut self.all
        };
        target.entry(addr).or_default().push(packet);
    }
}

impl World {
    /// Applies an action on behalf of `player` (`None` for the world).
    ///
    /// Overrides are persisted in one transaction when there is more than
    /// one. After that the remaining effects run in a fixed order and the
    /// packets go out once, per chunk, at the end.
    ///
    /// # Errors
    ///
    /// [`ValidationError::BlockNotFound`] when a voxel carries an
    /// unregistered id; nothing was applied. Otherwise the store refused the
    /// overrides; the transaction was rolled back and nothing was applied.
    /// Later failures (a drop or mob that could not be created) are logged
    /// and do not undo the committed voxels.
    pub fn apply_actions(
        &mut self,
        player: Option<PlayerId>,
        mut action: WorldAction,
    ) -> WorldResult<()> {
        if let Some(change) = action
            .blocks
            .iter()
            .find(|change| !self.registry.contains(change.item.id))
        {
            tracing::debug!("unregistered block {} at {}", change.item.id, change.pos);
            return Err(ValidationError::BlockNotFound.into());
        }
        for change in &mut action.blocks {
            if !self.registry.get(change.item.id).can_rotate {
                change.item.rotate = None;
            }
        }
        self.persist_blocks(&action.blocks)?;

        let survival = player
            .and_then(|id| self.players.get(&id))
            .is_some_and(|p| p.game_mode.is_survival());
        let mut batch = ChunkPackets::default();
        let mut actor_packets = Vec::new();
        let mut inventory_changed = false;

        if let Some(text) = &action.chat_message {
            let from = player
                .and_then(|id| self.players.get(&id))
                .map(|p| p.username.clone());
            let packet = Packet::new(PacketName::ChatMessage, json!({ "from": from, "text": text }));
            send_all(&mut self.players, &[packet], &[]);
        }

        if let Some(actor) = player.and_then(|id| self.players.get_mut(&id)) {
            if action.decrement && (survival || action.ignore_creative_game_mode) {
                let empties = actor
                    .inventory
                    .current()
                    .is_some_and(|held| self.registry.get(held.id).has_tag(Tag::EmptiesToBucket));
                if empties {
                    actor
                        .inventory
                        .set_current(Some(ItemStack::new(block_id::BUCKET, 1)));
                } else {
                    actor.inventory.decrement_current();
                }
                inventory_changed = true;
            }
            if action.decrement_instrument && survival {
                actor.inventory.wear_current();
                inventory_changed = true;
            }
        }

        for pos in &action.stop_disc {
            let packet = Packet::new(PacketName::StopPlayDisc, json!({ "pos": pos }));
            batch.push(pos.chunk_addr(), packet, false);
        }

        // Outside survival only forced drops appear.
        let drops_allowed = player.is_none() || survival;
        for drop in std::mem::take(&mut action.drop_items) {
            if !drop.force && !drops_allowed {
                continue;
            }
            let velocity = self.drop_items.random_velocity();
            let created = self
                .drop_items
                .create(self.store.as_mut(), drop.items, drop.pos, velocity)
                .map(|d| d.row.entity_id.clone());
            match created {
                Ok(entity_id) => {
                    let addr = ChunkAddr::from_world(drop.pos);
                    if let Some(chunk) = self.chunks.get_mut(addr) {
                        chunk.add_drop_item(entity_id.clone());
                    }
                    batch.push(addr, self.drop_items.added_packet(&[entity_id]), false);
                }
                Err(e) => tracing::warn!("drop at {:?} lost: {}", drop.pos, e),
            }
        }

        for change in &action.blocks {
            let addr = change.pos.chunk_addr();
            self.tracker.mark_modified(addr);
            if let Some(chunk) = self.chunks.get_mut(addr) {
                chunk.set_block(change.pos, change.item.clone(), &self.registry);
            }
            let packet = Packet::new(
                PacketName::BlockSet,
                json!({ "pos": change.pos, "item": change.item, "action": change.action }),
            );
            batch.push(addr, packet, false);
            if change.action == BlockAction::Destroy && change.destroy_block_id != 0 {
                let particles = Packet::new(
                    PacketName::ParticleBlockDestroy,
                    json!({ "pos": change.pos, "block_id": change.destroy_block_id }),
                );
                batch.push(addr, particles, true);
            }
        }

        for sound in &action.play_sound {
            let packet = Packet::new(
                PacketName::PlaySound,
                json!({ "tag": sound.tag, "action": sound.action, "pos": sound.pos }),
            );
            batch.push(ChunkAddr::from_world(sound.pos), packet, sound.except_actor);
        }

        for pos in &action.explosion_particles {
            let packet = Packet::new(PacketName::ParticleExplosion, json!({ "pos": pos }));
            batch.push(ChunkAddr::from_world(*pos), packet, false);
        }

        if let Some(actor) = player.and_then(|id| self.players.get_mut(&id)) {
            if let Some(filled) = action.put_in_bucket.take() {
                let held = actor.inventory.current().map(|h| (h.id, h.count));
                match held {
                    Some((block_id::BUCKET, count)) if count > 1 => {
                        actor.inventory.decrement_current();
                        if actor.inventory.add(&filled) > 0 {
                            tracing::debug!("player {} has no room for a filled bucket", actor.id);
                        }
                        inventory_changed = true;
                    }
                    Some((block_id::BUCKET, _)) => {
                        actor.inventory.set_current(Some(filled));
                        inventory_changed = true;
                    }
                    _ => {}
                }
            }

            if let Some(window) = action.open_window.take() {
                actor_packets.push(Packet::new(PacketName::WindowOpen, window));
            }

            if let Some(block) = action.clone_block.take() {
                if actor.game_mode == GameMode::Creative {
                    let mut stack = ItemStack::new(block.id, 1);
                    stack.extra_data = block.extra_data;
                    actor.inventory.set_current(Some(stack));
                    inventory_changed = true;
                }
            }
        }

        if let Some(spawn) = action.spawn_mob.take() {
            match self.mobs.spawn(self.store.as_mut(), &spawn) {
                Ok(id) => {
                    let addr = ChunkAddr::from_world(spawn.pos);
                    if let Some(chunk) = self.chunks.get_mut(addr) {
                        chunk.add_mob(id);
                    }
                    batch.push(addr, self.mobs.add_packet(&[id]), false);
                }
                Err(e) => tracing::warn!("spawning {} failed: {}", spawn.kind, e),
            }
        }

        if let Some(actor) = player.and_then(|id| self.players.get_mut(&id)) {
            if let Some(sitting) = action.sitting.take() {
                actor.sitting = Some(sitting);
                batch.push(ChunkAddr::from_world(sitting.pos), actor.state_packet(), false);
            }
            if inventory_changed {
                actor_packets.push(actor.inventory.packet());
            }
        }

        if let Some(pos) = action.fuse_tnt {
            let due = self.tick_number() + TNT_FUSE_TICKS;
            self.actions
                .push(due, player, Deferred::Explode(Explosion::tnt(pos)));
        }

        self.flush_chunk_packets(player, batch);
        if let Some(actor) = player.and_then(|id| self.players.get_mut(&id)) {
            if !actor_packets.is_empty() {
                actor.send(&actor_packets);
            }
        }
        Ok(())
    }

    /// Writes the overrides; several go through one transaction.
    fn persist_blocks(&mut self, blocks: &[BlockChange]) -> WorldResult<()> {
        let world_id = self.info.id;
        match blocks {
            [] => Ok(()),
            [single] => {
                self.store
                    .block_set(world_id, single.pos, &single.item, single.action)?;
                Ok(())
            }
            _ => {
                self.store.begin()?;
                for change in blocks {
                    if let Err(e) =
                        self.store
                            .block_set(world_id, change.pos, &change.item, change.action)
                    {
                        if let Err(r) = self.store.rollback() {
                            tracing::error!("rollback failed: {}", r);
                        }
                        tracing::warn!("{} block overrides rolled back: {}", blocks.len(), e);
                        return Err(e.into());
                    }
                }
                // A failed commit reverts on its own.
                self.store.commit().map_err(|e| {
                    tracing::warn!("commit of {} block overrides failed: {}", blocks.len(), e);
                    WorldError::from(e)
                })
            }
        }
    }

    fn flush_chunk_packets(&mut self, actor: Option<PlayerId>, batch: ChunkPackets) {
        let except: Vec<PlayerId> = actor.into_iter().collect();
        for (addr, packets) in batch.all {
            let observers = self.chunks.get(addr).map(|c| c.observers()).unwrap_or_default();
            send_selected(&mut self.players, &packets, &observers, &[]);
        }
        for (addr, packets) in batch.except_actor {
            let observers = self.chunks.get(addr).map(|c| c.observers()).unwrap_or_default();
            send_selected(&mut self.players, &packets, &observers, &except);
        }
    }
}
