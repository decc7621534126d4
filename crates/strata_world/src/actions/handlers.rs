//! Click handlers.
//!
//! A click resolves in a fixed order: text edits, destroy, clone, then
//! create. Create first offers the click to the clicked block (doors,
//! windows, beds...), then to the held item (discs, eggs, buckets), then
//! falls back to tools and finally to placing a block. The first handler
//! that claims the click produces the action.

use std::f64::consts::FRAC_PI_2;

use serde_json::{json, Value};
use strata_shared::block_id as id;
use strata_shared::{Aabb, BlockAction, BlockItem, BlockPos, ItemStack, Vec3};

use super::context::{calc_rotate, cardinal_offset, InteractionContext, PickatEvent};
use super::destroy::DestroySet;
use super::{MobSpawn, PlayerView, WorldAction};
use crate::blocks::{BlockRegistry, Instrument, Material, Tag};
use crate::chunk_manager::BlockAccess;
use crate::error::{ValidationError, WorldResult};
use crate::player::{GameMode, Sitting};

/// Longest sign text in characters.
pub const MAX_SIGN_TEXT: usize = 110;

/// Distance from which a player may sit down.
const SIT_DISTANCE: f64 = 3.0;

/// Parts in one multi-block structure.
const MAX_PARTS: usize = 8;

type Handler = fn(&InteractionContext<'_>) -> WorldResult<Option<WorldAction>>;

const USE_HANDLERS: [Handler; 9] = [
    put_into_pot,
    need_open_window,
    eject_jukebox_disc,
    press_to_button,
    fuse_tnt,
    sit_down,
    go_to_bed,
    open_door,
    eat_cake,
];

const ITEM_HANDLERS: [Handler; 4] = [put_disc_into_jukebox, drop_egg, put_in_bucket, no_set_on_top];

struct Placement<'m> {
    pos: BlockPos,
    n: BlockPos,
    material: &'m Material,
}

type Restriction = fn(&InteractionContext<'_>, &Placement<'_>) -> bool;

const RESTRICTIONS: [Restriction; 4] = [
    restrict_planting,
    restrict_only_full_face,
    restrict_ladder,
    restrict_torch,
];

/// World state a click is resolved against.
pub struct PickatInput<'a> {
    /// Voxel source
    pub world: &'a dyn BlockAccess,
    /// Materials
    pub registry: &'a BlockRegistry,
    /// Acting player
    pub player: &'a PlayerView,
    /// Whether beds may be used
    pub is_night: bool,
    /// Seed for drop rolls
    pub seed: u64,
}

/// Resolves a click into the action it causes.
///
/// Never mutates anything.
///
/// # Errors
///
/// [`crate::WorldError::Validation`] when the click is malformed or not
/// allowed.
pub fn pickat_action(input: &PickatInput<'_>, event: &PickatEvent) -> WorldResult<WorldAction> {
    let pos = event.block_pos()?;
    let n = if event.create_block {
        event.normal()?
    } else {
        event.normal().unwrap_or_default()
    };
    let Some(block) = input.world.block_at(pos) else {
        return Err(ValidationError::ChunkNotLoaded.into());
    };
    let held = input.player.held.as_ref().filter(|h| h.count > 0);
    let ctx = InteractionContext {
        world: input.world,
        registry: input.registry,
        player: input.player,
        event,
        pos,
        n,
        material: input.registry.get(block.id),
        block,
        held,
        held_material: held.map(|h| input.registry.get(h.id)),
        is_night: input.is_night,
        seed: input.seed,
    };
    if ctx.player.game_mode == GameMode::Spectator {
        return Ok(ctx.action());
    }
    if !ctx.within_reach(pos) {
        return Err(ValidationError::TooFar.into());
    }

    if event.change_extra_data {
        return edit_sign(&ctx);
    }
    if event.destroy_block {
        return Ok(destroy(&ctx));
    }
    if event.clone_block {
        return Ok(clone_block(&ctx));
    }
    if event.create_block {
        return create(&ctx);
    }
    Ok(ctx.action())
}

// =============================================================================
// Top-level kinds
// =============================================================================

fn edit_sign(ctx: &InteractionContext<'_>) -> WorldResult<WorldAction> {
    let mut action = ctx.action();
    if !ctx.material.has_tag(Tag::Sign) {
        return Ok(action);
    }
    let text = ctx
        .event
        .extra_data
        .as_ref()
        .and_then(|e| e.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if text.chars().count() > MAX_SIGN_TEXT {
        return Err(ValidationError::SignTextTooLong.into());
    }
    let mut item = ctx.block.clone();
    item.set_extra("text", json!(text));
    item.set_extra("username", json!(ctx.player.username));
    action.add_block(ctx.pos, item, BlockAction::Modify);
    Ok(action)
}

fn destroy(ctx: &InteractionContext<'_>) -> WorldAction {
    let mut action = ctx.action();
    if ctx.block.is_air()
        || ctx.material.has_tag(Tag::Indestructible)
        || ctx.player.game_mode == GameMode::Adventure
        || ctx.block.extra("can_destroy").and_then(Value::as_bool) == Some(false)
    {
        return action;
    }
    if let Some(action) = remove_from_pot(ctx) {
        return action;
    }
    let mut set = DestroySet::new(ctx.world, ctx.registry, ctx.seed);
    set.add(&mut action, &ctx.block, ctx.pos, false);
    if ctx.material.destroy_to_down.is_empty() {
        set.add_plant_above(&mut action, ctx.pos);
    }
    action.decrement_instrument = ctx.held_material.is_some_and(|m| m.instrument.is_some());
    action
}

fn clone_block(ctx: &InteractionContext<'_>) -> WorldAction {
    let mut action = ctx.action();
    if !ctx.block.is_air() && ctx.player.game_mode.is_creative() {
        action.clone_block = Some(BlockItem::new(ctx.block.id));
    }
    action
}

fn create(ctx: &InteractionContext<'_>) -> WorldResult<WorldAction> {
    if ctx.block.is_air() {
        return Ok(ctx.action());
    }
    if !ctx.event.shift_key {
        for handler in USE_HANDLERS {
            if let Some(action) = handler(ctx)? {
                return Ok(action);
            }
        }
    }
    if ctx.player.game_mode == GameMode::Adventure {
        return Ok(ctx.action());
    }
    let (Some(held), Some(held_material)) = (ctx.held, ctx.held_material) else {
        return Ok(ctx.action());
    };
    if !ctx.registry.contains(held.id) {
        return Err(ValidationError::BlockNotFound.into());
    }
    for handler in ITEM_HANDLERS {
        if let Some(action) = handler(ctx)? {
            return Ok(action);
        }
    }
    if let Some(instrument) = held_material.instrument {
        return Ok(use_instrument(ctx, instrument));
    }
    if let Some(placed) = held_material.places.filter(|id| !ctx.registry.contains(*id)) {
        tracing::warn!("item {} places unregistered block {}", held.id, placed);
        return Err(ValidationError::BlockNotFound.into());
    }
    let material = held_material
        .places
        .map_or(held_material, |placed| ctx.registry.get(placed));
    if material.is_item || material.is_air() {
        return Ok(ctx.action());
    }
    place(ctx, held, material)
}

// =============================================================================
// Placement
// =============================================================================

fn place(
    ctx: &InteractionContext<'_>,
    held: &ItemStack,
    material: &Material,
) -> WorldResult<WorldAction> {
    let registry = ctx.registry;
    if ctx.n == BlockPos::default() {
        return Err(ValidationError::InvalidPosN.into());
    }

    let mut n = ctx.n;
    let pos = if registry.can_replace(&ctx.block, material.id) {
        if ctx.material.next_part.is_some()
            || ctx.material.previous_part.is_some()
            || material.has_tag(Tag::Ladder)
        {
            return Ok(ctx.action());
        }
        n = BlockPos::new(0, 1, 0);
        ctx.pos
    } else {
        if let Some(action) = increase_layering(ctx, material) {
            return Ok(action);
        }
        let pos = ctx.pos + n;
        match ctx.block_at(pos) {
            Some(target) if registry.can_replace(&target, material.id) => pos,
            _ => return Ok(ctx.action()),
        }
    };

    if !material.passable && Aabb::from_block(pos).intersects(&ctx.player.aabb) {
        return Ok(ctx.action());
    }

    let rotate = calc_rotate(ctx.player.rotate, n);
    let facing = BlockItem::AIR.with_rotate(rotate).cardinal();

    let mut parts = Vec::new();
    let mut cursor = pos;
    let mut next = material.next_part;
    while let Some(part) = next {
        if parts.len() >= MAX_PARTS {
            break;
        }
        cursor = cursor + part.offset;
        parts.push((cursor, part.id));
        next = registry.get(part.id).next_part;
    }
    let bed_head = material
        .has_tag(Tag::Bed)
        .then(|| pos + cardinal_offset(facing + 2));

    for target in parts.iter().map(|(p, _)| *p).chain(bed_head) {
        match ctx.block_at(target) {
            Some(found) if registry.can_replace(&found, material.id) => {}
            _ => return Err(ValidationError::BlockCannotBeReplace.into()),
        }
    }

    if material.layering.is_some() && n.y != 1 {
        return Ok(ctx.action());
    }
    if material.has_tag(Tag::PlaceOnlyToCeil) && n.y != -1 {
        return Ok(ctx.action());
    }
    let placement = Placement { pos, n, material };
    if RESTRICTIONS.iter().any(|restricted| restricted(ctx, &placement)) {
        return Ok(ctx.action());
    }

    let item = BlockItem {
        id: material.id,
        rotate: Some(rotate),
        power: held.power,
        entity_id: None,
        extra_data: held
            .extra_data
            .clone()
            .or_else(|| material.default_extra.clone()),
    };

    let mut action = ctx.action();
    if material.has_tag(Tag::Sign) {
        action.open_window = Some(json!({ "id": "frmEditSign", "pos": pos }));
    }
    action.add_block(pos, item, BlockAction::Create);
    for (part_pos, part_id) in parts {
        action.add_block(part_pos, BlockItem::new(part_id).with_rotate(rotate), BlockAction::Create);
    }
    if let Some(head) = bed_head {
        let head_rotate = Vec3::new(f64::from((facing + 2).rem_euclid(4)), rotate.y, 0.0);
        action.add_block(
            head,
            BlockItem::new(material.id)
                .with_rotate(head_rotate)
                .with_extra(json!({ "is_head": true })),
            BlockAction::Create,
        );
    }
    action.add_sound(material.name, "place", pos.bottom_center(), true);
    action.decrement = true;
    Ok(action)
}

fn increase_layering(ctx: &InteractionContext<'_>, material: &Material) -> Option<WorldAction> {
    let layering = material.layering?;
    if ctx.block.id != material.id || ctx.n.y != 1 {
        return None;
    }
    let layers = ctx.block.extra_int("layers").unwrap_or(1);
    if layers >= layering.max_layers {
        return None;
    }
    let mut item = ctx.block.clone();
    item.set_extra("layers", json!(layers + 1));
    let mut action = ctx.action();
    action.add_block(ctx.pos, item, BlockAction::Modify);
    action.add_sound(material.name, "place", ctx.pos.bottom_center(), true);
    action.decrement = true;
    Some(action)
}

fn restrict_planting(ctx: &InteractionContext<'_>, p: &Placement<'_>) -> bool {
    if !p.material.has_tag(Tag::Plant) {
        return false;
    }
    let soil = ctx.block_at(p.pos.down(1)).map_or(id::AIR, |b| b.id);
    if p.material.has_tag(Tag::NeedsFarmland) {
        soil != id::FARMLAND
    } else {
        !matches!(soil, id::GRASS_BLOCK | id::DIRT | id::FARMLAND)
    }
}

fn restrict_only_full_face(ctx: &InteractionContext<'_>, p: &Placement<'_>) -> bool {
    p.material.has_tag(Tag::OnlyFullFace)
        && !ctx.material_at(p.pos - p.n).is_some_and(Material::is_solid)
}

fn restrict_ladder(_ctx: &InteractionContext<'_>, p: &Placement<'_>) -> bool {
    p.material.has_tag(Tag::Ladder) && p.n.y != 0
}

fn restrict_torch(_ctx: &InteractionContext<'_>, p: &Placement<'_>) -> bool {
    p.material.has_tag(Tag::Torch) && p.n.y < 0
}

fn use_instrument(ctx: &InteractionContext<'_>, instrument: Instrument) -> WorldAction {
    let mut action = ctx.action();
    let open_above = ctx.block_at(ctx.pos.up(1)).is_some_and(|b| b.is_air());
    let change = match (instrument, ctx.block.id) {
        (Instrument::Shovel, id::GRASS_BLOCK) if open_above => {
            Some((BlockItem::new(id::DIRT_PATH), BlockAction::Replace))
        }
        (Instrument::Shovel, id::CAMPFIRE) if ctx.block.extra_flag("active") => {
            let mut item = ctx.block.clone();
            item.set_extra("active", json!(false));
            Some((item, BlockAction::Modify))
        }
        (Instrument::Hoe, id::GRASS_BLOCK | id::DIRT | id::DIRT_PATH) if open_above => {
            Some((BlockItem::new(id::FARMLAND), BlockAction::Replace))
        }
        _ => None,
    };
    if let Some((item, kind)) = change {
        let name = ctx.registry.get(item.id).name;
        action.add_block(ctx.pos, item, kind);
        action.add_sound(name, "place", ctx.pos.bottom_center(), false);
        action.decrement_instrument = true;
    }
    action
}

// =============================================================================
// Clicked-block handlers
// =============================================================================

fn remove_from_pot(ctx: &InteractionContext<'_>) -> Option<WorldAction> {
    if !ctx.material.has_tag(Tag::Pot) {
        return None;
    }
    let planted = ctx.block.extra_int("item").and_then(|v| u16::try_from(v).ok())?;
    let mut item = ctx.block.clone();
    item.remove_extra("item");
    let mut action = ctx.action();
    action.add_block(ctx.pos, item, BlockAction::Modify);
    action.add_drop(ctx.pos.bottom_center(), vec![ItemStack::new(planted, 1)], true);
    action.add_sound(ctx.material.name, "dig", ctx.pos.bottom_center(), true);
    Some(action)
}

fn put_into_pot(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    if !ctx.material.has_tag(Tag::Pot) || ctx.block.extra("item").is_some() {
        return Ok(None);
    }
    let Some(held) = ctx.held.filter(|_| ctx.held_has(Tag::CanPutIntoPot)) else {
        return Ok(None);
    };
    let mut item = ctx.block.clone();
    item.set_extra("item", json!(held.id));
    let mut action = ctx.action();
    action.add_block(ctx.pos, item, BlockAction::Modify);
    action.add_sound(ctx.material.name, "place", ctx.pos.bottom_center(), true);
    action.decrement = true;
    Ok(Some(action))
}

fn need_open_window(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    let Some(window) = ctx.material.window else {
        return Ok(None);
    };
    let mut action = ctx.action();
    action.open_window = Some(json!({ "id": window, "pos": ctx.pos, "block": ctx.block }));
    Ok(Some(action))
}

fn eject_jukebox_disc(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    if !ctx.material.has_tag(Tag::Jukebox) {
        return Ok(None);
    }
    let Some(disc) = ctx
        .block
        .extra("disc")
        .and_then(|d| serde_json::from_value::<ItemStack>(d.clone()).ok())
    else {
        return Ok(None);
    };
    let mut item = ctx.block.clone();
    item.remove_extra("disc");
    let mut action = ctx.action();
    action.add_block(ctx.pos, item, BlockAction::Modify);
    action.add_drop(ctx.pos.up(1).bottom_center(), vec![disc], true);
    action.stop_disc.push(ctx.pos);
    Ok(Some(action))
}

fn press_to_button(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    if !ctx.material.has_tag(Tag::Button) {
        return Ok(None);
    }
    let mut item = ctx.block.clone();
    item.set_extra("pressed", json!(!ctx.block.extra_flag("pressed")));
    let mut action = ctx.action();
    action.add_block(ctx.pos, item, BlockAction::Modify);
    action.add_sound(ctx.material.name, "click", ctx.pos.bottom_center(), false);
    Ok(Some(action))
}

fn fuse_tnt(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    let igniter = ctx
        .held_material
        .is_some_and(|m| m.instrument == Some(Instrument::Igniter));
    if !ctx.material.has_tag(Tag::Tnt) || !igniter {
        return Ok(None);
    }
    let mut action = ctx.action();
    action.fuse_tnt = Some(ctx.pos);
    action.add_sound(ctx.material.name, "fuse", ctx.pos.bottom_center(), false);
    action.decrement_instrument = true;
    Ok(Some(action))
}

fn sit_down(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    if !ctx.material.has_tag(Tag::Stairs) || ctx.held.is_some() {
        return Ok(None);
    }
    let free_above = ctx.block_at(ctx.pos.up(1)).is_some_and(|b| b.is_air());
    let seat = ctx.pos.bottom_center() + Vec3::new(0.0, 0.5, 0.0);
    if !free_above || ctx.player.pos.distance(seat) > SIT_DISTANCE {
        return Ok(None);
    }
    let mut action = ctx.action();
    action.sitting = Some(Sitting {
        pos: seat,
        rotate: Vec3::new(0.0, 0.0, f64::from(ctx.block.cardinal()) * FRAC_PI_2),
    });
    Ok(Some(action))
}

fn go_to_bed(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    if !ctx.material.has_tag(Tag::Bed) {
        return Ok(None);
    }
    if !ctx.is_night {
        return Err(ValidationError::NoTimeToSleep.into());
    }
    let mut action = ctx.action();
    action.add_sound(ctx.material.name, "sleep", ctx.pos.bottom_center(), false);
    Ok(Some(action))
}

fn open_door(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    if !ctx.material.has_tag(Tag::Door) {
        return Ok(None);
    }
    let opened = !ctx.block.extra_flag("opened");
    let mut action = ctx.action();
    let mut item = ctx.block.clone();
    item.set_extra("opened", json!(opened));
    action.add_block(ctx.pos, item, BlockAction::Modify);
    for part in [ctx.material.next_part, ctx.material.previous_part]
        .into_iter()
        .flatten()
    {
        let part_pos = ctx.pos + part.offset;
        if let Some(mut other) = ctx.block_at(part_pos).filter(|b| b.id == part.id) {
            other.set_extra("opened", json!(opened));
            action.add_block(part_pos, other, BlockAction::Modify);
        }
    }
    let sound = if opened { "open" } else { "close" };
    action.add_sound(ctx.material.name, sound, ctx.pos.bottom_center(), false);
    Ok(Some(action))
}

fn eat_cake(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    if !ctx.material.has_tag(Tag::Cake) {
        return Ok(None);
    }
    let pieces = ctx.block.extra_int("pieces").unwrap_or(6) - 1;
    let mut action = ctx.action();
    if pieces <= 0 {
        action.add_destroy(ctx.pos, ctx.block.id);
    } else {
        let mut item = ctx.block.clone();
        item.set_extra("pieces", json!(pieces));
        action.add_block(ctx.pos, item, BlockAction::Modify);
    }
    action.add_sound(ctx.material.name, "eat", ctx.pos.bottom_center(), false);
    Ok(Some(action))
}

// =============================================================================
// Held-item handlers
// =============================================================================

fn put_disc_into_jukebox(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    if !ctx.material.has_tag(Tag::Jukebox)
        || !ctx.held_has(Tag::Disc)
        || ctx.block.extra("disc").is_some()
    {
        return Ok(None);
    }
    let Some(held) = ctx.held else {
        return Ok(None);
    };
    let disc = ItemStack {
        count: 1,
        ..held.clone()
    };
    let mut item = ctx.block.clone();
    item.set_extra("disc", json!(disc));
    let mut action = ctx.action();
    action.add_block(ctx.pos, item, BlockAction::Modify);
    action.add_sound("music_disc", "play", ctx.pos.bottom_center(), false);
    action.decrement = true;
    Ok(Some(action))
}

fn drop_egg(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    let Some((kind, skin)) = ctx.held_material.and_then(|m| m.spawn_egg) else {
        return Ok(None);
    };
    let mut action = ctx.action();
    action.spawn_mob = Some(MobSpawn {
        kind: kind.to_string(),
        skin: skin.to_string(),
        pos: (ctx.pos + ctx.n).bottom_center(),
        rotate: Vec3::new(0.0, 0.0, ctx.player.rotate.z),
    });
    action.decrement = true;
    Ok(Some(action))
}

fn put_in_bucket(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    let empty_bucket = ctx.held.is_some_and(|h| h.id == id::BUCKET);
    let Some(filled) = ctx.material.fill_bucket.filter(|_| empty_bucket) else {
        return Ok(None);
    };
    let mut action = ctx.action();
    action.put_in_bucket(ItemStack::new(filled, 1))?;
    action.add_destroy(ctx.pos, ctx.block.id);
    action.add_sound("bucket", "fill", ctx.pos.bottom_center(), false);
    Ok(Some(action))
}

fn no_set_on_top(ctx: &InteractionContext<'_>) -> WorldResult<Option<WorldAction>> {
    if ctx.material.has_tag(Tag::NoSetOnTop) && ctx.n.y == 1 {
        return Ok(Some(ctx.action()));
    }
    Ok(None)
}
