//! Integration test for the world simulation.
//!
//! Drives a flat world through its public surface: intents, clicks,
//! deferred explosions and ticks. A store wrapper injects storage
//! failures and counts mob saves.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use strata_persistence::{
    DropItemRow, EntityRow, JournalStore, ModifyRow, NewEntity, NewWorld, PersistenceError,
    PersistenceResult, WorldRow, WorldStore,
};
use strata_procedural::{GeneratorConfig, InlineGeneration};
use strata_shared::{
    block_id, BlockAction, BlockItem, BlockPos, ChunkAddr, ItemStack, PacketName, PlayerId, Vec3,
};
use strata_world::actions::{MobSpawn, TNT_FUSE_TICKS};
use strata_world::config::MobConfig;
use strata_world::{
    GameMode, Intent, PacketLog, PickatEvent, RecordingConnection, TickPhase, ValidationError,
    World, WorldAction, WorldConfig, WorldError,
};

// =============================================================================
// Fault injection
// =============================================================================

#[derive(Default)]
struct Faults {
    /// Successful `block_set` calls left before every further one fails.
    block_set_budget: Option<usize>,
    save_entity_calls: usize,
}

struct FaultyStore {
    inner: JournalStore,
    faults: Arc<Mutex<Faults>>,
}

impl WorldStore for FaultyStore {
    fn get_world(&self, guid: &str) -> PersistenceResult<Option<WorldRow>> {
        self.inner.get_world(guid)
    }

    fn insert_world(&mut self, world: NewWorld) -> PersistenceResult<WorldRow> {
        self.inner.insert_world(world)
    }

    fn update_world_add_time(&mut self, world_id: u64, add_time: i64) -> PersistenceResult<()> {
        self.inner.update_world_add_time(world_id, add_time)
    }

    fn block_set(
        &mut self,
        world_id: u64,
        pos: BlockPos,
        item: &BlockItem,
        action: BlockAction,
    ) -> PersistenceResult<ModifyRow> {
        if let Some(left) = self.faults.lock().block_set_budget.as_mut() {
            if *left == 0 {
                return Err(PersistenceError::Injected(format!("block_set at {pos:?}")));
            }
            *left -= 1;
        }
        self.inner.block_set(world_id, pos, item, action)
    }

    fn latest_modify(&self, pos: BlockPos) -> PersistenceResult<Option<ModifyRow>> {
        self.inner.latest_modify(pos)
    }

    fn load_chunk_modifiers(&self, addr: ChunkAddr) -> PersistenceResult<Vec<ModifyRow>> {
        self.inner.load_chunk_modifiers(addr)
    }

    fn modified_chunk_addrs(&self) -> PersistenceResult<Vec<ChunkAddr>> {
        self.inner.modified_chunk_addrs()
    }

    fn create_entity(&mut self, entity: NewEntity) -> PersistenceResult<EntityRow> {
        self.inner.create_entity(entity)
    }

    fn save_entity(&mut self, entity: &EntityRow) -> PersistenceResult<()> {
        self.faults.lock().save_entity_calls += 1;
        self.inner.save_entity(entity)
    }

    fn set_entity_active(&mut self, entity_id: &str, active: bool) -> PersistenceResult<()> {
        self.inner.set_entity_active(entity_id, active)
    }

    fn load_entities(&self, addr: ChunkAddr) -> PersistenceResult<Vec<EntityRow>> {
        self.inner.load_entities(addr)
    }

    fn create_drop_item(
        &mut self,
        items: Vec<ItemStack>,
        pos: Vec3,
    ) -> PersistenceResult<DropItemRow> {
        self.inner.create_drop_item(items, pos)
    }

    fn delete_drop_item(&mut self, entity_id: &str) -> PersistenceResult<()> {
        self.inner.delete_drop_item(entity_id)
    }

    fn load_drop_items(&self, addr: ChunkAddr) -> PersistenceResult<Vec<DropItemRow>> {
        self.inner.load_drop_items(addr)
    }

    fn chunk_mobs_generated(&self, addr: ChunkAddr) -> PersistenceResult<bool> {
        self.inner.chunk_mobs_generated(addr)
    }

    fn set_chunk_mobs_generated(&mut self, addr: ChunkAddr) -> PersistenceResult<()> {
        self.inner.set_chunk_mobs_generated(addr)
    }

    fn begin(&mut self) -> PersistenceResult<()> {
        self.inner.begin()
    }

    fn commit(&mut self) -> PersistenceResult<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> PersistenceResult<()> {
        self.inner.rollback()
    }

    fn migrate(&mut self) -> PersistenceResult<usize> {
        self.inner.migrate()
    }

    fn schema_version(&self) -> PersistenceResult<u32> {
        self.inner.schema_version()
    }

    fn checkpoint(&mut self) -> PersistenceResult<()> {
        self.inner.checkpoint()
    }
}

// =============================================================================
// Helpers
// =============================================================================

const UP: BlockPos = BlockPos::new(0, 1, 0);

fn temp_world_dir() -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("test_world_sim_{id}"))
}

fn open_world(dir: &Path) -> (World, Arc<Mutex<Faults>>) {
    let config = WorldConfig {
        world_dir: dir.to_path_buf(),
        generator: GeneratorConfig::Flat { ground_level: 4 },
        default_render_dist: 2,
        max_y_margin: 1,
        allow_negative_y: false,
        mobs: MobConfig {
            save_interval_ticks: 5,
            natural_spawn: false,
        },
        ..WorldConfig::default()
    };
    let faults = Arc::new(Mutex::new(Faults::default()));
    let store = FaultyStore {
        inner: JournalStore::open(dir).unwrap(),
        faults: Arc::clone(&faults),
    };
    let world = World::open(config, Box::new(store), Box::new(InlineGeneration::new())).unwrap();
    (world, faults)
}

/// Connects a player at spawn and ticks until the spawn chunk is ready.
fn join(world: &mut World, player_id: PlayerId, game_mode: GameMode) -> PacketLog {
    let (conn, log) = RecordingConnection::new(player_id);
    world
        .sender()
        .send(Intent::Join {
            player_id,
            username: format!("player{player_id}"),
            connection: Box::new(conn),
            game_mode,
        })
        .unwrap();
    for _ in 0..4 {
        world.tick();
    }
    assert!(world.chunks().get(ChunkAddr::new(0, 0, 0)).unwrap().is_ready());
    log
}

fn hold(world: &mut World, player_id: PlayerId, item: u16, count: u32) {
    world
        .player_mut(player_id)
        .unwrap()
        .inventory
        .set_current(Some(ItemStack::new(item, count)));
}

fn use_on(pos: BlockPos, n: BlockPos) -> PickatEvent {
    PickatEvent {
        pos: pos.to_vec3(),
        n: n.to_vec3(),
        create_block: true,
        ..PickatEvent::default()
    }
}

fn dig(pos: BlockPos) -> PickatEvent {
    PickatEvent {
        pos: pos.to_vec3(),
        destroy_block: true,
        ..PickatEvent::default()
    }
}

fn block_id_at(world: &World, pos: BlockPos) -> u16 {
    world.chunks().get_block(pos).unwrap().id
}

// =============================================================================
// Block modifications
// =============================================================================

#[test]
fn test_placed_block_is_persisted_then_broadcast() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    let log = join(&mut world, 1, GameMode::Survival);
    hold(&mut world, 1, block_id::STONE, 5);
    let _ = log.take();

    world.pickat(1, &use_on(BlockPos::new(2, 3, 2), UP)).unwrap();

    let pos = BlockPos::new(2, 4, 2);
    let row = world.store().latest_modify(pos).unwrap().unwrap();
    assert_eq!(row.block_id, block_id::STONE);
    // Stone cannot rotate; the orientation is dropped before persisting.
    assert!(row.item().rotate.is_none());
    assert_eq!(block_id_at(&world, pos), block_id::STONE);
    assert!(world.tracker().has_modifiers(pos.chunk_addr()));

    let player = world.player(1).unwrap();
    assert_eq!(player.inventory.current().unwrap().count, 4);
    assert_eq!(log.named(PacketName::BlockSet).len(), 1);
    assert_eq!(log.named(PacketName::InventoryState).len(), 1);
    // The placing client already played the sound locally.
    assert!(log.named(PacketName::PlaySound).is_empty());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_failed_override_rolls_back_whole_action() {
    let dir = temp_world_dir();
    let (mut world, faults) = open_world(&dir);
    let log = join(&mut world, 1, GameMode::Survival);
    let _ = log.take();

    let (first, second) = (BlockPos::new(3, 4, 3), BlockPos::new(3, 4, 4));
    let mut action = WorldAction::new(None);
    action.add_block(first, BlockItem::new(block_id::STONE), BlockAction::Create);
    action.add_block(second, BlockItem::new(block_id::STONE), BlockAction::Create);
    action.add_drop(first.bottom_center(), vec![ItemStack::new(block_id::DIRT, 1)], true);
    faults.lock().block_set_budget = Some(1);

    let err = world.apply_actions(Some(1), action).unwrap_err();
    assert!(matches!(err, WorldError::Persistence(_)));

    assert!(world.store().latest_modify(first).unwrap().is_none());
    assert!(world.store().latest_modify(second).unwrap().is_none());
    assert_eq!(block_id_at(&world, first), block_id::AIR);
    assert!(!world.tracker().has_modifiers(first.chunk_addr()));
    assert!(world.drop_items().is_empty());
    assert!(log.named(PacketName::BlockSet).is_empty());

    // The store recovers once the fault is gone.
    faults.lock().block_set_budget = None;
    let mut retry = WorldAction::new(None);
    retry.add_block(first, BlockItem::new(block_id::STONE), BlockAction::Create);
    retry.add_block(second, BlockItem::new(block_id::STONE), BlockAction::Create);
    world.apply_actions(Some(1), retry).unwrap();
    assert_eq!(block_id_at(&world, second), block_id::STONE);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_unknown_block_id_is_rejected() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    let _log = join(&mut world, 1, GameMode::Survival);
    hold(&mut world, 1, 9_999, 1);

    let pos = BlockPos::new(2, 4, 2);
    let err = world.pickat(1, &use_on(BlockPos::new(2, 3, 2), UP)).unwrap_err();
    assert!(matches!(err, WorldError::Validation(ValidationError::BlockNotFound)));
    assert!(world.store().latest_modify(pos).unwrap().is_none());
    assert_eq!(block_id_at(&world, pos), block_id::AIR);
    assert_eq!(world.player(1).unwrap().inventory.current().unwrap().count, 1);

    // Actions built elsewhere are checked too, before anything is written.
    let mut action = WorldAction::new(None);
    action.add_block(pos.up(1), BlockItem::new(block_id::STONE), BlockAction::Create);
    action.add_block(pos, BlockItem::new(9_999), BlockAction::Create);
    let err = world.apply_actions(None, action).unwrap_err();
    assert!(matches!(err, WorldError::Validation(ValidationError::BlockNotFound)));
    assert!(world.store().latest_modify(pos.up(1)).unwrap().is_none());
    assert_eq!(block_id_at(&world, pos.up(1)), block_id::AIR);
    assert!(!world.tracker().has_modifiers(pos.chunk_addr()));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_growth_computed_before_destroy_is_dropped() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    let _log = join(&mut world, 1, GameMode::Survival);

    let (dug, kept) = (BlockPos::new(2, 4, 2), BlockPos::new(3, 4, 2));
    let mut plant = WorldAction::new(None);
    plant.add_block(dug, BlockItem::new(block_id::WHEAT), BlockAction::Create);
    plant.add_block(kept, BlockItem::new(block_id::WHEAT), BlockAction::Create);
    world.apply_actions(None, plant).unwrap();

    let interval = world
        .registry()
        .get(block_id::WHEAT)
        .ticking
        .unwrap()
        .interval;
    for _ in 1..interval {
        world.tick();
    }
    // The destroy arrives in the tick that also grows the wheat.
    world
        .sender()
        .send(Intent::Pickat {
            player_id: 1,
            event: dig(dug),
        })
        .unwrap();
    world.tick();

    assert_eq!(block_id_at(&world, dug), block_id::AIR);
    let row = world.store().latest_modify(dug).unwrap().unwrap();
    assert_eq!(row.block_id, block_id::AIR);

    let grown = world.chunks().get_block(kept).unwrap();
    assert_eq!(grown.extra_int("stage"), Some(1));
    let row = world.store().latest_modify(kept).unwrap().unwrap();
    assert_eq!(row.item().extra_int("stage"), Some(1));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_bed_placed_and_destroyed_as_pair() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    let _log = join(&mut world, 1, GameMode::Survival);
    world
        .player_mut(1)
        .unwrap()
        .move_to(Vec3::new(6.5, 5.0, 3.5), Vec3::new(0.0, 0.0, PI));
    hold(&mut world, 1, block_id::RED_BED, 1);

    world.pickat(1, &use_on(BlockPos::new(6, 3, 6), UP)).unwrap();
    let (foot, head) = (BlockPos::new(6, 4, 6), BlockPos::new(6, 4, 7));
    assert_eq!(block_id_at(&world, foot), block_id::RED_BED);
    assert_eq!(block_id_at(&world, head), block_id::RED_BED);
    assert!(world.player(1).unwrap().inventory.current().is_none());

    world.pickat(1, &dig(head)).unwrap();
    assert_eq!(block_id_at(&world, foot), block_id::AIR);
    assert_eq!(block_id_at(&world, head), block_id::AIR);
    for pos in [foot, head] {
        let row = world.store().latest_modify(pos).unwrap().unwrap();
        assert_eq!(row.block_id, block_id::AIR);
    }
    assert_eq!(world.drop_items().len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_lit_tnt_explodes_after_fuse() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    let log = join(&mut world, 1, GameMode::Survival);

    let tnt = BlockPos::new(4, 4, 4);
    let mut place = WorldAction::new(None);
    place.add_block(tnt, BlockItem::new(block_id::TNT), BlockAction::Create);
    world.apply_actions(None, place).unwrap();
    hold(&mut world, 1, block_id::FLINT_AND_STEEL, 1);

    world.pickat(1, &use_on(tnt, UP)).unwrap();
    assert_eq!(world.pending_actions(), 1);
    assert_eq!(block_id_at(&world, tnt), block_id::TNT);

    for _ in 0..=TNT_FUSE_TICKS {
        world.tick();
    }
    assert_eq!(world.pending_actions(), 0);
    assert_eq!(block_id_at(&world, tnt), block_id::AIR);
    assert_eq!(block_id_at(&world, tnt.up(-1)), block_id::AIR);
    let row = world.store().latest_modify(tnt.up(-1)).unwrap().unwrap();
    assert_eq!(row.block_id, block_id::AIR);
    assert_eq!(log.named(PacketName::ParticleExplosion).len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_overrides_survive_reopen() {
    let dir = temp_world_dir();
    let pos = BlockPos::new(2, 4, 2);
    {
        let (mut world, _) = open_world(&dir);
        let _log = join(&mut world, 1, GameMode::Creative);
        hold(&mut world, 1, block_id::GLASS, 1);
        world.pickat(1, &use_on(BlockPos::new(2, 3, 2), UP)).unwrap();
        // Creative placement keeps the stack.
        assert_eq!(world.player(1).unwrap().inventory.current().unwrap().count, 1);
        world.shutdown().unwrap();
    }

    let (mut world, _) = open_world(&dir);
    assert!(world.tracker().has_modifiers(pos.chunk_addr()));
    let _log = join(&mut world, 1, GameMode::Creative);
    assert_eq!(block_id_at(&world, pos), block_id::GLASS);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_spectator_cannot_modify() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    let _log = join(&mut world, 1, GameMode::Spectator);

    world.pickat(1, &dig(BlockPos::new(1, 3, 1))).unwrap();
    assert_eq!(block_id_at(&world, BlockPos::new(1, 3, 1)), block_id::GRASS_BLOCK);
    assert!(world.store().latest_modify(BlockPos::new(1, 3, 1)).unwrap().is_none());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_rejected_click_reports_error_code() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    let log = join(&mut world, 1, GameMode::Survival);
    let _ = log.take();

    let event = PickatEvent {
        pos: Vec3::new(1.5, 3.0, 1.0),
        destroy_block: true,
        ..PickatEvent::default()
    };
    world
        .sender()
        .send(Intent::Pickat {
            player_id: 1,
            event,
        })
        .unwrap();
    world.tick();

    let errors = log.named(PacketName::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].data.to_string().contains("error_invalid_block_pos"));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_click_in_unloaded_chunk_reports_error_code() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    let log = join(&mut world, 1, GameMode::Survival);
    let _ = log.take();

    world
        .sender()
        .send(Intent::Pickat {
            player_id: 1,
            event: dig(BlockPos::new(400, 3, 400)),
        })
        .unwrap();
    world.tick();

    let errors = log.named(PacketName::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].data.to_string().contains("error_chunk_not_loaded"));

    std::fs::remove_dir_all(&dir).ok();
}

// =============================================================================
// Mobs, drops and players
// =============================================================================

#[test]
fn test_killed_mob_is_unloaded() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    let log = join(&mut world, 1, GameMode::Survival);

    let mut action = WorldAction::new(None);
    action.spawn_mob = Some(MobSpawn {
        kind: "chicken".into(),
        skin: "base".into(),
        pos: Vec3::new(2.5, 4.0, 2.5),
        rotate: Vec3::ZERO,
    });
    world.apply_actions(None, action).unwrap();
    let id = world.mobs().ids()[0];
    let home = ChunkAddr::new(0, 0, 0);

    let tx = world.sender();
    for _ in 0..4 {
        tx.send(Intent::PunchMob {
            player_id: 1,
            mob_id: id,
            button: 1,
        })
        .unwrap();
    }
    world.tick();

    assert!(world.mobs().is_empty());
    assert!(world.chunks().get(home).unwrap().mob_ids().is_empty());
    assert!(world.store().load_entities(home).unwrap().is_empty());
    assert_eq!(log.named(PacketName::MobDelete).len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_mob_saves_are_throttled() {
    let dir = temp_world_dir();
    let (mut world, faults) = open_world(&dir);

    let mut action = WorldAction::new(None);
    action.spawn_mob = Some(MobSpawn {
        kind: "cow".into(),
        skin: "brown".into(),
        pos: Vec3::new(8.5, 4.0, 8.5),
        rotate: Vec3::ZERO,
    });
    world.apply_actions(None, action).unwrap();
    assert_eq!(world.mobs().len(), 1);

    faults.lock().save_entity_calls = 0;
    for _ in 0..20 {
        world.tick();
    }
    assert_eq!(faults.lock().save_entity_calls, 4);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_moved_mob_follows_its_chunk() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    let log = join(&mut world, 1, GameMode::Survival);

    let mut action = WorldAction::new(None);
    action.spawn_mob = Some(MobSpawn {
        kind: "sheep".into(),
        skin: "black".into(),
        pos: Vec3::new(8.5, 4.0, 8.5),
        rotate: Vec3::ZERO,
    });
    world.apply_actions(None, action).unwrap();
    let id = world.mobs().ids()[0];
    let (home, next) = (ChunkAddr::new(0, 0, 0), ChunkAddr::new(1, 0, 0));
    assert_eq!(world.chunks().get(home).unwrap().mob_ids(), vec![id]);
    assert_eq!(log.named(PacketName::MobAdd).len(), 1);

    world.move_mob(id, Vec3::new(20.5, 4.0, 8.5), Vec3::ZERO).unwrap();
    assert!(world.chunks().get(home).unwrap().mob_ids().is_empty());
    assert_eq!(world.chunks().get(next).unwrap().mob_ids(), vec![id]);

    // Far outside the loaded area: saved and unloaded.
    let far = Vec3::new(500.5, 4.0, 8.5);
    world.move_mob(id, far, Vec3::ZERO).unwrap();
    assert!(world.mobs().is_empty());
    let stored = world.store().load_entities(ChunkAddr::from_world(far)).unwrap();
    assert_eq!(stored.len(), 1);
    world.tick();
    assert_eq!(log.named(PacketName::MobDelete).len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_nearby_drop_is_collected() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    let log = join(&mut world, 1, GameMode::Survival);
    let _ = log.take();

    let spawn = world.info().pos_spawn;
    let mut action = WorldAction::new(None);
    action.add_drop(spawn, vec![ItemStack::new(block_id::DIRT, 3)], false);
    world.apply_actions(None, action).unwrap();
    assert_eq!(world.drop_items().len(), 1);
    assert_eq!(log.named(PacketName::DropItemAdded).len(), 1);

    world.tick();
    assert!(world.drop_items().is_empty());
    assert_eq!(world.player(1).unwrap().inventory.count(block_id::DIRT), 3);
    let addr = ChunkAddr::from_world(spawn);
    assert!(world.store().load_drop_items(addr).unwrap().is_empty());
    assert_eq!(log.named(PacketName::DropItemDeleted).len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_chat_reaches_every_player() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    let first = join(&mut world, 1, GameMode::Survival);
    let second = join(&mut world, 2, GameMode::Survival);

    world
        .sender()
        .send(Intent::Chat {
            player_id: 2,
            text: "hello".into(),
        })
        .unwrap();
    world.tick();

    for log in [&first, &second] {
        let lines = log.named(PacketName::ChatMessage);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].data["from"], "player2");
        assert_eq!(lines[0].data["text"], "hello");
    }

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_tick_runs_phases_in_order() {
    let dir = temp_world_dir();
    let (mut world, _) = open_world(&dir);
    world.tick();

    let order: Vec<TickPhase> = world.stats().last_phases.iter().map(|(p, _)| *p).collect();
    assert_eq!(order, TickPhase::ALL.to_vec());
    assert_eq!(world.tick_number(), 1);

    std::fs::remove_dir_all(&dir).ok();
}
