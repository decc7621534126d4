//! Integration test for the journaled world store.
//!
//! Covers durability across reopen, transactions, migrations and the
//! override queries the simulation relies on.

use std::path::PathBuf;

use serde_json::json;
use strata_persistence::{
    Indicators, JournalStore, Migration, NewEntity, NewWorld, PersistenceError, Tables,
    WorldStore, MIGRATIONS,
};
use strata_shared::{block_id, BlockAction, BlockItem, BlockPos, ChunkAddr, ItemStack, Vec3};

fn temp_store_dir() -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("test_store_{id}"))
}

fn new_world() -> NewWorld {
    NewWorld {
        guid: "test-world".to_string(),
        title: "Test".to_string(),
        seed: "seed".to_string(),
        generator: json!({ "id": "flat" }),
        pos_spawn: Vec3::new(0.0, 10.0, 0.0),
    }
}

#[test]
fn test_read_your_write() {
    let dir = temp_store_dir();
    let mut store = JournalStore::open(&dir).unwrap();
    let world = store.insert_world(new_world()).unwrap();

    let pos = BlockPos::new(3, 7, -2);
    let writes = [
        BlockItem::new(block_id::STONE),
        BlockItem::new(block_id::OAK_LOG).with_rotate(Vec3::new(1.0, 0.0, 0.0)),
        BlockItem::AIR,
        BlockItem::new(block_id::CHEST).with_extra(json!({})),
    ];
    for item in &writes {
        store.block_set(world.id, pos, item, BlockAction::Create).unwrap();
        let latest = store.latest_modify(pos).unwrap().unwrap();
        // Empty extra state is normalized away.
        let mut expected = item.clone();
        if expected.id == block_id::CHEST {
            expected.extra_data = None;
        }
        assert_eq!(latest.item(), expected);
    }

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_modify_updates_latest_row() {
    let dir = temp_store_dir();
    let mut store = JournalStore::open(&dir).unwrap();
    let pos = BlockPos::new(0, 0, 0);

    let first = store
        .block_set(1, pos, &BlockItem::new(block_id::OAK_DOOR), BlockAction::Create)
        .unwrap();
    let opened = BlockItem::new(block_id::OAK_DOOR).with_extra(json!({ "opened": true }));
    let second = store.block_set(1, pos, &opened, BlockAction::Modify).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(store.tables().world_modify.len(), 1);

    let third = store
        .block_set(1, pos, &BlockItem::AIR, BlockAction::Destroy)
        .unwrap();
    assert!(third.id > second.id);
    assert!(third.params.is_none());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_reopen_replays_journal() {
    let dir = temp_store_dir();
    let pos = BlockPos::new(20, 50, -1);
    {
        let mut store = JournalStore::open(&dir).unwrap();
        store.insert_world(new_world()).unwrap();
        store
            .block_set(1, pos, &BlockItem::new(block_id::GLASS), BlockAction::Create)
            .unwrap();
    }
    {
        let store = JournalStore::open(&dir).unwrap();
        assert!(store.get_world("test-world").unwrap().is_some());
        assert_eq!(store.latest_modify(pos).unwrap().unwrap().block_id, block_id::GLASS);
        assert_eq!(store.modified_chunk_addrs().unwrap(), vec![ChunkAddr::new(1, 1, -1)]);
    }
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_checkpoint_then_reopen_is_identical() {
    let dir = temp_store_dir();
    let before: Tables;
    {
        let mut store = JournalStore::open(&dir).unwrap();
        store.migrate().unwrap();
        store.insert_world(new_world()).unwrap();
        for x in 0..40 {
            store
                .block_set(1, BlockPos::new(x, 1, 1), &BlockItem::new(block_id::DIRT), BlockAction::Create)
                .unwrap();
        }
        store.checkpoint().unwrap();
        store
            .block_set(1, BlockPos::new(0, 2, 0), &BlockItem::new(block_id::SAND), BlockAction::Create)
            .unwrap();
        before = store.tables().clone();
    }
    {
        let store = JournalStore::open(&dir).unwrap();
        assert_eq!(store.tables(), &before);
    }
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_rollback_restores_tables() {
    let dir = temp_store_dir();
    let mut store = JournalStore::open(&dir).unwrap();
    let pos = BlockPos::new(1, 1, 1);
    store
        .block_set(1, pos, &BlockItem::new(block_id::STONE), BlockAction::Create)
        .unwrap();
    let before = store.tables().clone();

    store.begin().unwrap();
    store
        .block_set(1, pos, &BlockItem::AIR, BlockAction::Destroy)
        .unwrap();
    store
        .block_set(1, BlockPos::new(100, 0, 0), &BlockItem::new(block_id::DIRT), BlockAction::Create)
        .unwrap();
    store.rollback().unwrap();

    assert_eq!(store.tables().world_modify, before.world_modify);
    assert_eq!(store.latest_modify(pos).unwrap().unwrap().block_id, block_id::STONE);
    assert_eq!(store.modified_chunk_addrs().unwrap().len(), 1);
    drop(store);

    // Rolled back work never comes back on reopen.
    let store = JournalStore::open(&dir).unwrap();
    assert_eq!(store.tables().world_modify, before.world_modify);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_transaction_misuse() {
    let dir = temp_store_dir();
    let mut store = JournalStore::open(&dir).unwrap();
    assert!(matches!(store.commit(), Err(PersistenceError::Transaction(_))));
    store.begin().unwrap();
    assert!(store.begin().is_err());
    assert!(store.checkpoint().is_err());
    store.rollback().unwrap();
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_migrations_are_idempotent() {
    let dir = temp_store_dir();
    let mut store = JournalStore::open(&dir).unwrap();
    let applied = store.migrate().unwrap();
    assert_eq!(applied, MIGRATIONS.len());
    let version = store.schema_version().unwrap();
    let tables = store.tables().clone();

    assert_eq!(store.migrate().unwrap(), 0);
    assert_eq!(store.schema_version().unwrap(), version);
    assert_eq!(store.tables(), &tables);
    drop(store);

    let mut store = JournalStore::open(&dir).unwrap();
    assert_eq!(store.schema_version().unwrap(), version);
    assert_eq!(store.migrate().unwrap(), 0);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_migration_rewrites_legacy_rows() {
    let dir = temp_store_dir();
    let mut store = JournalStore::open(&dir).unwrap();
    let pos = BlockPos::new(4, 4, 4);
    store
        .block_set(1, pos, &BlockItem::new(block_id::LEGACY_SIGN), BlockAction::Create)
        .unwrap();
    store
        .block_set(1, pos.up(1), &BlockItem::new(block_id::OAK_SAPLING), BlockAction::Create)
        .unwrap();
    store.migrate().unwrap();

    assert_eq!(store.latest_modify(pos).unwrap().unwrap().block_id, block_id::OAK_SIGN);
    let sapling = store.latest_modify(pos.up(1)).unwrap().unwrap().item();
    assert_eq!(sapling.extra_int("stage"), Some(0));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_failing_migration_is_fatal_and_not_recorded() {
    fn broken(_: &mut Tables) -> Result<(), String> {
        Err("boom".to_string())
    }
    let dir = temp_store_dir();
    let mut store = JournalStore::open(&dir).unwrap();
    let list = [Migration {
        version: 99,
        name: "broken",
        apply: broken,
    }];
    let err = store.apply_migrations(&list).unwrap_err();
    assert!(matches!(err, PersistenceError::Migration { version: 99, .. }));
    assert_eq!(store.schema_version().unwrap(), 0);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_entity_lifecycle() {
    let dir = temp_store_dir();
    let mut store = JournalStore::open(&dir).unwrap();
    let mut row = store
        .create_entity(NewEntity {
            kind: "chicken".to_string(),
            skin: "base".to_string(),
            pos: Vec3::new(1.5, 2.0, 3.5),
            rotate: Vec3::ZERO,
            indicators: Indicators::default(),
            extra_data: json!({ "is_alive": true }),
        })
        .unwrap();
    assert!(row.is_active);
    assert_eq!(store.load_entities(ChunkAddr::new(0, 0, 0)).unwrap().len(), 1);

    row.pos = Vec3::new(17.0, 2.0, 3.0);
    store.save_entity(&row).unwrap();
    assert!(store.load_entities(ChunkAddr::new(0, 0, 0)).unwrap().is_empty());
    assert_eq!(store.load_entities(ChunkAddr::new(1, 0, 0)).unwrap().len(), 1);

    store.set_entity_active(&row.entity_id, false).unwrap();
    assert!(store.load_entities(ChunkAddr::new(1, 0, 0)).unwrap().is_empty());
    assert!(store.set_entity_active("missing", false).is_err());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_drop_item_soft_delete() {
    let dir = temp_store_dir();
    let mut store = JournalStore::open(&dir).unwrap();
    let row = store
        .create_drop_item(vec![ItemStack::new(block_id::DIRT, 1)], Vec3::new(0.5, 1.0, 0.5))
        .unwrap();
    assert_eq!(store.load_drop_items(ChunkAddr::new(0, 0, 0)).unwrap().len(), 1);
    store.delete_drop_item(&row.entity_id).unwrap();
    assert!(store.load_drop_items(ChunkAddr::new(0, 0, 0)).unwrap().is_empty());
    assert!(store.tables().drop_item_by_uuid(&row.entity_id).unwrap().is_deleted);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_chunk_mobs_generated_flag() {
    let dir = temp_store_dir();
    let addr = ChunkAddr::new(-3, 0, 8);
    {
        let mut store = JournalStore::open(&dir).unwrap();
        assert!(!store.chunk_mobs_generated(addr).unwrap());
        store.set_chunk_mobs_generated(addr).unwrap();
        store.set_chunk_mobs_generated(addr).unwrap();
    }
    let store = JournalStore::open(&dir).unwrap();
    assert!(store.chunk_mobs_generated(addr).unwrap());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_world_add_time() {
    let dir = temp_store_dir();
    let mut store = JournalStore::open(&dir).unwrap();
    let world = store.insert_world(new_world()).unwrap();
    assert_eq!(world.add_time, 7_000);
    store.update_world_add_time(world.id, 12_000).unwrap();
    assert_eq!(store.get_world("test-world").unwrap().unwrap().add_time, 12_000);
    assert!(store.update_world_add_time(999, 0).is_err());
    std::fs::remove_dir_all(&dir).ok();
}
