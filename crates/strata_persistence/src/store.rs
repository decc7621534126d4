//! # World Store
//!
//! The narrow storage contract consumed by the simulation, and its
//! journaled implementation.
//!
//! ## Files
//!
//! ```text
//! <dir>/world.snapshot   LZ4(JSON(Tables)), written at checkpoint
//! <dir>/world.journal    write-ahead journal since the last checkpoint
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde_json::Value;
use strata_shared::constants::DEFAULT_ADD_TIME;
use strata_shared::{BlockAction, BlockItem, BlockPos, ChunkAddr, ItemStack, Vec3};
use uuid::Uuid;

use crate::error::{PersistenceError, PersistenceResult};
use crate::migrations::{Migration, MIGRATIONS};
use crate::tables::{
    DropItemRow, EntityRow, Indicators, JournalOp, ModifyRow, Tables, Undo, WorldRow,
};
use crate::wal::WriteAheadLog;

const SNAPSHOT_FILE: &str = "world.snapshot";
const JOURNAL_FILE: &str = "world.journal";

/// Fields of a world created on first start.
#[derive(Clone, Debug)]
pub struct NewWorld {
    /// Public world identifier
    pub guid: String,
    /// Display title
    pub title: String,
    /// Generation seed phrase
    pub seed: String,
    /// Generator configuration
    pub generator: Value,
    /// Spawn point
    pub pos_spawn: Vec3,
}

/// Fields of a mob created at runtime.
#[derive(Clone, Debug)]
pub struct NewEntity {
    /// Mob type tag
    pub kind: String,
    /// Skin name
    pub skin: String,
    /// Spawn position
    pub pos: Vec3,
    /// Initial rotation
    pub rotate: Vec3,
    /// Initial indicators
    pub indicators: Indicators,
    /// Initial state
    pub extra_data: Value,
}

/// Storage contract of the world simulation.
///
/// Every call completes before it returns; the caller applies the dependent
/// in-memory change only after `Ok`.
pub trait WorldStore: Send {
    /// World row by guid.
    fn get_world(&self, guid: &str) -> PersistenceResult<Option<WorldRow>>;

    /// Inserts a world row.
    fn insert_world(&mut self, world: NewWorld) -> PersistenceResult<WorldRow>;

    /// Stores a new calendar offset.
    fn update_world_add_time(&mut self, world_id: u64, add_time: i64) -> PersistenceResult<()>;

    /// Persists a voxel override.
    ///
    /// `Modify` updates the latest row for the position when one exists;
    /// everything else inserts a new row that supersedes older ones.
    fn block_set(
        &mut self,
        world_id: u64,
        pos: BlockPos,
        item: &BlockItem,
        action: BlockAction,
    ) -> PersistenceResult<ModifyRow>;

    /// Authoritative override for a position.
    fn latest_modify(&self, pos: BlockPos) -> PersistenceResult<Option<ModifyRow>>;

    /// Authoritative overrides inside a chunk.
    fn load_chunk_modifiers(&self, addr: ChunkAddr) -> PersistenceResult<Vec<ModifyRow>>;

    /// Every chunk address holding at least one override.
    fn modified_chunk_addrs(&self) -> PersistenceResult<Vec<ChunkAddr>>;

    /// Inserts an active mob with a fresh entity id.
    fn create_entity(&mut self, entity: NewEntity) -> PersistenceResult<EntityRow>;

    /// Overwrites a mob row identified by its entity id.
    fn save_entity(&mut self, entity: &EntityRow) -> PersistenceResult<()>;

    /// Sets the soft-delete flag of a mob.
    fn set_entity_active(&mut self, entity_id: &str, active: bool) -> PersistenceResult<()>;

    /// Active mobs inside a chunk.
    fn load_entities(&self, addr: ChunkAddr) -> PersistenceResult<Vec<EntityRow>>;

    /// Inserts a drop item with a fresh entity id.
    fn create_drop_item(&mut self, items: Vec<ItemStack>, pos: Vec3)
        -> PersistenceResult<DropItemRow>;

    /// Soft-deletes a drop item.
    fn delete_drop_item(&mut self, entity_id: &str) -> PersistenceResult<()>;

    /// Live drop items inside a chunk.
    fn load_drop_items(&self, addr: ChunkAddr) -> PersistenceResult<Vec<DropItemRow>>;

    /// Returns true once mobs were generated for the chunk.
    fn chunk_mobs_generated(&self, addr: ChunkAddr) -> PersistenceResult<bool>;

    /// Records that mobs were generated for the chunk.
    fn set_chunk_mobs_generated(&mut self, addr: ChunkAddr) -> PersistenceResult<()>;

    /// Opens a transaction.
    fn begin(&mut self) -> PersistenceResult<()>;

    /// Commits the open transaction.
    fn commit(&mut self) -> PersistenceResult<()>;

    /// Discards the open transaction.
    fn rollback(&mut self) -> PersistenceResult<()>;

    /// Applies pending migrations; returns how many ran.
    fn migrate(&mut self) -> PersistenceResult<usize>;

    /// Last applied migration version.
    fn schema_version(&self) -> PersistenceResult<u32>;

    /// Writes a snapshot and truncates the journal.
    fn checkpoint(&mut self) -> PersistenceResult<()>;
}

/// [`WorldStore`] backed by in-memory tables and a write-ahead journal.
pub struct JournalStore {
    dir: PathBuf,
    tables: Tables,
    wal: WriteAheadLog,
    undo: Option<Vec<Undo>>,
}

impl JournalStore {
    /// Opens (or creates) the store in `dir`.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot or journal cannot be read.
    pub fn open(dir: impl AsRef<Path>) -> PersistenceResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut tables = Self::load_snapshot(&dir.join(SNAPSHOT_FILE))?;
        tables.rebuild_indexes();

        let (wal, recovery) = WriteAheadLog::open(dir.join(JOURNAL_FILE))?;
        let replayed = recovery.committed.len();
        for payload in recovery.committed {
            let op: JournalOp = serde_json::from_slice(&payload)?;
            tables.apply(op);
        }

        tracing::info!(
            "store opened at {}: {} journal records replayed, schema version {}",
            dir.display(),
            replayed,
            tables.version
        );

        Ok(Self {
            dir,
            tables,
            wal,
            undo: None,
        })
    }

    /// Read access to the raw tables.
    #[must_use]
    pub const fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Applies the given migrations above the stored version.
    ///
    /// # Errors
    ///
    /// The first failing migration is rolled back and returned; the caller
    /// must not serve the world afterwards.
    pub fn apply_migrations(&mut self, migrations: &[Migration]) -> PersistenceResult<usize> {
        let mut applied = 0;
        for migration in migrations {
            if migration.version <= self.tables.version {
                continue;
            }
            let mut next = self.tables.clone();
            if let Err(reason) = (migration.apply)(&mut next) {
                return Err(PersistenceError::Migration {
                    version: migration.version,
                    name: migration.name,
                    reason,
                });
            }
            next.version = migration.version;

            self.begin()?;
            let written = self
                .write(JournalOp::ReplaceAll(Box::new(next)))
                .and_then(|()| self.write(JournalOp::SetVersion(migration.version)));
            if let Err(err) = written.and_then(|()| self.commit()) {
                if self.undo.is_some() {
                    self.rollback()?;
                }
                return Err(PersistenceError::Migration {
                    version: migration.version,
                    name: migration.name,
                    reason: err.to_string(),
                });
            }

            tracing::info!("migration {} applied: {}", migration.version, migration.name);
            applied += 1;
        }
        Ok(applied)
    }

    fn load_snapshot(path: &Path) -> PersistenceResult<Tables> {
        if !path.exists() {
            return Ok(Tables::default());
        }
        let compressed = fs::read(path)?;
        let bytes = decompress_size_prepended(&compressed)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Journals then applies one operation.
    fn write(&mut self, op: JournalOp) -> PersistenceResult<()> {
        let payload = serde_json::to_vec(&op)?;
        self.wal.append(&payload)?;
        let undo = self.tables.apply(op);
        if let Some(log) = self.undo.as_mut() {
            log.push(undo);
        }
        Ok(())
    }

    fn revert(&mut self, log: Vec<Undo>) {
        for undo in log.into_iter().rev() {
            self.tables.undo(undo);
        }
    }
}

/// Drops empty optional fields so equal blocks store equal params.
fn normalize(item: &BlockItem) -> BlockItem {
    if item.is_air() {
        return BlockItem::AIR;
    }
    let mut item = item.clone();
    if item.entity_id.as_deref() == Some("") {
        item.entity_id = None;
    }
    let empty_extra = match &item.extra_data {
        Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        _ => false,
    };
    if empty_extra {
        item.extra_data = None;
    }
    if item.power == Some(0.0) {
        item.power = None;
    }
    item
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

impl WorldStore for JournalStore {
    fn get_world(&self, guid: &str) -> PersistenceResult<Option<WorldRow>> {
        Ok(self.tables.world_by_guid(guid).cloned())
    }

    fn insert_world(&mut self, world: NewWorld) -> PersistenceResult<WorldRow> {
        let row = WorldRow {
            id: self.tables.allocate_id(),
            guid: world.guid,
            title: world.title,
            seed: world.seed,
            generator: world.generator,
            pos_spawn: world.pos_spawn,
            dt: unix_now(),
            add_time: DEFAULT_ADD_TIME,
        };
        self.write(JournalOp::PutWorld(row.clone()))?;
        Ok(row)
    }

    fn update_world_add_time(&mut self, world_id: u64, add_time: i64) -> PersistenceResult<()> {
        let mut row = self
            .tables
            .world
            .get(&world_id)
            .cloned()
            .ok_or_else(|| PersistenceError::WorldNotFound(world_id.to_string()))?;
        row.add_time = add_time;
        self.write(JournalOp::PutWorld(row))
    }

    fn block_set(
        &mut self,
        world_id: u64,
        pos: BlockPos,
        item: &BlockItem,
        action: BlockAction,
    ) -> PersistenceResult<ModifyRow> {
        let item = normalize(item);
        let params = if item.is_air() {
            None
        } else {
            Some(serde_json::to_value(&item)?)
        };

        let existing = match action {
            BlockAction::Modify => self.tables.latest_modify(pos).cloned(),
            _ => None,
        };
        let (id, ticks) = match existing {
            Some(row) => (row.id, row.ticks),
            None => (self.tables.allocate_id(), None),
        };

        let row = ModifyRow {
            id,
            world_id,
            pos,
            params,
            entity_id: item.entity_id.clone(),
            extra_data: item.extra_data.clone(),
            block_id: item.id,
            ticks,
        };
        self.write(JournalOp::PutModify(row.clone()))?;
        Ok(row)
    }

    fn latest_modify(&self, pos: BlockPos) -> PersistenceResult<Option<ModifyRow>> {
        Ok(self.tables.latest_modify(pos).cloned())
    }

    fn load_chunk_modifiers(&self, addr: ChunkAddr) -> PersistenceResult<Vec<ModifyRow>> {
        Ok(self.tables.chunk_modifiers(addr).cloned().collect())
    }

    fn modified_chunk_addrs(&self) -> PersistenceResult<Vec<ChunkAddr>> {
        Ok(self.tables.modified_chunks().collect())
    }

    fn create_entity(&mut self, entity: NewEntity) -> PersistenceResult<EntityRow> {
        let row = EntityRow {
            id: self.tables.allocate_id(),
            entity_id: Uuid::new_v4().to_string(),
            kind: entity.kind,
            skin: entity.skin,
            pos: entity.pos,
            pos_spawn: entity.pos,
            rotate: entity.rotate,
            indicators: entity.indicators,
            extra_data: entity.extra_data,
            is_active: true,
        };
        self.write(JournalOp::PutEntity(row.clone()))?;
        Ok(row)
    }

    fn save_entity(&mut self, entity: &EntityRow) -> PersistenceResult<()> {
        let id = self
            .tables
            .entity_by_uuid(&entity.entity_id)
            .map(|row| row.id)
            .ok_or_else(|| PersistenceError::EntityNotFound(entity.entity_id.clone()))?;
        let mut row = entity.clone();
        row.id = id;
        self.write(JournalOp::PutEntity(row))
    }

    fn set_entity_active(&mut self, entity_id: &str, active: bool) -> PersistenceResult<()> {
        let mut row = self
            .tables
            .entity_by_uuid(entity_id)
            .cloned()
            .ok_or_else(|| PersistenceError::EntityNotFound(entity_id.to_string()))?;
        row.is_active = active;
        self.write(JournalOp::PutEntity(row))
    }

    fn load_entities(&self, addr: ChunkAddr) -> PersistenceResult<Vec<EntityRow>> {
        Ok(self
            .tables
            .entity
            .values()
            .filter(|row| row.is_active && ChunkAddr::from_world(row.pos) == addr)
            .cloned()
            .collect())
    }

    fn create_drop_item(
        &mut self,
        items: Vec<ItemStack>,
        pos: Vec3,
    ) -> PersistenceResult<DropItemRow> {
        let row = DropItemRow {
            id: self.tables.allocate_id(),
            entity_id: Uuid::new_v4().to_string(),
            items,
            pos,
            dt: unix_now(),
            is_deleted: false,
        };
        self.write(JournalOp::PutDropItem(row.clone()))?;
        Ok(row)
    }

    fn delete_drop_item(&mut self, entity_id: &str) -> PersistenceResult<()> {
        let mut row = self
            .tables
            .drop_item_by_uuid(entity_id)
            .cloned()
            .ok_or_else(|| PersistenceError::DropItemNotFound(entity_id.to_string()))?;
        row.is_deleted = true;
        self.write(JournalOp::PutDropItem(row))
    }

    fn load_drop_items(&self, addr: ChunkAddr) -> PersistenceResult<Vec<DropItemRow>> {
        Ok(self
            .tables
            .drop_item
            .values()
            .filter(|row| !row.is_deleted && ChunkAddr::from_world(row.pos) == addr)
            .cloned()
            .collect())
    }

    fn chunk_mobs_generated(&self, addr: ChunkAddr) -> PersistenceResult<bool> {
        Ok(self.tables.chunk.contains(&addr))
    }

    fn set_chunk_mobs_generated(&mut self, addr: ChunkAddr) -> PersistenceResult<()> {
        if self.tables.chunk.contains(&addr) {
            return Ok(());
        }
        self.write(JournalOp::MarkChunkMobsGenerated(addr))
    }

    fn begin(&mut self) -> PersistenceResult<()> {
        if self.undo.is_some() {
            return Err(PersistenceError::Transaction("transaction already open"));
        }
        self.wal.begin()?;
        self.undo = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> PersistenceResult<()> {
        let log = self
            .undo
            .take()
            .ok_or(PersistenceError::Transaction("commit without begin"))?;
        if let Err(err) = self.wal.commit() {
            self.revert(log);
            return Err(err);
        }
        Ok(())
    }

    fn rollback(&mut self) -> PersistenceResult<()> {
        let log = self
            .undo
            .take()
            .ok_or(PersistenceError::Transaction("rollback without begin"))?;
        self.revert(log);
        tracing::debug!("transaction rolled back");
        self.wal.rollback()
    }

    fn migrate(&mut self) -> PersistenceResult<usize> {
        self.apply_migrations(MIGRATIONS)
    }

    fn schema_version(&self) -> PersistenceResult<u32> {
        Ok(self.tables.version)
    }

    fn checkpoint(&mut self) -> PersistenceResult<()> {
        if self.undo.is_some() {
            return Err(PersistenceError::Transaction("checkpoint inside transaction"));
        }
        let bytes = serde_json::to_vec(&self.tables)?;
        let compressed = compress_prepend_size(&bytes);

        let tmp = self.dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&compressed)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.dir.join(SNAPSHOT_FILE))?;
        self.wal.checkpoint()?;

        tracing::info!(
            "checkpoint written: {} bytes ({} uncompressed)",
            compressed.len(),
            bytes.len()
        );
        Ok(())
    }
}
