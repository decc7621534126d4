//! # Schema Migrations
//!
//! Ordered, numbered, forward-only data migrations. Each one runs inside its
//! own transaction together with the version bump, and only when its number
//! is above the stored version. Some of them rewrite or drop historical
//! rows; that is accepted.

use serde_json::{json, Value};
use strata_shared::{block_id, Vec3};

use crate::tables::Tables;

/// One migration step.
#[derive(Clone, Copy)]
pub struct Migration {
    /// Version recorded after this step; strictly increasing.
    pub version: u32,
    /// Human-readable name for logs.
    pub name: &'static str,
    /// The rewrite itself.
    pub apply: fn(&mut Tables) -> Result<(), String>,
}

/// Every migration, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "backfill block_id from params",
        apply: backfill_block_id,
    },
    Migration {
        version: 2,
        name: "remap legacy sign id",
        apply: remap_legacy_sign,
    },
    Migration {
        version: 3,
        name: "initial growth stage for saplings and wheat",
        apply: initial_growth_stage,
    },
    Migration {
        version: 4,
        name: "entity position from spawn point",
        apply: entity_pos_from_spawn,
    },
    Migration {
        version: 5,
        name: "delete empty drop items",
        apply: delete_empty_drop_items,
    },
];

fn backfill_block_id(tables: &mut Tables) -> Result<(), String> {
    for row in tables.world_modify.values_mut() {
        if row.block_id != 0 {
            continue;
        }
        let id = row
            .params
            .as_ref()
            .and_then(|p| p.get("id"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        row.block_id = u16::try_from(id).map_err(|_| format!("block id {id} out of range"))?;
    }
    Ok(())
}

fn remap_legacy_sign(tables: &mut Tables) -> Result<(), String> {
    for row in tables.world_modify.values_mut() {
        if row.block_id != block_id::LEGACY_SIGN {
            continue;
        }
        row.block_id = block_id::OAK_SIGN;
        if let Some(params) = row.params.as_mut().and_then(Value::as_object_mut) {
            params.insert("id".to_string(), json!(block_id::OAK_SIGN));
        }
    }
    Ok(())
}

fn initial_growth_stage(tables: &mut Tables) -> Result<(), String> {
    for row in tables.world_modify.values_mut() {
        let grows = row.block_id == block_id::OAK_SAPLING || row.block_id == block_id::WHEAT;
        if !grows || row.extra_data.is_some() {
            continue;
        }
        let extra = json!({ "stage": 0 });
        if let Some(params) = row.params.as_mut().and_then(Value::as_object_mut) {
            params.insert("extra_data".to_string(), extra.clone());
        }
        row.extra_data = Some(extra);
    }
    Ok(())
}

fn entity_pos_from_spawn(tables: &mut Tables) -> Result<(), String> {
    for row in tables.entity.values_mut() {
        if row.pos == Vec3::ZERO {
            row.pos = row.pos_spawn;
        }
    }
    Ok(())
}

fn delete_empty_drop_items(tables: &mut Tables) -> Result<(), String> {
    for row in tables.drop_item.values_mut() {
        if row.items.iter().all(|stack| stack.count == 0) {
            row.is_deleted = true;
        }
    }
    Ok(())
}
