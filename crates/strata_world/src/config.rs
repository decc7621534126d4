//! # World Configuration
//!
//! Server tuning loaded from TOML. Every field has a default, so an empty
//! file is a valid configuration; unknown keys are rejected.
//!
//! ```toml
//! world_dir = "./world"
//! world_guid = "default"
//! tick_interval_ms = 50
//!
//! [generator]
//! id = "flat"
//! ground_level = 4
//!
//! [generation]
//! timeout_ticks = 100
//! max_retries = 3
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_procedural::GeneratorConfig;
use strata_shared::constants::{
    DEFAULT_RENDER_DIST, DROP_ITEM_PICKUP_RADIUS, MAX_Y_MARGIN, MOB_SAVE_INTERVAL_TICKS,
    TICK_INTERVAL_MS,
};

use crate::error::{WorldError, WorldResult};

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Directory holding the journal and snapshot.
    pub world_dir: PathBuf,
    /// World served by this process.
    pub world_guid: String,
    /// Title given to a newly created world.
    pub world_title: String,
    /// Seed phrase given to a newly created world.
    pub world_seed: String,
    /// Terrain generator given to a newly created world.
    pub generator: GeneratorConfig,
    /// Target tick duration.
    pub tick_interval_ms: u64,
    /// Ticks between auxiliary cache sweeps.
    pub gc_interval_ticks: u64,
    /// Ticks between journal checkpoints.
    pub checkpoint_interval_ticks: u64,
    /// Whether chunks below y = 0 are ever loaded.
    pub allow_negative_y: bool,
    /// Vertical visibility margin in chunks.
    pub max_y_margin: i32,
    /// Render distance of players that never chose one.
    pub default_render_dist: i32,
    /// Generation worker tuning.
    pub generation: GenerationConfig,
    /// Mob tuning.
    pub mobs: MobConfig,
    /// Drop item tuning.
    pub drop_items: DropItemConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            world_dir: PathBuf::from("./world"),
            world_guid: "default".to_string(),
            world_title: "Strata".to_string(),
            world_seed: "strata".to_string(),
            generator: GeneratorConfig::default(),
            tick_interval_ms: TICK_INTERVAL_MS,
            gc_interval_ticks: 100,
            checkpoint_interval_ticks: 6_000,
            allow_negative_y: true,
            max_y_margin: MAX_Y_MARGIN,
            default_render_dist: DEFAULT_RENDER_DIST,
            generation: GenerationConfig::default(),
            mobs: MobConfig::default(),
            drop_items: DropItemConfig::default(),
        }
    }
}

/// Chunk generation retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    /// Ticks to wait for a worker answer before asking again.
    pub timeout_ticks: u64,
    /// Re-sends after the first request before the chunk is marked failed.
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_ticks: 100,
            max_retries: 3,
        }
    }
}

/// Mob tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MobConfig {
    /// Ticks between throttled saves of one mob.
    pub save_interval_ticks: u32,
    /// Whether freshly generated chunks get their initial mobs.
    pub natural_spawn: bool,
}

impl Default for MobConfig {
    fn default() -> Self {
        Self {
            save_interval_ticks: MOB_SAVE_INTERVAL_TICKS,
            natural_spawn: true,
        }
    }
}

/// Drop item tuning.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DropItemConfig {
    /// Distance at which players collect drops.
    pub pickup_radius: f64,
}

impl Default for DropItemConfig {
    fn default() -> Self {
        Self {
            pickup_radius: DROP_ITEM_PICKUP_RADIUS,
        }
    }
}

impl WorldConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML, unknown keys or out-of-range values.
    pub fn from_toml_str(text: &str) -> WorldResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| WorldError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not parse.
    pub fn load(path: impl AsRef<Path>) -> WorldResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| WorldError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Config`] naming the offending key.
    pub fn validate(&self) -> WorldResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(WorldError::Config("tick_interval_ms must be positive".into()));
        }
        if self.gc_interval_ticks == 0 || self.checkpoint_interval_ticks == 0 {
            return Err(WorldError::Config("intervals must be positive".into()));
        }
        if self.mobs.save_interval_ticks == 0 {
            return Err(WorldError::Config("mobs.save_interval_ticks must be positive".into()));
        }
        if self.max_y_margin < 0 {
            return Err(WorldError::Config("max_y_margin must not be negative".into()));
        }
        if self.drop_items.pickup_radius < 0.0 {
            return Err(WorldError::Config("drop_items.pickup_radius must not be negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(WorldConfig::from_toml_str("").unwrap(), WorldConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = WorldConfig::from_toml_str(
            r#"
            world_guid = "meadow"
            allow_negative_y = false

            [generation]
            max_retries = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.world_guid, "meadow");
        assert!(!config.allow_negative_y);
        assert_eq!(config.generation.max_retries, 1);
        assert_eq!(config.generation.timeout_ticks, 100);
        assert_eq!(config.tick_interval_ms, 50);
    }

    #[test]
    fn test_generator_table() {
        let config = WorldConfig::from_toml_str("[generator]\nid = \"flat\"\nground_level = 6\n").unwrap();
        assert_eq!(config.generator, GeneratorConfig::Flat { ground_level: 6 });
        assert!(WorldConfig::from_toml_str("[generator]\nid = \"caves\"").is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(WorldConfig::from_toml_str("tick_rate = 20").is_err());
        assert!(WorldConfig::from_toml_str("[mobs]\nspeed = 2").is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            WorldConfig::from_toml_str("tick_interval_ms = 0"),
            Err(WorldError::Config(_))
        ));
        assert!(WorldConfig::from_toml_str("[mobs]\nsave_interval_ticks = 0").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("test_world_config_{id}.toml"));
        std::fs::write(&path, "gc_interval_ticks = 7\n").unwrap();
        let config = WorldConfig::load(&path).unwrap();
        assert_eq!(config.gc_interval_ticks, 7);
        std::fs::remove_file(&path).ok();
        assert!(WorldConfig::load(&path).is_err());
    }
}
