//! # Terrain Generators
//!
//! Turns a chunk address into the chunk's default voxels. Overrides are not
//! applied here; the world replays them on top of the generated blocks.
//!
//! ## Layout
//!
//! Voxels are stored `[y][z][x]` in a flat `Vec<u16>` of block ids, so a
//! horizontal slice is contiguous.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_shared::block_id;
use strata_shared::{BlockPos, ChunkAddr, CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, CHUNK_VOLUME};

use crate::noise::{SimplexNoise, WorldSeed};

#[allow(clippy::cast_sign_loss)]
const SX: usize = CHUNK_SIZE_X as usize;
#[allow(clippy::cast_sign_loss)]
const SY: usize = CHUNK_SIZE_Y as usize;
#[allow(clippy::cast_sign_loss)]
const SZ: usize = CHUNK_SIZE_Z as usize;

/// Dense block ids of one chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkBlocks {
    /// Chunk address
    pub addr: ChunkAddr,
    ids: Vec<u16>,
}

impl ChunkBlocks {
    /// A chunk filled with air.
    #[must_use]
    pub fn empty(addr: ChunkAddr) -> Self {
        Self {
            addr,
            ids: vec![block_id::AIR; CHUNK_VOLUME],
        }
    }

    #[inline]
    const fn index(x: usize, y: usize, z: usize) -> usize {
        (y * SZ + z) * SX + x
    }

    /// Block id at local coordinates.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize) -> u16 {
        self.ids[Self::index(x, y, z)]
    }

    /// Sets the block id at local coordinates.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, id: u16) {
        self.ids[Self::index(x, y, z)] = id;
    }

    /// Block id at a world position, `None` outside this chunk.
    #[must_use]
    pub fn get_world(&self, pos: BlockPos) -> Option<u16> {
        if !self.addr.contains(pos) {
            return None;
        }
        let (x, y, z) = self.addr.local(pos);
        Some(self.get(x, y, z))
    }

    /// Sets the block id at a world position; ignored outside this chunk.
    pub fn set_world(&mut self, pos: BlockPos, id: u16) {
        if self.addr.contains(pos) {
            let (x, y, z) = self.addr.local(pos);
            self.set(x, y, z, id);
        }
    }

    /// Number of non-air voxels.
    #[must_use]
    pub fn solid_count(&self) -> usize {
        self.ids.iter().filter(|id| **id != block_id::AIR).count()
    }
}

/// Generator selection stored in the world row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "snake_case")]
pub enum GeneratorConfig {
    /// Bedrock, dirt, then one layer of grass.
    Flat {
        /// Height of the grass surface above y = 0
        #[serde(default = "default_ground_level")]
        ground_level: i32,
    },
    /// Height-map terrain with water and plants.
    Terrain {
        /// Water fills everything up to this height
        #[serde(default = "default_sea_level")]
        sea_level: i32,
    },
}

const fn default_ground_level() -> i32 {
    4
}

const fn default_sea_level() -> i32 {
    28
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::Terrain {
            sea_level: default_sea_level(),
        }
    }
}

impl GeneratorConfig {
    /// Parses the stored JSON form.
    ///
    /// # Errors
    ///
    /// Fails on an unknown generator id or malformed options.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Stored JSON form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Builds the generator for a seed.
    #[must_use]
    pub fn build(&self, seed: WorldSeed) -> Box<dyn TerrainGenerator> {
        match *self {
            Self::Flat { ground_level } => Box::new(FlatGenerator { ground_level }),
            Self::Terrain { sea_level } => Box::new(NoiseTerrainGenerator::new(seed, sea_level)),
        }
    }
}

/// Produces the default voxels of a chunk.
///
/// Must be a pure function of its configuration and the address.
pub trait TerrainGenerator: Send {
    /// Generator id for logs.
    fn name(&self) -> &'static str;

    /// Generates one chunk.
    fn generate(&self, addr: ChunkAddr) -> ChunkBlocks;
}

/// Flat world generator.
pub struct FlatGenerator {
    ground_level: i32,
}

impl TerrainGenerator for FlatGenerator {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn generate(&self, addr: ChunkAddr) -> ChunkBlocks {
        let mut blocks = ChunkBlocks::empty(addr);
        let origin = addr.origin();
        for ly in 0..SY {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let wy = origin.y + ly as i32;
            let id = if wy == 0 {
                block_id::BEDROCK
            } else if wy < 0 || wy < self.ground_level - 1 {
                block_id::DIRT
            } else if wy == self.ground_level - 1 {
                block_id::GRASS_BLOCK
            } else {
                continue;
            };
            for lz in 0..SZ {
                for lx in 0..SX {
                    blocks.set(lx, ly, lz, id);
                }
            }
        }
        blocks
    }
}

/// Noise height-map generator.
pub struct NoiseTerrainGenerator {
    height: SimplexNoise,
    detail: SimplexNoise,
    sea_level: i32,
}

impl NoiseTerrainGenerator {
    /// Height-map frequency.
    const SCALE: f64 = 0.012;
    /// Height variation around the base level.
    const AMPLITUDE: f64 = 18.0;

    /// Creates the generator.
    #[must_use]
    pub fn new(seed: WorldSeed, sea_level: i32) -> Self {
        Self {
            height: SimplexNoise::new(seed.derive(1)),
            detail: SimplexNoise::new(seed.derive(2)),
            sea_level,
        }
    }

    /// Highest solid block of a column.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn surface_height(&self, x: i32, z: i32) -> i32 {
        let n = self.height.octaved(
            f64::from(x) * Self::SCALE,
            f64::from(z) * Self::SCALE,
            5,
            0.5,
            2.0,
        );
        let base = f64::from(self.sea_level + 4);
        (base + n * Self::AMPLITUDE).floor() as i32
    }

    fn column_block(&self, wx: i32, wy: i32, wz: i32, height: i32) -> u16 {
        let beach = height <= self.sea_level + 1;
        if wy == 0 {
            block_id::BEDROCK
        } else if wy < 0 || wy < height - 3 {
            block_id::STONE
        } else if wy < height {
            if beach {
                block_id::SAND
            } else {
                block_id::DIRT
            }
        } else if wy == height {
            if beach {
                block_id::SAND
            } else {
                block_id::GRASS_BLOCK
            }
        } else if wy <= self.sea_level {
            block_id::STILL_WATER
        } else if wy == height + 1 && !beach {
            let d = self
                .detail
                .sample(f64::from(wx) * 0.37, f64::from(wz) * 0.37);
            if d > 0.6 {
                block_id::TALL_GRASS
            } else if d < -0.8 {
                block_id::DANDELION
            } else {
                block_id::AIR
            }
        } else {
            block_id::AIR
        }
    }
}

impl TerrainGenerator for NoiseTerrainGenerator {
    fn name(&self) -> &'static str {
        "terrain"
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn generate(&self, addr: ChunkAddr) -> ChunkBlocks {
        let mut blocks = ChunkBlocks::empty(addr);
        let origin = addr.origin();
        for lz in 0..SZ {
            for lx in 0..SX {
                let wx = origin.x + lx as i32;
                let wz = origin.z + lz as i32;
                let height = self.surface_height(wx, wz);
                for ly in 0..SY {
                    let wy = origin.y + ly as i32;
                    let id = self.column_block(wx, wy, wz, height);
                    if id != block_id::AIR {
                        blocks.set(lx, ly, lz, id);
                    }
                }
            }
        }
        blocks
    }
}
