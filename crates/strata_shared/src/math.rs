//! Spatial types shared by every crate.
//!
//! World coordinates are real-valued. A block lives at the integer lattice
//! point obtained by flooring each axis; a chunk address is the floor
//! division of a block coordinate by the chunk size on that axis.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z};

/// Real-valued world vector - position, velocity, rotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
}

impl Vec3 {
    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Creates a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Distance to another point
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or zero for the zero vector.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            Self::ZERO
        } else {
            self * (1.0 / len)
        }
    }

    /// Block containing this point.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn floored(self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Integer position of a single voxel.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockPos {
    /// X coordinate
    pub x: i32,
    /// Y coordinate
    pub y: i32,
    /// Z coordinate
    pub z: i32,
}

impl BlockPos {
    /// Creates a new block position.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Position shifted by the given deltas.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Block `n` above.
    #[must_use]
    pub const fn up(self, n: i32) -> Self {
        self.offset(0, n, 0)
    }

    /// Block `n` below.
    #[must_use]
    pub const fn down(self, n: i32) -> Self {
        self.offset(0, -n, 0)
    }

    /// Converts a real vector whose components are all integral.
    ///
    /// Returns `None` for fractional or non-finite components.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_vec3_exact(v: Vec3) -> Option<Self> {
        let exact = |c: f64| {
            (c.is_finite() && c.fract() == 0.0 && c.abs() <= f64::from(i32::MAX)).then(|| c as i32)
        };
        Some(Self::new(exact(v.x)?, exact(v.y)?, exact(v.z)?))
    }

    /// Corner of the block as a real vector.
    #[must_use]
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(f64::from(self.x), f64::from(self.y), f64::from(self.z))
    }

    /// Bottom-center of the block, where drops are spawned.
    #[must_use]
    pub fn bottom_center(self) -> Vec3 {
        self.to_vec3() + Vec3::new(0.5, 0.0, 0.5)
    }

    /// Address of the chunk containing this block.
    #[must_use]
    pub const fn chunk_addr(self) -> ChunkAddr {
        ChunkAddr::from_block(self)
    }
}

impl Add for BlockPos {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        self.offset(rhs.x, rhs.y, rhs.z)
    }
}

impl Sub for BlockPos {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self.offset(-rhs.x, -rhs.y, -rhs.z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.x, self.y, self.z)
    }
}

/// Chunk address in chunk units.
///
/// Uses floor division so that `-1` maps to chunk `-1`, not `0`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChunkAddr {
    /// Chunk X
    pub x: i32,
    /// Chunk Y
    pub y: i32,
    /// Chunk Z
    pub z: i32,
}

impl ChunkAddr {
    /// Creates a new chunk address.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Address of the chunk containing a block.
    #[must_use]
    pub const fn from_block(pos: BlockPos) -> Self {
        Self::new(
            pos.x.div_euclid(CHUNK_SIZE_X),
            pos.y.div_euclid(CHUNK_SIZE_Y),
            pos.z.div_euclid(CHUNK_SIZE_Z),
        )
    }

    /// Address of the chunk containing a world point.
    #[must_use]
    pub fn from_world(pos: Vec3) -> Self {
        Self::from_block(pos.floored())
    }

    /// Address shifted by the given deltas.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Lowest-corner block of the chunk.
    #[must_use]
    pub const fn origin(self) -> BlockPos {
        BlockPos::new(
            self.x * CHUNK_SIZE_X,
            self.y * CHUNK_SIZE_Y,
            self.z * CHUNK_SIZE_Z,
        )
    }

    /// Returns true if the block lies inside this chunk.
    #[must_use]
    pub const fn contains(self, pos: BlockPos) -> bool {
        let a = Self::from_block(pos);
        a.x == self.x && a.y == self.y && a.z == self.z
    }

    /// Local (in-chunk) coordinates of a block inside this chunk.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn local(self, pos: BlockPos) -> (usize, usize, usize) {
        (
            pos.x.rem_euclid(CHUNK_SIZE_X) as usize,
            pos.y.rem_euclid(CHUNK_SIZE_Y) as usize,
            pos.z.rem_euclid(CHUNK_SIZE_Z) as usize,
        )
    }
}

impl fmt::Display for ChunkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Axis-aligned bounding box in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Creates a box from two corners.
    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Unit box occupied by a block.
    #[must_use]
    pub fn from_block(pos: BlockPos) -> Self {
        let min = pos.to_vec3();
        Self::new(min, min + Vec3::new(1.0, 1.0, 1.0))
    }

    /// Box of half-extent `half` centered on `center`.
    #[must_use]
    pub fn around(center: Vec3, half: Vec3) -> Self {
        Self::new(center - half, center + half)
    }

    /// Box grown by the given amounts on each side.
    #[must_use]
    pub fn expand(self, dx: f64, dy: f64, dz: f64) -> Self {
        let d = Vec3::new(dx, dy, dz);
        Self::new(self.min - d, self.max + d)
    }

    /// Strict overlap test; touching faces do not intersect.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Returns true if the point is inside or on the boundary.
    #[must_use]
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Inclusive range of chunk addresses touched by this box.
    #[must_use]
    pub fn chunk_range(&self) -> (ChunkAddr, ChunkAddr) {
        (
            ChunkAddr::from_world(self.min),
            ChunkAddr::from_world(self.max),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_addr_floor_division() {
        assert_eq!(ChunkAddr::from_block(BlockPos::new(0, 0, 0)), ChunkAddr::new(0, 0, 0));
        assert_eq!(ChunkAddr::from_block(BlockPos::new(15, 39, 15)), ChunkAddr::new(0, 0, 0));
        assert_eq!(ChunkAddr::from_block(BlockPos::new(16, 40, 16)), ChunkAddr::new(1, 1, 1));
        assert_eq!(ChunkAddr::from_block(BlockPos::new(-1, -1, -1)), ChunkAddr::new(-1, -1, -1));
        assert_eq!(ChunkAddr::from_block(BlockPos::new(-16, -40, -17)), ChunkAddr::new(-1, -1, -2));
    }

    #[test]
    fn test_chunk_addr_from_world_point() {
        assert_eq!(ChunkAddr::from_world(Vec3::new(-0.5, 10.0, 31.9)), ChunkAddr::new(-1, 0, 1));
    }

    #[test]
    fn test_local_coordinates() {
        let addr = ChunkAddr::new(-1, 0, 0);
        assert_eq!(addr.local(BlockPos::new(-1, 5, 3)), (15, 5, 3));
        assert!(addr.contains(BlockPos::new(-16, 0, 0)));
        assert!(!addr.contains(BlockPos::new(0, 0, 0)));
        assert_eq!(addr.origin(), BlockPos::new(-16, 0, 0));
    }

    #[test]
    fn test_exact_block_pos() {
        assert_eq!(
            BlockPos::from_vec3_exact(Vec3::new(1.0, -2.0, 3.0)),
            Some(BlockPos::new(1, -2, 3))
        );
        assert_eq!(BlockPos::from_vec3_exact(Vec3::new(1.5, 0.0, 0.0)), None);
        assert_eq!(BlockPos::from_vec3_exact(Vec3::new(f64::NAN, 0.0, 0.0)), None);
    }

    #[test]
    fn test_aabb_intersection_is_strict() {
        let a = Aabb::from_block(BlockPos::new(0, 0, 0));
        let b = Aabb::from_block(BlockPos::new(1, 0, 0));
        let c = Aabb::around(Vec3::new(1.0, 0.5, 0.5), Vec3::new(0.3, 0.3, 0.3));
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
        assert!(b.intersects(&c));
    }

    #[test]
    fn test_normalize_zero() {
        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
        let n = Vec3::new(3.0, 0.0, 4.0).normalize();
        assert!((n.length() - 1.0).abs() < 1e-9);
    }
}
