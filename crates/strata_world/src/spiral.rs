//! Nearest-first chunk offsets.
//!
//! Visibility walks every chunk inside a box of margins around the player,
//! closest first, so generation requests go out in the order players need
//! them. The offsets only depend on the margins and are cached.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use strata_shared::ChunkAddr;

/// Offsets inside `[-margin, margin] x [-y_margin, y_margin] x [-margin, margin]`
/// sorted by squared distance, ties broken by `(y, z, x)`.
#[must_use]
pub fn spiral_offsets(margin: i32, y_margin: i32) -> Vec<ChunkAddr> {
    let mut offsets = Vec::new();
    for y in -y_margin..=y_margin {
        for z in -margin..=margin {
            for x in -margin..=margin {
                offsets.push(ChunkAddr::new(x, y, z));
            }
        }
    }
    offsets.sort_by_key(|o| (o.x * o.x + o.y * o.y + o.z * o.z, o.y, o.z, o.x));
    offsets
}

/// Memoized [`spiral_offsets`] keyed by margins.
#[derive(Default)]
pub struct SpiralCache {
    entries: HashMap<(i32, i32), Arc<Vec<ChunkAddr>>>,
    used: HashSet<(i32, i32)>,
}

impl SpiralCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offsets for the given margins, computed on first use.
    pub fn get(&mut self, margin: i32, y_margin: i32) -> Arc<Vec<ChunkAddr>> {
        let key = (margin, y_margin);
        self.used.insert(key);
        Arc::clone(
            self.entries
                .entry(key)
                .or_insert_with(|| Arc::new(spiral_offsets(margin, y_margin))),
        )
    }

    /// Drops entries not requested since the previous prune.
    ///
    /// Returns the number of dropped entries.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        let used = std::mem::take(&mut self.used);
        self.entries.retain(|key, _| used.contains(key));
        before - self.entries.len()
    }

    /// Number of cached margin pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_first() {
        let offsets = spiral_offsets(2, 1);
        assert_eq!(offsets.len(), 5 * 3 * 5);
        assert_eq!(offsets[0], ChunkAddr::new(0, 0, 0));
        let dist = |o: &ChunkAddr| o.x * o.x + o.y * o.y + o.z * o.z;
        assert!(offsets.windows(2).all(|w| dist(&w[0]) <= dist(&w[1])));
    }

    #[test]
    fn test_cache_reuses_and_prunes() {
        let mut cache = SpiralCache::new();
        let a = cache.get(3, 3);
        let b = cache.get(3, 3);
        assert!(Arc::ptr_eq(&a, &b));
        cache.get(5, 3);
        assert_eq!(cache.len(), 2);

        // Both were used since the last prune.
        assert_eq!(cache.prune(), 0);
        cache.get(3, 3);
        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.len(), 1);
    }
}
