//! Modification tracker.
//!
//! The set of chunk addresses holding at least one persisted override. It is
//! rebuilt once at startup and only grows afterwards: a chunk that was ever
//! modified keeps replaying its overrides for the rest of the session.

use std::collections::HashSet;

use strata_persistence::WorldStore;
use strata_shared::ChunkAddr;

use crate::error::WorldResult;

/// Chunks with persisted overrides.
#[derive(Debug, Default)]
pub struct ModificationTracker {
    addrs: HashSet<ChunkAddr>,
}

impl ModificationTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the tracker from the store.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn restore(store: &dyn WorldStore) -> WorldResult<Self> {
        let addrs: HashSet<ChunkAddr> = store.modified_chunk_addrs()?.into_iter().collect();
        tracing::info!("modification tracker restored: {} chunks", addrs.len());
        Ok(Self { addrs })
    }

    /// Records a committed override. Returns true for a newly tracked chunk.
    pub fn mark_modified(&mut self, addr: ChunkAddr) -> bool {
        self.addrs.insert(addr)
    }

    /// Whether the chunk has overrides to replay.
    #[must_use]
    pub fn has_modifiers(&self, addr: ChunkAddr) -> bool {
        self.addrs.contains(&addr)
    }

    /// Number of tracked chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Returns true if no chunk was ever modified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_is_sticky() {
        let mut tracker = ModificationTracker::new();
        let addr = ChunkAddr::new(1, 0, -1);
        assert!(!tracker.has_modifiers(addr));
        assert!(tracker.mark_modified(addr));
        assert!(!tracker.mark_modified(addr));
        assert!(tracker.has_modifiers(addr));
        assert_eq!(tracker.len(), 1);
    }
}
