//! Entity handles and allocation.
//!
//! An [`EntityHandle`] is a 64-bit value that packs a *generation* counter in
//! the high 32 bits and a slot *index* in the low 32 bits. Releasing a slot
//! bumps its generation, so a handle that outlives its entity is detected as
//! stale instead of silently aliasing whatever reuses the slot.
//!
//! Handles are volatile: they are not stable across runs or across a
//! save/load cycle. Stable identity lives one layer up, in the UID registry.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

// ---------------------------------------------------------------------------
// EntityHandle
// ---------------------------------------------------------------------------

/// A generational entity handle.
///
/// Layout: `[generation: u32 | index: u32]`. [`EntityHandle::NULL`] (all bits
/// set) never refers to a live entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityHandle(u64);

impl EntityHandle {
    /// The invalid sentinel handle.
    pub const NULL: EntityHandle = EntityHandle(u64::MAX);

    /// Construct a handle from an index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// `true` for [`EntityHandle::NULL`].
    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl Default for EntityHandle {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "EntityHandle(null)")
        } else {
            write!(f, "EntityHandle({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Hands out [`EntityHandle`]s and recycles released slots.
///
/// Released indices go to the back of a FIFO queue so that reuse of any one
/// slot (and therefore its generation churn) is spread out over time.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free_indices: VecDeque<u32>,
    alive_count: usize,
}

impl EntityAllocator {
    /// Create an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle, reusing a released slot if one is queued.
    pub fn allocate(&mut self) -> EntityHandle {
        self.alive_count += 1;
        if let Some(index) = self.free_indices.pop_front() {
            self.alive[index as usize] = true;
            return EntityHandle::new(index, self.generations[index as usize]);
        }
        let index = self.generations.len() as u32;
        // u32::MAX index with u32::MAX generation would collide with NULL.
        assert!(index < u32::MAX, "entity index space exhausted");
        self.generations.push(0);
        self.alive.push(true);
        EntityHandle::new(index, 0)
    }

    /// Release a handle. Returns `false` if it was already dead or stale.
    pub fn deallocate(&mut self, handle: EntityHandle) -> bool {
        if !self.is_alive(handle) {
            return false;
        }
        let idx = handle.index() as usize;
        self.alive[idx] = false;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free_indices.push_back(handle.index());
        self.alive_count -= 1;
        true
    }

    /// `true` if `handle` names a live entity with a current generation.
    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        let idx = handle.index() as usize;
        idx < self.generations.len()
            && self.alive[idx]
            && self.generations[idx] == handle.generation()
    }

    /// Number of live entities.
    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// All live handles in index order.
    pub fn alive_handles(&self) -> Vec<EntityHandle> {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(idx, _)| EntityHandle::new(idx as u32, self.generations[idx]))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
