//! Per-component-type access control for concurrently running systems.
//!
//! [`AccessPermissions`] pairs a global mode ([`AccessState`]) with one lock
//! counter per registered component type. Systems declare the types they
//! will write and read before running; a declaration that conflicts with one
//! already held fails immediately instead of waiting, and the caller's
//! scheduler decides what to do about it.
//!
//! Lock counter values: `0` free, `-1` write-locked, `n > 0` held by `n`
//! readers.
//!
//! One instance lives in each store's context (see
//! [`AccessPermissions::install`]).

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use scene_store::prelude::*;

use crate::registry::{ComponentTypeRegistry, TypeIndex};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Global execution mode of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessState {
    /// One system at a time; structural changes allowed.
    Serialized,
    /// Like `Serialized`, while tagged entities are being destroyed.
    SerializedDelete,
    /// Systems run in parallel over the types they acquired. No structural
    /// changes.
    Concurrent,
}

/// Kind of access requested or held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// A declaration that could not be granted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {requested}-lock component '{component}': already {held}-locked")]
pub struct AccessConflict {
    pub component: String,
    pub index: TypeIndex,
    pub requested: AccessMode,
    pub held: AccessMode,
}

#[derive(Debug, Default)]
struct LockTable {
    state: Option<AccessState>,
    locks: Vec<i32>,
}

impl LockTable {
    fn ensure_len(&mut self, type_count: usize) {
        if self.locks.len() < type_count {
            self.locks.resize(type_count, 0);
        }
    }

    fn all_zero(&self) -> bool {
        self.locks.iter().all(|&lock| lock == 0)
    }
}

// ---------------------------------------------------------------------------
// AccessPermissions
// ---------------------------------------------------------------------------

/// Mode switch plus per-type read/write locks for one store.
///
/// `try_acquire`/`release` take `&self` and may be called from any thread.
/// `set_state` may only be called from the coordinating thread, which is the
/// thread that created the object.
#[derive(Debug)]
pub struct AccessPermissions {
    types: Arc<ComponentTypeRegistry>,
    coordinator: ThreadId,
    table: Mutex<LockTable>,
}

impl AccessPermissions {
    /// Create permissions with no state set. The calling thread becomes the
    /// coordinating thread.
    pub fn new(types: Arc<ComponentTypeRegistry>) -> Self {
        Self {
            types,
            coordinator: thread::current().id(),
            table: Mutex::new(LockTable::default()),
        }
    }

    /// Create permissions and place them in `store`'s context.
    ///
    /// # Panics
    ///
    /// Panics if the store already has an `AccessPermissions`.
    pub fn install(store: &mut EntityStore, types: Arc<ComponentTypeRegistry>) {
        assert!(
            !store.context().contains::<AccessPermissions>(),
            "store {:?} already has access permissions",
            store.id()
        );
        store.context_mut().insert(Self::new(types));
    }

    pub fn types(&self) -> &Arc<ComponentTypeRegistry> {
        &self.types
    }

    pub fn is_coordinator_thread(&self) -> bool {
        thread::current().id() == self.coordinator
    }

    /// Current mode; `None` until the first [`set_state`](Self::set_state).
    pub fn state(&self) -> Option<AccessState> {
        self.table.lock().state
    }

    /// Switch mode.
    ///
    /// Legal transitions: (none) → `Serialized`, `Serialized` ↔ `Concurrent`,
    /// `Serialized` ↔ `SerializedDelete`.
    ///
    /// # Panics
    ///
    /// Panics on any other transition, when called off the coordinating
    /// thread, or when entering or leaving `Concurrent` with any lock held.
    pub fn set_state(&self, new_state: AccessState) {
        assert!(
            self.is_coordinator_thread(),
            "access state can only be changed from the coordinating thread"
        );

        let mut table = self.table.lock();
        let old_state = table.state;
        let legal = matches!(
            (old_state, new_state),
            (None, AccessState::Serialized)
                | (Some(AccessState::Serialized), AccessState::Concurrent)
                | (Some(AccessState::Concurrent), AccessState::Serialized)
                | (Some(AccessState::Serialized), AccessState::SerializedDelete)
                | (Some(AccessState::SerializedDelete), AccessState::Serialized)
        );
        assert!(
            legal,
            "illegal access state transition {old_state:?} -> {new_state:?}"
        );

        if new_state == AccessState::Concurrent || old_state == Some(AccessState::Concurrent) {
            assert!(
                table.all_zero(),
                "cannot switch {old_state:?} -> {new_state:?} while component locks are held"
            );
        }

        table.ensure_len(self.types.type_count());
        table.state = Some(new_state);
        tracing::debug!(from = ?old_state, to = ?new_state, "access state changed");
    }

    /// Claim `write` exclusively and `read` shared, all or nothing.
    ///
    /// On conflict nothing claimed by this call stays claimed, and the
    /// conflict is logged.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of range for the registry.
    pub fn acquire(&self, write: &[TypeIndex], read: &[TypeIndex]) -> Result<(), AccessConflict> {
        let mut table = self.table.lock();
        table.ensure_len(self.types.type_count());

        for (claimed, &index) in write.iter().enumerate() {
            let lock = table.locks[self.slot(index)];
            if lock != 0 {
                for &undo in &write[..claimed] {
                    table.locks[undo.index()] = 0;
                }
                let held = if lock < 0 { AccessMode::Write } else { AccessMode::Read };
                return Err(self.conflict(index, AccessMode::Write, held));
            }
            table.locks[index.index()] = -1;
        }

        for (claimed, &index) in read.iter().enumerate() {
            let lock = table.locks[self.slot(index)];
            if lock < 0 {
                for &undo in &read[..claimed] {
                    table.locks[undo.index()] -= 1;
                }
                for &undo in write {
                    table.locks[undo.index()] = 0;
                }
                return Err(self.conflict(index, AccessMode::Read, AccessMode::Write));
            }
            table.locks[index.index()] += 1;
        }

        Ok(())
    }

    /// [`acquire`](Self::acquire) as a boolean.
    pub fn try_acquire(&self, write: &[TypeIndex], read: &[TypeIndex]) -> bool {
        self.acquire(write, read).is_ok()
    }

    /// Acquire and return a guard that releases on drop.
    pub fn lock(
        &self,
        write: &[TypeIndex],
        read: &[TypeIndex],
    ) -> Result<AccessGuard<'_>, AccessConflict> {
        self.acquire(write, read)?;
        Ok(AccessGuard {
            permissions: self,
            write: write.to_vec(),
            read: read.to_vec(),
        })
    }

    /// Give back what a successful acquisition claimed.
    ///
    /// # Panics
    ///
    /// Panics if a `write` entry is not write-locked or a `read` entry is not
    /// read-locked.
    pub fn release(&self, write: &[TypeIndex], read: &[TypeIndex]) {
        let mut table = self.table.lock();
        for &index in write {
            let slot = self.slot(index);
            assert!(
                table.locks.get(slot) == Some(&-1),
                "release of '{}' which is not write-locked",
                self.types.type_name(index)
            );
            table.locks[slot] = 0;
        }
        for &index in read {
            let slot = self.slot(index);
            assert!(
                table.locks.get(slot).is_some_and(|&lock| lock > 0),
                "release of '{}' which is not read-locked",
                self.types.type_name(index)
            );
            table.locks[slot] -= 1;
        }
    }

    /// Raw counter for `index`: `0` free, `-1` write-locked, `n` readers.
    pub fn lock_value(&self, index: TypeIndex) -> i32 {
        let slot = self.slot(index);
        self.table.lock().locks.get(slot).copied().unwrap_or(0)
    }

    pub fn all_unlocked(&self) -> bool {
        self.table.lock().all_zero()
    }

    fn slot(&self, index: TypeIndex) -> usize {
        assert!(
            index.index() < self.types.type_count(),
            "component type index {index} out of range (type count {})",
            self.types.type_count()
        );
        index.index()
    }

    fn conflict(&self, index: TypeIndex, requested: AccessMode, held: AccessMode) -> AccessConflict {
        let component = self.types.type_name(index).to_owned();
        tracing::warn!(
            component = %component,
            requested = %requested,
            held = %held,
            "component access conflict"
        );
        AccessConflict {
            component,
            index,
            requested,
            held,
        }
    }
}

/// Locks held by one successful [`AccessPermissions::lock`]; released on drop.
#[derive(Debug)]
pub struct AccessGuard<'a> {
    permissions: &'a AccessPermissions,
    write: Vec<TypeIndex>,
    read: Vec<TypeIndex>,
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        self.permissions.release(&self.write, &self.read);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Position;
    #[derive(Debug, Default)]
    struct Velocity;
    #[derive(Debug, Default)]
    struct Health;

    fn permissions() -> (AccessPermissions, [TypeIndex; 3]) {
        let mut builder = ComponentTypeRegistry::builder();
        let a = builder.register::<Position>().index();
        let b = builder.register::<Velocity>().index();
        let c = builder.register::<Health>().index();
        let access = AccessPermissions::new(Arc::new(builder.build()));
        access.set_state(AccessState::Serialized);
        (access, [a, b, c])
    }

    #[test]
    fn writer_excludes_writer_until_released() {
        let (access, [a, ..]) = permissions();
        access.set_state(AccessState::Concurrent);
        assert!(access.try_acquire(&[a], &[]));
        assert!(!access.try_acquire(&[a], &[]));
        access.release(&[a], &[]);
        assert!(access.try_acquire(&[a], &[]));
        access.release(&[a], &[]);
        access.set_state(AccessState::Serialized);
    }

    #[test]
    fn readers_share_and_exclude_writers() {
        let (access, [a, ..]) = permissions();
        assert!(access.try_acquire(&[], &[a]));
        assert!(access.try_acquire(&[], &[a]));
        assert_eq!(access.lock_value(a), 2);

        let conflict = access.acquire(&[a], &[]).unwrap_err();
        assert_eq!(conflict.held, AccessMode::Read);
        assert_eq!(conflict.requested, AccessMode::Write);
        assert_eq!(conflict.component, "Position");

        access.release(&[], &[a]);
        assert!(!access.try_acquire(&[a], &[]));
        access.release(&[], &[a]);
        assert!(access.try_acquire(&[a], &[]));
        assert_eq!(access.lock_value(a), -1);
    }

    #[test]
    fn failed_write_set_rolls_back_earlier_claims() {
        let (access, [a, b, c]) = permissions();
        assert!(access.try_acquire(&[c], &[]));
        assert!(!access.try_acquire(&[a, b, c], &[]));
        assert_eq!(access.lock_value(a), 0);
        assert_eq!(access.lock_value(b), 0);
        assert_eq!(access.lock_value(c), -1);
    }

    #[test]
    fn failed_read_set_rolls_back_reads_and_writes() {
        let (access, [a, b, c]) = permissions();
        assert!(access.try_acquire(&[c], &[]));
        assert!(access.try_acquire(&[], &[b]));

        let conflict = access.acquire(&[a], &[b, c]).unwrap_err();
        assert_eq!(conflict.index, c);
        assert_eq!(conflict.held, AccessMode::Write);
        assert_eq!(access.lock_value(a), 0);
        assert_eq!(access.lock_value(b), 1);
        assert_eq!(access.lock_value(c), -1);
    }

    #[test]
    fn type_in_both_sets_conflicts_with_itself() {
        let (access, [a, ..]) = permissions();
        assert!(!access.try_acquire(&[a], &[a]));
        assert!(access.all_unlocked());
    }

    #[test]
    fn guard_releases_on_drop() {
        let (access, [a, b, _]) = permissions();
        {
            let _guard = access.lock(&[a], &[b]).unwrap();
            assert_eq!(access.lock_value(a), -1);
            assert_eq!(access.lock_value(b), 1);
        }
        assert!(access.all_unlocked());
    }

    #[test]
    fn delete_state_round_trip() {
        let (access, _) = permissions();
        access.set_state(AccessState::SerializedDelete);
        assert_eq!(access.state(), Some(AccessState::SerializedDelete));
        access.set_state(AccessState::Serialized);
        assert_eq!(access.state(), Some(AccessState::Serialized));
    }

    #[test]
    #[should_panic(expected = "while component locks are held")]
    fn entering_concurrent_with_locks_held_panics() {
        let (access, [a, ..]) = permissions();
        assert!(access.try_acquire(&[], &[a]));
        access.set_state(AccessState::Concurrent);
    }

    #[test]
    #[should_panic(expected = "while component locks are held")]
    fn leaving_concurrent_with_locks_held_panics() {
        let (access, [a, ..]) = permissions();
        access.set_state(AccessState::Concurrent);
        assert!(access.try_acquire(&[a], &[]));
        access.set_state(AccessState::Serialized);
    }

    #[test]
    #[should_panic(expected = "illegal access state transition")]
    fn concurrent_to_delete_is_illegal() {
        let (access, _) = permissions();
        access.set_state(AccessState::Concurrent);
        access.set_state(AccessState::SerializedDelete);
    }

    #[test]
    #[should_panic(expected = "illegal access state transition")]
    fn first_state_must_be_serialized() {
        let types = Arc::new(ComponentTypeRegistry::builder().build());
        AccessPermissions::new(types).set_state(AccessState::Concurrent);
    }

    #[test]
    #[should_panic(expected = "not write-locked")]
    fn mismatched_release_panics() {
        let (access, [a, ..]) = permissions();
        assert!(access.try_acquire(&[], &[a]));
        access.release(&[a], &[]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_index_panics() {
        let (access, _) = permissions();
        access.try_acquire(&[TypeIndex::from_raw(9)], &[]);
    }

    #[test]
    #[should_panic(expected = "coordinating thread")]
    fn set_state_off_coordinator_panics() {
        let (access, _) = permissions();
        let result = std::thread::scope(|scope| {
            scope
                .spawn(|| access.set_state(AccessState::Concurrent))
                .join()
        });
        if let Err(payload) = result {
            std::panic::resume_unwind(payload);
        }
    }

    #[test]
    fn install_places_permissions_in_context() {
        let types = Arc::new(ComponentTypeRegistry::builder().build());
        let mut store = EntityStore::new();
        AccessPermissions::install(&mut store, types);
        let access = store.ctx::<AccessPermissions>().unwrap();
        assert!(access.is_coordinator_thread());
        assert_eq!(access.state(), None);
    }
}
