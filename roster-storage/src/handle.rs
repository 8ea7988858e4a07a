//! Entity handles and fetch modes.
//!
//! A fetch is either detached or tracked, chosen by a type parameter at the
//! call site:
//!
//! - [`Detached`] yields a [`Snapshot`]: an owned, read-only copy. Nothing is
//!   registered with the unit of work, so a snapshot can never be flushed.
//! - [`Tracking`] yields a [`Tracked`] handle registered with the unit of work.
//!   Mutations made through [`Tracked::modify`] are detected and written by
//!   the next save.
//!
//! Because the handle type differs per mode, mutating a detached read does
//! not compile.

use crate::error::RepositoryError;
use crate::record::{Entity, EntityKey, EntityRecord};
use crate::repository::UnitOfWork;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Read access shared by both handle kinds.
pub trait EntityHandle<E: Entity>: Send + Sync {
    /// Identifier of the entity behind the handle.
    fn id(&self) -> E::Id;

    /// Owned copy of the current value.
    fn get(&self) -> E;
}

/// Selects how the repository hands out fetched entities.
pub trait FetchMode: Send + Sync + 'static {
    /// Change-tracking hint passed to the store.
    const TRACKING: bool;

    type Handle<E: Entity>: EntityHandle<E>;

    /// Wrap a value loaded from the store.
    fn attach<E: Entity>(uow: &UnitOfWork, entity: E) -> Self::Handle<E>;
}

/// Read-only fetches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

/// Fetches whose mutations are persisted on save.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tracking;

impl FetchMode for Detached {
    const TRACKING: bool = false;

    type Handle<E: Entity> = Snapshot<E>;

    fn attach<E: Entity>(_uow: &UnitOfWork, entity: E) -> Snapshot<E> {
        Snapshot(entity)
    }
}

impl FetchMode for Tracking {
    const TRACKING: bool = true;

    type Handle<E: Entity> = Tracked<E>;

    fn attach<E: Entity>(uow: &UnitOfWork, entity: E) -> Tracked<E> {
        uow.track(entity)
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Detached copy of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<E>(E);

impl<E> Snapshot<E> {
    pub fn into_inner(self) -> E {
        self.0
    }
}

impl<E> Deref for Snapshot<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.0
    }
}

impl<E: Entity> EntityHandle<E> for Snapshot<E> {
    fn id(&self) -> E::Id {
        self.0.id()
    }

    fn get(&self) -> E {
        self.0.clone()
    }
}

// ============================================================================
// TRACKED
// ============================================================================

struct TrackedState<E> {
    /// Value as last loaded or committed.
    original: E,
    current: E,
}

pub(crate) struct TrackedCell<E> {
    state: Mutex<TrackedState<E>>,
}

impl<E: Entity> TrackedCell<E> {
    pub(crate) fn new(entity: E) -> Self {
        Self {
            state: Mutex::new(TrackedState {
                original: entity.clone(),
                current: entity,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackedState<E>> {
        // State is two plain values; a panic mid-closure cannot break it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Type-erased view of a tracked cell used by the unit of work at save time.
pub(crate) trait TrackedEntry: Send + Sync {
    fn key(&self) -> EntityKey;

    /// The record to write, if the value changed since it was loaded.
    fn pending(&self) -> Result<Option<EntityRecord>, RepositoryError>;

    /// Mark the current value as persisted.
    fn accept(&self);
}

impl<E: Entity> TrackedEntry for TrackedCell<E> {
    fn key(&self) -> EntityKey {
        self.lock().original.key()
    }

    fn pending(&self) -> Result<Option<EntityRecord>, RepositoryError> {
        let state = self.lock();
        if state.current == state.original {
            return Ok(None);
        }
        let key = state.original.key();
        if state.current.key() != key {
            return Err(RepositoryError::IdentityChanged {
                kind: key.kind(),
                id: key.id_string(),
            });
        }
        Ok(Some(state.current.clone().into_record()))
    }

    fn accept(&self) {
        let mut state = self.lock();
        state.original = state.current.clone();
    }
}

/// Change-tracked entity handle.
///
/// Clones share state: every handle to the same entity within one unit of
/// work sees the same value.
pub struct Tracked<E> {
    cell: Arc<TrackedCell<E>>,
}

impl<E> Clone for Tracked<E> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<E: Entity> Tracked<E> {
    pub(crate) fn from_cell(cell: Arc<TrackedCell<E>>) -> Self {
        Self { cell }
    }

    /// Borrow the current value.
    pub fn read<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.cell.lock().current)
    }

    /// Mutate the current value. The change is written on the next save.
    pub fn modify<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        f(&mut self.cell.lock().current)
    }

    /// Whether the value differs from what was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        let state = self.cell.lock();
        state.current != state.original
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<E: Entity> EntityHandle<E> for Tracked<E> {
    fn id(&self) -> E::Id {
        self.read(|e| e.id())
    }

    fn get(&self) -> E {
        self.read(E::clone)
    }
}

impl<E: Entity + fmt::Debug> fmt::Debug for Tracked<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.cell.lock();
        f.debug_struct("Tracked")
            .field("current", &state.current)
            .field("dirty", &(state.current != state.original))
            .finish()
    }
}
