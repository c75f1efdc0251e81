//! The [`Cachable`] capability and handles onto cached objects.

use std::sync::{Arc, Mutex, Weak};

use crate::cache::lock_state;
use crate::state::CacheState;

/// Position of an access on the cache's logical clock.
///
/// Every insert and touch takes a fresh, strictly larger stamp.
/// [`AccessStamp::OLDEST`] is reserved for proposed evictions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccessStamp(pub(crate) u64);

impl AccessStamp {
    /// Older than any real access.
    pub const OLDEST: Self = Self(0);

    /// Raw clock value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Arena index of a cached object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub(crate) u64);

/// Capability an object needs to take part in caching.
pub trait Cachable {
    /// Record an access, moving the object to the young end of the eviction
    /// order.
    fn touch(&self);

    /// Remove the object from its partition.
    ///
    /// Returns `false` if it was not cached (any more).
    fn uncache(&self) -> bool;

    /// Stamp of the last access, or `None` while not cached.
    fn last_access(&self) -> Option<AccessStamp>;
}

/// Handle onto an object owned by a cache partition.
///
/// Holds a weak back-reference to the cache, so an entry handle never keeps
/// a cache alive and goes inert once the object is removed.
pub struct CacheEntry<T> {
    state: Weak<Mutex<CacheState>>,
    id: EntryId,
    value: Arc<T>,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            state: Weak::clone(&self.state),
            id: self.id,
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> std::fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<T> CacheEntry<T> {
    pub(crate) fn new(state: Weak<Mutex<CacheState>>, id: EntryId, value: Arc<T>) -> Self {
        Self { state, id, value }
    }

    /// Arena id of the entry.
    #[must_use]
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// The cached object.
    #[must_use]
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// Consume the handle, keeping the object.
    #[must_use]
    pub fn into_value(self) -> Arc<T> {
        self.value
    }

    /// Whether the object is still bound to this entry.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.with_state(|state| state.slot(self.id).is_some())
            .unwrap_or(false)
    }

    /// Make this object the first eviction candidate without removing it.
    pub fn propose_eviction(&self) -> bool {
        self.with_state(|state| state.propose_eviction(self.id))
            .unwrap_or(false)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut CacheState) -> R) -> Option<R> {
        let state = self.state.upgrade()?;
        let mut guard = lock_state(&state);
        Some(f(&mut guard))
    }
}

impl<T> Cachable for CacheEntry<T> {
    fn touch(&self) {
        self.with_state(|state| state.touch(self.id));
    }

    fn uncache(&self) -> bool {
        self.with_state(|state| state.remove(self.id).is_some())
            .unwrap_or(false)
    }

    fn last_access(&self) -> Option<AccessStamp> {
        self.with_state(|state| state.slot(self.id).map(|slot| slot.stamp))
            .flatten()
    }
}
