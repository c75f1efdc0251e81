//! Typed handles onto one named cache partition.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::cache::Cache;
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::state::{CacheState, ErasedValue, identity};

/// A namespaced `key → object` partition of a [`Cache`].
///
/// Keys and objects are in bijection: a key holds one object, and an object
/// (by identity, i.e. the `Arc` allocation) is bound to at most one key in
/// the whole cache.
pub struct SubCache<T> {
    cache: Cache,
    name: Arc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SubCache<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            name: Arc::clone(&self.name),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for SubCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubCache")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn downcast<T: Any + Send + Sync>(value: ErasedValue, partition: &str) -> Result<Arc<T>, CacheError> {
    value
        .downcast::<T>()
        .map_err(|_| CacheError::PartitionTypeMismatch {
            name: partition.to_owned(),
            expected: "<erased>",
            requested: std::any::type_name::<T>(),
        })
}

impl<T: Any + Send + Sync> SubCache<T> {
    pub(crate) fn new(cache: Cache, name: &str) -> Self {
        Self {
            cache,
            name: Arc::from(name),
            _marker: PhantomData,
        }
    }

    /// Partition name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cache this partition belongs to.
    #[must_use]
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    fn not_found(&self, key: &str) -> CacheError {
        CacheError::KeyNotFound {
            partition: self.name.to_string(),
            key: key.to_owned(),
        }
    }

    fn handle(&self, state: &CacheState, key: &str) -> Result<CacheEntry<T>, CacheError> {
        let id = state.lookup(&self.name, key).ok_or_else(|| self.not_found(key))?;
        let slot = state.slot(id).ok_or_else(|| self.not_found(key))?;
        let value = downcast::<T>(Arc::clone(&slot.value), &self.name)?;
        Ok(self.cache.entry_handle(id, value))
    }

    /// Look up `key` and record the access.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::KeyNotFound`] on a miss.
    pub fn get(&self, key: &str) -> Result<Arc<T>, CacheError> {
        let mut state = self.cache.lock();
        match self.handle(&state, key) {
            Ok(entry) => {
                state.touch(entry.id());
                state.stats.hits += 1;
                tracing::trace!(partition = %self.name, key, "cache hit");
                Ok(entry.into_value())
            }
            Err(err) => {
                if err.is_not_found() {
                    state.stats.misses += 1;
                    tracing::trace!(partition = %self.name, key, "cache miss");
                }
                Err(err)
            }
        }
    }

    /// Handle onto the entry under `key`, without recording an access.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::KeyNotFound`] on a miss.
    pub fn entry(&self, key: &str) -> Result<CacheEntry<T>, CacheError> {
        let state = self.cache.lock();
        self.handle(&state, key)
    }

    /// Bind `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::DuplicateKey`] if the key is taken and
    /// [`CacheError::AlreadyOwned`] if the object is already cached.
    pub fn insert(&self, key: &str, value: Arc<T>) -> Result<CacheEntry<T>, CacheError> {
        let id = self
            .cache
            .lock()
            .insert(&self.name, key, Arc::clone(&value) as ErasedValue)?;
        Ok(self.cache.entry_handle(id, value))
    }

    /// Bind `value` under `key`, replacing whatever was there.
    ///
    /// Removal and insertion happen under one lock acquisition, so concurrent
    /// writers resolve as last-insert-wins. Returns the replaced object.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::AlreadyOwned`] if the object is already cached
    /// under a different key.
    pub fn replace(&self, key: &str, value: Arc<T>) -> Result<Option<Arc<T>>, CacheError> {
        let mut state = self.cache.lock();
        let erased = Arc::clone(&value) as ErasedValue;
        let previous = match state.lookup(&self.name, key) {
            Some(id) => {
                let slot = state.slot(id).ok_or_else(|| self.not_found(key))?;
                if identity(&slot.value) == identity(&erased) {
                    state.touch(id);
                    return Ok(None);
                }
                Some((id, downcast::<T>(Arc::clone(&slot.value), &self.name)?))
            }
            None => None,
        };

        // Nothing is unbound until the new object is known to be insertable.
        state.ensure_unowned(identity(&erased))?;
        if let Some((id, _)) = &previous {
            state.remove(*id);
        }
        state.insert(&self.name, key, erased)?;
        Ok(previous.map(|(_, old)| old))
    }

    /// Remove the object under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::KeyNotFound`] on a miss.
    pub fn remove(&self, key: &str) -> Result<Arc<T>, CacheError> {
        let mut state = self.cache.lock();
        let id = state.lookup(&self.name, key).ok_or_else(|| self.not_found(key))?;
        let slot = state.remove(id).ok_or_else(|| self.not_found(key))?;
        downcast::<T>(slot.value, &self.name)
    }

    /// Whether `key` is bound.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.cache.lock().lookup(&self.name, key).is_some()
    }

    /// Key an object is bound to in this partition, if any.
    #[must_use]
    pub fn key_of(&self, value: &Arc<T>) -> Option<String> {
        self.cache
            .lock()
            .key_of(&self.name, identity(value))
            .map(str::to_owned)
    }

    /// All keys, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.cache.lock().keys(&self.name)
    }

    /// Number of objects in the partition.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().partition_len(&self.name)
    }

    /// Whether the partition is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every object. Returns how many were removed.
    pub fn clear(&self) -> usize {
        self.cache.lock().clear_partition(&self.name)
    }
}
