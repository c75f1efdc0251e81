//! Shared cache bookkeeping guarded by the cache mutex.
//!
//! Entries live in an arena keyed by [`EntryId`]. Partitions map keys to ids
//! and object identities back to keys; the global order, when a limit is set,
//! holds every live `(stamp, id)` pair sorted ascending.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::entry::{AccessStamp, EntryId};
use crate::error::CacheError;

/// Type-erased cached object.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Hit, miss and eviction counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Successful lookups.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Objects inserted.
    pub inserts: u64,
    /// Objects removed by [`crate::Cache::enforce_limit`].
    pub evictions: u64,
}

pub(crate) struct Partition {
    type_id: TypeId,
    type_name: &'static str,
    keys: HashMap<String, EntryId>,
    reverse: HashMap<usize, String>,
}

pub(crate) struct Slot {
    pub(crate) partition: String,
    pub(crate) key: String,
    identity: usize,
    pub(crate) stamp: AccessStamp,
    pub(crate) value: ErasedValue,
}

#[derive(Default)]
pub(crate) struct CacheState {
    partitions: HashMap<String, Partition>,
    slots: HashMap<EntryId, Slot>,
    owners: HashMap<usize, EntryId>,
    limit: usize,
    order: Option<BTreeSet<(AccessStamp, EntryId)>>,
    clock: u64,
    next_id: u64,
    pub(crate) stats: CacheStats,
}

/// Address of the shared allocation, used as the object's identity.
pub(crate) fn identity<T: ?Sized>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value).cast::<()>().addr()
}

impl CacheState {
    fn tick(&mut self) -> AccessStamp {
        self.clock += 1;
        AccessStamp(self.clock)
    }

    /// Register a partition for values of type `T`.
    ///
    /// With `exclusive`, an existing partition is a conflict; otherwise it is
    /// reused if its value type matches.
    pub(crate) fn ensure_partition<T: Any>(
        &mut self,
        name: &str,
        exclusive: bool,
    ) -> Result<(), CacheError> {
        if let Some(existing) = self.partitions.get(name) {
            if exclusive {
                return Err(CacheError::PartitionKeyConflict(name.to_owned()));
            }
            if existing.type_id != TypeId::of::<T>() {
                return Err(CacheError::PartitionTypeMismatch {
                    name: name.to_owned(),
                    expected: existing.type_name,
                    requested: std::any::type_name::<T>(),
                });
            }
            return Ok(());
        }

        tracing::debug!(partition = name, "creating cache partition");
        self.partitions.insert(
            name.to_owned(),
            Partition {
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                keys: HashMap::new(),
                reverse: HashMap::new(),
            },
        );
        Ok(())
    }

    fn partition(&self, name: &str) -> Option<&Partition> {
        self.partitions.get(name)
    }

    pub(crate) fn lookup(&self, partition: &str, key: &str) -> Option<EntryId> {
        self.partition(partition)?.keys.get(key).copied()
    }

    pub(crate) fn slot(&self, id: EntryId) -> Option<&Slot> {
        self.slots.get(&id)
    }

    pub(crate) fn key_of(&self, partition: &str, identity: usize) -> Option<&str> {
        self.partition(partition)?
            .reverse
            .get(&identity)
            .map(String::as_str)
    }

    pub(crate) fn keys(&self, partition: &str) -> Vec<String> {
        self.partition(partition)
            .map(|p| p.keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn partition_len(&self, partition: &str) -> usize {
        self.partition(partition).map_or(0, |p| p.keys.len())
    }

    pub(crate) fn partition_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.partitions.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    /// Fail with [`CacheError::AlreadyOwned`] if an object is bound anywhere.
    pub(crate) fn ensure_unowned(&self, identity: usize) -> Result<(), CacheError> {
        match self.owners.get(&identity).and_then(|id| self.slots.get(id)) {
            Some(owner) => Err(CacheError::AlreadyOwned {
                partition: owner.partition.clone(),
                key: owner.key.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Bind `value` under `key`, stamping it as just accessed.
    pub(crate) fn insert(
        &mut self,
        partition: &str,
        key: &str,
        value: ErasedValue,
    ) -> Result<EntryId, CacheError> {
        let identity = identity(&value);
        self.ensure_unowned(identity)?;
        if self.lookup(partition, key).is_some() {
            return Err(CacheError::DuplicateKey {
                partition: partition.to_owned(),
                key: key.to_owned(),
            });
        }

        self.next_id += 1;
        let id = EntryId(self.next_id);
        let stamp = self.tick();

        let Some(part) = self.partitions.get_mut(partition) else {
            return Err(CacheError::KeyNotFound {
                partition: partition.to_owned(),
                key: key.to_owned(),
            });
        };
        part.keys.insert(key.to_owned(), id);
        part.reverse.insert(identity, key.to_owned());

        self.owners.insert(identity, id);
        self.slots.insert(
            id,
            Slot {
                partition: partition.to_owned(),
                key: key.to_owned(),
                identity,
                stamp,
                value,
            },
        );
        if let Some(order) = self.order.as_mut() {
            order.insert((stamp, id));
        }
        self.stats.inserts += 1;
        Ok(id)
    }

    /// Move an entry to a new stamp, keeping the global order sorted.
    fn restamp(&mut self, id: EntryId, stamp: AccessStamp) -> Option<AccessStamp> {
        let slot = self.slots.get_mut(&id)?;
        let old = std::mem::replace(&mut slot.stamp, stamp);
        if let Some(order) = self.order.as_mut() {
            order.remove(&(old, id));
            order.insert((stamp, id));
        }
        Some(stamp)
    }

    pub(crate) fn touch(&mut self, id: EntryId) -> Option<AccessStamp> {
        if !self.slots.contains_key(&id) {
            return None;
        }
        let stamp = self.tick();
        self.restamp(id, stamp)
    }

    pub(crate) fn propose_eviction(&mut self, id: EntryId) -> bool {
        self.restamp(id, AccessStamp::OLDEST).is_some()
    }

    /// Unbind an entry from its partition, the owner table and the order.
    pub(crate) fn remove(&mut self, id: EntryId) -> Option<Slot> {
        let slot = self.slots.remove(&id)?;
        if let Some(part) = self.partitions.get_mut(&slot.partition) {
            part.keys.remove(&slot.key);
            part.reverse.remove(&slot.identity);
        }
        self.owners.remove(&slot.identity);
        if let Some(order) = self.order.as_mut() {
            order.remove(&(slot.stamp, id));
        }
        Some(slot)
    }

    /// Change the limit. Returns the number of entries evicted.
    pub(crate) fn set_limit(&mut self, limit: usize) -> usize {
        let previous = std::mem::replace(&mut self.limit, limit);
        if limit == 0 {
            self.order = None;
            return 0;
        }
        if previous == 0 {
            self.rebuild_order();
            return 0;
        }
        self.evict()
    }

    fn rebuild_order(&mut self) {
        self.order = Some(
            self.slots
                .iter()
                .map(|(id, slot)| (slot.stamp, *id))
                .collect(),
        );
    }

    /// Evict least recently accessed entries until within the limit.
    pub(crate) fn evict(&mut self) -> usize {
        let limit = self.limit;
        let mut evicted = 0;
        loop {
            let Some(order) = self.order.as_mut() else {
                return 0;
            };
            if order.len() <= limit {
                break;
            }
            let Some((_, id)) = order.pop_first() else {
                break;
            };
            if let Some(slot) = self.remove(id) {
                tracing::debug!(partition = %slot.partition, key = %slot.key, "evicted cache entry");
                evicted += 1;
            }
        }
        self.stats.evictions += evicted as u64;
        evicted
    }

    pub(crate) fn order_snapshot(&self) -> Option<Vec<(AccessStamp, String, String)>> {
        let order = self.order.as_ref()?;
        Some(
            order
                .iter()
                .filter_map(|(stamp, id)| {
                    let slot = self.slots.get(id)?;
                    Some((*stamp, slot.partition.clone(), slot.key.clone()))
                })
                .collect(),
        )
    }

    /// Drop every entry of a partition.
    pub(crate) fn clear_partition(&mut self, partition: &str) -> usize {
        let ids: Vec<EntryId> = self
            .partition(partition)
            .map(|p| p.keys.values().copied().collect())
            .unwrap_or_default();
        let count = ids.len();
        for id in ids {
            self.remove(id);
        }
        count
    }
}
