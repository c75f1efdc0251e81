//! The shared [`Cache`] and its global limit.

use std::any::Any;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::entry::{AccessStamp, CacheEntry};
use crate::error::CacheError;
use crate::file::{FileLoader, FileSourcedCache, Loaded};
use crate::partition::SubCache;
use crate::state::{CacheState, CacheStats};

/// Lock the cache state.
///
/// Every state transition completes before the guard is released, so a
/// poisoned lock still holds consistent bookkeeping and is recovered.
pub(crate) fn lock_state(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A partitioned object cache with an optional global soft limit.
///
/// `Cache` is a cheap handle: clones share the same partitions. Construct one
/// per server and pass it to whoever needs it.
///
/// # Limit
///
/// With a limit of 0 the cache grows without bound and keeps no eviction
/// order. With a positive limit every entry, whatever its partition, sits in
/// a single order sorted by last access; [`Cache::enforce_limit`] trims the
/// oldest entries. The limit is soft: it is only applied when
/// `enforce_limit` runs, typically once at the end of each request.
///
/// # Thread Safety
///
/// One mutex per cache serializes all bookkeeping (touches included). No
/// file I/O happens while it is held.
#[derive(Clone, Default)]
pub struct Cache {
    state: Arc<Mutex<CacheState>>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Cache")
            .field("entries", &state.len())
            .field("limit", &state.limit())
            .finish_non_exhaustive()
    }
}

impl Cache {
    /// Create an unlimited cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache with the given limit (0 = unlimited).
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        let cache = Self::new();
        cache.lock().set_limit(limit);
        cache
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CacheState> {
        lock_state(&self.state)
    }

    pub(crate) fn entry_handle<T>(&self, id: crate::EntryId, value: Arc<T>) -> CacheEntry<T> {
        CacheEntry::new(Arc::downgrade(&self.state), id, value)
    }

    /// Get the partition `name`, creating a plain one if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::PartitionTypeMismatch`] if the partition exists
    /// with a different value type.
    pub fn partition<T: Any + Send + Sync>(&self, name: &str) -> Result<SubCache<T>, CacheError> {
        self.lock().ensure_partition::<T>(name, false)?;
        Ok(SubCache::new(self.clone(), name))
    }

    /// Create a new partition `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::PartitionKeyConflict`] if the name is taken.
    pub fn create_partition<T: Any + Send + Sync>(
        &self,
        name: &str,
    ) -> Result<SubCache<T>, CacheError> {
        self.lock().ensure_partition::<T>(name, true)?;
        Ok(SubCache::new(self.clone(), name))
    }

    /// Create a file-sourced partition whose keys are resolved against `root`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::PartitionKeyConflict`] if the name is taken.
    pub fn file_partition<L: FileLoader>(
        &self,
        name: &str,
        root: impl Into<PathBuf>,
        loader: L,
    ) -> Result<FileSourcedCache<L>, CacheError> {
        let entries = self.create_partition::<Loaded<L::Output>>(name)?;
        Ok(FileSourcedCache::new(entries, root.into(), loader))
    }

    /// Set the global limit.
    ///
    /// - `0` disables limiting and drops the eviction order.
    /// - Going from unlimited to a positive limit rebuilds the order from
    ///   every partition; nothing is evicted until [`Cache::enforce_limit`].
    /// - Changing between positive limits evicts immediately.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidLimit`] for a negative limit; the cache is
    /// left untouched.
    pub fn set_limit(&self, limit: i64) -> Result<(), CacheError> {
        let limit = usize::try_from(limit).map_err(|_| CacheError::InvalidLimit(limit))?;
        let evicted = self.lock().set_limit(limit);
        tracing::info!(limit, evicted, "cache limit set");
        Ok(())
    }

    /// Current limit (0 = unlimited).
    #[must_use]
    pub fn limit(&self) -> usize {
        self.lock().limit()
    }

    /// Evict the least recently accessed entries until the cache is within
    /// its limit. No-op when unlimited.
    ///
    /// Returns the number of evicted entries.
    pub fn enforce_limit(&self) -> usize {
        let evicted = self.lock().evict();
        if evicted > 0 {
            tracing::debug!(evicted, "enforced cache limit");
        }
        evicted
    }

    /// Mark an entry as the oldest so it is evicted first, without removing
    /// it. Returns `false` if the entry is no longer cached.
    pub fn propose_eviction<T>(&self, entry: &CacheEntry<T>) -> bool {
        self.lock().propose_eviction(entry.id())
    }

    /// Total number of cached objects across partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all partitions, sorted.
    #[must_use]
    pub fn partition_names(&self) -> Vec<String> {
        self.lock().partition_names()
    }

    /// Snapshot of the eviction order as `(stamp, partition, key)`, oldest
    /// first. `None` while unlimited.
    #[must_use]
    pub fn global_order(&self) -> Option<Vec<(AccessStamp, String, String)>> {
        self.lock().order_snapshot()
    }

    /// Hit, miss and eviction counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cachable;
    use pretty_assertions::assert_eq;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_cache_is_send_sync() {
        assert_send_sync::<Cache>();
        assert_send_sync::<SubCache<String>>();
    }

    #[test]
    fn test_concurrent_access_keeps_order_consistent() {
        let cache = Cache::with_limit(8);
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let cache = &cache;
                scope.spawn(move || {
                    let part = cache
                        .partition::<String>(&format!("part-{}", worker % 2))
                        .unwrap();
                    for i in 0..50 {
                        let key = format!("w{worker}-{i}");
                        let entry = part.insert(&key, Arc::new(key.clone())).unwrap();
                        entry.touch();
                        let _ = part.get(&format!("w{worker}-{}", i / 2));
                    }
                });
            }
            let cache = &cache;
            scope.spawn(move || {
                for _ in 0..50 {
                    cache.enforce_limit();
                }
            });
        });
        cache.enforce_limit();

        assert_eq!(cache.len(), 8);
        let order = cache.global_order().unwrap();
        assert_eq!(order.len(), cache.len());
        assert!(order.windows(2).all(|pair| pair[0].0 <= pair[1].0));
        assert_eq!(cache.stats().inserts, 200);
    }

    fn fill(cache: &Cache, partition: &str, keys: &[&str]) -> Vec<CacheEntry<String>> {
        let part = cache.partition::<String>(partition).unwrap();
        keys.iter()
            .map(|k| part.insert(k, Arc::new((*k).to_owned())).unwrap())
            .collect()
    }

    fn live_keys(cache: &Cache, partition: &str) -> Vec<String> {
        let mut keys = cache.partition::<String>(partition).unwrap().keys();
        keys.sort();
        keys
    }

    const TEN: [&str; 10] = ["d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7", "d8", "d9"];

    #[test]
    fn test_enforce_limit_keeps_most_recent() {
        let cache = Cache::with_limit(1);
        fill(&cache, "docs", &TEN);
        assert_eq!(cache.len(), 10);

        assert_eq!(cache.enforce_limit(), 9);
        assert_eq!(live_keys(&cache, "docs"), vec!["d9"]);
        assert_eq!(cache.stats().evictions, 9);
    }

    #[test]
    fn test_propose_eviction_moves_entry_to_front() {
        let cache = Cache::new();
        let entries = fill(&cache, "docs", &TEN);

        assert!(cache.propose_eviction(&entries[9]));
        cache.set_limit(1).unwrap();
        cache.enforce_limit();

        assert_eq!(live_keys(&cache, "docs"), vec!["d8"]);
        assert!(!entries[9].is_cached());
    }

    #[test]
    fn test_touch_protects_from_eviction() {
        let cache = Cache::with_limit(2);
        let entries = fill(&cache, "docs", &["a", "b", "c"]);
        entries[0].touch();
        cache.enforce_limit();
        assert_eq!(live_keys(&cache, "docs"), vec!["a", "c"]);
    }

    #[test]
    fn test_unlimited_enforce_is_noop() {
        let cache = Cache::new();
        fill(&cache, "docs", &TEN);
        assert_eq!(cache.enforce_limit(), 0);
        assert_eq!(cache.len(), 10);
        assert!(cache.global_order().is_none());
    }

    #[test]
    fn test_rebuilt_order_spans_partitions_sorted_by_access() {
        let cache = Cache::with_limit(100);
        let pages = fill(&cache, "pages", &["p1", "p2"]);
        let styles = fill(&cache, "styles", &["s1", "s2"]);
        pages[0].touch();

        cache.set_limit(0).unwrap();
        assert!(cache.global_order().is_none());

        // Accesses keep being stamped while unlimited
        styles[0].touch();
        fill(&cache, "data", &["x"]);

        cache.set_limit(50).unwrap();
        let order: Vec<_> = cache
            .global_order()
            .unwrap()
            .into_iter()
            .map(|(_, partition, key)| format!("{partition}/{key}"))
            .collect();
        assert_eq!(
            order,
            vec!["pages/p2", "styles/s2", "pages/p1", "styles/s1", "data/x"]
        );

        let stamps: Vec<_> = cache
            .global_order()
            .unwrap()
            .into_iter()
            .map(|(stamp, _, _)| stamp)
            .collect();
        let mut sorted = stamps.clone();
        sorted.sort();
        assert_eq!(stamps, sorted);
        assert_eq!(stamps.len(), cache.len());
    }

    #[test]
    fn test_rebuild_does_not_evict() {
        let cache = Cache::new();
        fill(&cache, "docs", &TEN);
        cache.set_limit(3).unwrap();
        assert_eq!(cache.len(), 10);
        cache.enforce_limit();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_changing_positive_limit_evicts() {
        let cache = Cache::with_limit(10);
        fill(&cache, "docs", &TEN);
        cache.set_limit(4).unwrap();
        assert_eq!(live_keys(&cache, "docs"), vec!["d6", "d7", "d8", "d9"]);
    }

    #[test]
    fn test_negative_limit_rejected_without_change() {
        let cache = Cache::with_limit(5);
        let err = cache.set_limit(-1).unwrap_err();
        assert!(matches!(err, CacheError::InvalidLimit(-1)));
        assert_eq!(cache.limit(), 5);
        assert!(cache.global_order().is_some());
    }

    #[test]
    fn test_partition_type_mismatch() {
        let cache = Cache::new();
        cache.partition::<String>("docs").unwrap();
        let err = cache.partition::<u32>("docs").unwrap_err();
        assert!(matches!(err, CacheError::PartitionTypeMismatch { .. }));
    }

    #[test]
    fn test_create_partition_conflict() {
        let cache = Cache::new();
        cache.partition::<String>("docs").unwrap();
        let err = cache.create_partition::<String>("docs").unwrap_err();
        assert!(matches!(err, CacheError::PartitionKeyConflict(name) if name == "docs"));
    }

    #[test]
    fn test_partition_names_sorted() {
        let cache = Cache::new();
        cache.partition::<String>("zeta").unwrap();
        cache.partition::<String>("alpha").unwrap();
        assert_eq!(cache.partition_names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_entry_handle_outlives_cache() {
        let entry = {
            let cache = Cache::new();
            fill(&cache, "docs", &["a"]).remove(0)
        };
        assert!(!entry.is_cached());
        assert!(!entry.uncache());
        assert_eq!(entry.last_access(), None);
        assert_eq!(entry.value().as_str(), "a");
    }
}
