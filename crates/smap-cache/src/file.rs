//! File-sourced cache partitions.
//!
//! [`FileSourcedCache`] resolves logical file names against a root directory
//! and loads files through a [`FileLoader`] on a miss. Each cached object
//! remembers the modification time it was loaded at, so a changed file is
//! reloaded and a deleted one reported as lost.
//!
//! Loads run without the cache lock held. Two concurrent misses on the same
//! key both load; the later insert replaces the earlier one.

use std::fs;
use std::io::ErrorKind;
use std::ops::Deref;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::partition::SubCache;

/// Decodes a file into a cacheable object.
pub trait FileLoader: Send + Sync + 'static {
    /// Decoded object type.
    type Output: Send + Sync + 'static;
    /// Loader failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read and decode the file at `path`.
    fn load(&self, path: &Path) -> Result<Self::Output, Self::Error>;
}

/// A loaded file together with the modification time it was read at.
#[derive(Debug)]
pub struct Loaded<T> {
    value: T,
    path: PathBuf,
    modified: SystemTime,
}

impl<T> Loaded<T> {
    /// The decoded object.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Resolved file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File modification time when loaded.
    #[must_use]
    pub fn modified(&self) -> SystemTime {
        self.modified
    }
}

impl<T> Deref for Loaded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// A [`SubCache`] keyed by file names relative to a root directory.
pub struct FileSourcedCache<L: FileLoader> {
    entries: SubCache<Loaded<L::Output>>,
    root: PathBuf,
    loader: Arc<L>,
}

impl<L: FileLoader> std::fmt::Debug for FileSourcedCache<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSourcedCache")
            .field("partition", &self.entries.name())
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl<L: FileLoader> Clone for FileSourcedCache<L> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            root: self.root.clone(),
            loader: Arc::clone(&self.loader),
        }
    }
}

/// Modification time of `path`.
fn stat_modified(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

impl<L: FileLoader> FileSourcedCache<L> {
    pub(crate) fn new(entries: SubCache<Loaded<L::Output>>, root: PathBuf, loader: L) -> Self {
        Self {
            entries,
            root,
            loader: Arc::new(loader),
        }
    }

    /// Root directory keys are resolved against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Underlying partition (keyed by resolved path).
    #[must_use]
    pub fn partition(&self) -> &SubCache<Loaded<L::Output>> {
        &self.entries
    }

    /// Resolve a logical file name to a path under the root.
    ///
    /// Rejects absolute names and names containing `..` so keys cannot escape
    /// the root.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidPath`] for such names.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, CacheError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || key.is_empty() {
            return Err(CacheError::InvalidPath(relative.to_path_buf()));
        }
        Ok(self.root.join(relative))
    }

    fn storage_key(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    /// Map a `stat` failure to an error. Only a missing file counts as lost,
    /// and only then is its cached object dropped.
    fn stat_failed(&self, path: PathBuf, source: std::io::Error) -> CacheError {
        if source.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %source, "failed to stat file");
            return CacheError::Stat { path, source };
        }
        if self.entries.remove(&Self::storage_key(&path)).is_ok() {
            tracing::warn!(path = %path.display(), "cached file disappeared");
        }
        CacheError::ResourceLost { path, source }
    }

    /// Get the object for `key`, loading it if it is not cached or the file
    /// changed since it was loaded.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ResourceLost`] if the file does not exist,
    /// [`CacheError::Stat`] if it cannot be inspected,
    /// [`CacheError::Load`] if the loader fails and
    /// [`CacheError::InvalidPath`] for keys escaping the root.
    pub fn get(&self, key: &str) -> Result<Arc<Loaded<L::Output>>, CacheError> {
        let path = self.resolve(key)?;
        let storage_key = Self::storage_key(&path);
        let modified = match stat_modified(&path) {
            Ok(modified) => modified,
            Err(source) => return Err(self.stat_failed(path, source)),
        };

        match self.entries.get(&storage_key) {
            Ok(cached) if cached.modified == modified => return Ok(cached),
            Ok(_) => tracing::debug!(path = %path.display(), "file changed, reloading"),
            Err(err) if err.is_not_found() => {
                tracing::debug!(path = %path.display(), "loading file");
            }
            Err(err) => return Err(err),
        }

        let value = self.loader.load(&path).map_err(|source| CacheError::Load {
            path: path.clone(),
            source: Box::new(source),
        })?;
        let loaded = Arc::new(Loaded {
            value,
            path,
            modified,
        });
        self.entries.replace(&storage_key, Arc::clone(&loaded))?;
        Ok(loaded)
    }

    /// Modification time of the file behind `key`, without loading it.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ResourceLost`] if the file does not exist; any
    /// cached object for it is dropped. Other `stat` failures return
    /// [`CacheError::Stat`] and leave the cached object in place.
    pub fn last_modified(&self, key: &str) -> Result<SystemTime, CacheError> {
        let path = self.resolve(key)?;
        stat_modified(&path).map_err(|source| self.stat_failed(path, source))
    }

    /// Whether `key` is currently cached (without checking the file).
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.resolve(key)
            .is_ok_and(|path| self.entries.contains(&Self::storage_key(&path)))
    }

    /// Handle onto the cached object for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::KeyNotFound`] if it is not cached.
    pub fn entry(&self, key: &str) -> Result<CacheEntry<Loaded<L::Output>>, CacheError> {
        let path = self.resolve(key)?;
        self.entries.entry(&Self::storage_key(&path))
    }

    /// Drop the cached object for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::KeyNotFound`] if it is not cached.
    pub fn remove(&self, key: &str) -> Result<Arc<Loaded<L::Output>>, CacheError> {
        let path = self.resolve(key)?;
        self.entries.remove(&Self::storage_key(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::TextLoader;
    use crate::{Cachable, Cache};
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Text loader that counts how often it runs.
    #[derive(Default)]
    struct CountingLoader {
        loads: Arc<AtomicUsize>,
    }

    impl FileLoader for CountingLoader {
        type Output = String;
        type Error = std::io::Error;

        fn load(&self, path: &Path) -> Result<String, std::io::Error> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            fs::read_to_string(path)
        }
    }

    fn setup() -> (TempDir, FileSourcedCache<CountingLoader>, Arc<AtomicUsize>) {
        let tmp = TempDir::new().unwrap();
        let loader = CountingLoader::default();
        let loads = Arc::clone(&loader.loads);
        let files = Cache::new()
            .file_partition("files", tmp.path(), loader)
            .unwrap();
        (tmp, files, loads)
    }

    /// Push a file's mtime forward so the change is visible on coarse clocks.
    fn bump_mtime(path: &Path) {
        let file = fs::File::options().write(true).open(path).unwrap();
        let later = SystemTime::now() + Duration::from_secs(5);
        file.set_modified(later).unwrap();
    }

    #[test]
    fn test_get_loads_once() {
        let (tmp, files, loads) = setup();
        fs::write(tmp.path().join("page.xml"), "<page/>").unwrap();

        assert_eq!(files.get("page.xml").unwrap().as_str(), "<page/>");
        assert_eq!(files.get("page.xml").unwrap().as_str(), "<page/>");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(files.contains("page.xml"));
    }

    #[test]
    fn test_get_reloads_changed_file() {
        let (tmp, files, loads) = setup();
        let path = tmp.path().join("page.xml");
        fs::write(&path, "v1").unwrap();
        assert_eq!(files.get("page.xml").unwrap().as_str(), "v1");

        fs::write(&path, "v2").unwrap();
        bump_mtime(&path);
        assert_eq!(files.get("page.xml").unwrap().as_str(), "v2");
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(files.partition().len(), 1);
    }

    #[test]
    fn test_missing_file_is_resource_lost() {
        let (_tmp, files, _) = setup();
        let err = files.get("missing.xml").unwrap_err();
        assert!(err.is_resource_lost());
    }

    #[test]
    fn test_deleted_file_drops_cached_object() {
        let (tmp, files, _) = setup();
        let path = tmp.path().join("page.xml");
        fs::write(&path, "v1").unwrap();
        files.get("page.xml").unwrap();

        fs::remove_file(&path).unwrap();
        assert!(files.last_modified("page.xml").unwrap_err().is_resource_lost());
        assert!(!files.contains("page.xml"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stat_error_keeps_cached_object() {
        let (tmp, files, _) = setup();
        let dir = tmp.path().join("guide");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("intro.xml"), "intro").unwrap();
        files.get("guide/intro.xml").unwrap();

        // A file where a directory used to be fails with ENOTDIR.
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, "not a directory").unwrap();
        let err = files.last_modified("guide/intro.xml").unwrap_err();
        assert!(matches!(err, CacheError::Stat { .. }));
        assert!(!err.is_resource_lost());
        assert!(files.contains("guide/intro.xml"));
    }

    #[test]
    fn test_concurrent_misses_leave_one_entry() {
        let (tmp, files, loads) = setup();
        fs::write(tmp.path().join("page.xml"), "<page/>").unwrap();
        let barrier = Barrier::new(2);

        std::thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    barrier.wait();
                    assert_eq!(files.get("page.xml").unwrap().as_str(), "<page/>");
                });
            }
        });

        assert_eq!(files.partition().len(), 1);
        assert_eq!(files.partition().cache().len(), 1);
        assert!((1..=2).contains(&loads.load(Ordering::SeqCst)));
        let cached = files.entry("page.xml").unwrap().into_value();
        assert!(Arc::ptr_eq(&cached, &files.get("page.xml").unwrap()));
    }

    #[test]
    fn test_last_modified_does_not_load() {
        let (tmp, files, loads) = setup();
        let path = tmp.path().join("page.xml");
        fs::write(&path, "v1").unwrap();

        let modified = files.last_modified("page.xml").unwrap();
        assert_eq!(modified, fs::metadata(&path).unwrap().modified().unwrap());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert!(!files.contains("page.xml"));
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let (_tmp, files, _) = setup();
        for key in ["../etc/passwd", "/etc/passwd", "a/../../b", ""] {
            let err = files.get(key).unwrap_err();
            assert!(matches!(err, CacheError::InvalidPath(_)), "key {key:?}");
        }
    }

    #[test]
    fn test_nested_keys_resolve_under_root() {
        let (tmp, files, _) = setup();
        fs::create_dir_all(tmp.path().join("docs/guide")).unwrap();
        fs::write(tmp.path().join("docs/guide/intro.xml"), "intro").unwrap();

        let loaded = files.get("docs/guide/intro.xml").unwrap();
        assert_eq!(loaded.path(), tmp.path().join("docs/guide/intro.xml"));
    }

    #[test]
    fn test_loader_error_is_reported() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("dir.xml")).unwrap();
        let files = Cache::new()
            .file_partition("files", tmp.path(), TextLoader)
            .unwrap();

        let err = files.get("dir.xml").unwrap_err();
        assert!(matches!(err, CacheError::Load { .. }));
        assert!(!files.contains("dir.xml"));
    }

    #[test]
    fn test_file_partition_name_conflict() {
        let cache = Cache::new();
        cache.partition::<String>("files").unwrap();
        let err = cache.file_partition("files", "/tmp", TextLoader).unwrap_err();
        assert!(matches!(err, CacheError::PartitionKeyConflict(_)));
    }

    #[test]
    fn test_file_entries_take_part_in_eviction() {
        let tmp = TempDir::new().unwrap();
        let cache = Cache::with_limit(1);
        let files = cache.file_partition("files", tmp.path(), TextLoader).unwrap();
        fs::write(tmp.path().join("a.xml"), "a").unwrap();
        fs::write(tmp.path().join("b.xml"), "b").unwrap();

        files.get("a.xml").unwrap();
        files.get("b.xml").unwrap();
        files.entry("b.xml").unwrap().propose_eviction();
        cache.enforce_limit();

        assert!(files.contains("a.xml"));
        assert!(!files.contains("b.xml"));
        assert!(files.entry("a.xml").unwrap().last_access().is_some());
    }
}
