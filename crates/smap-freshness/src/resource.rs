//! The [`Resource`] contract and its stock implementations.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use smap_cache::{AccessStamp, Cachable, CacheError, FileLoader, FileSourcedCache, Loaded};

/// Error from refreshing a resource.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// The backing data is gone; the response must not be cached.
    #[error("Resource {name} is no longer available")]
    Lost {
        /// Resource name, for logs.
        name: String,
        /// Underlying cache error.
        #[source]
        source: CacheError,
    },
    /// Any other cache failure.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ResourceError {
    /// Whether the resource has gone away.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        matches!(self, Self::Lost { .. })
    }
}

/// A cachable object whose freshness a response may depend on.
///
/// `update` refreshes the object from its source; `last_modified` then
/// reports the modification time observed by the latest update.
pub trait Resource: Cachable + Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Modification time, or `None` if unknown.
    fn last_modified(&self) -> Option<SystemTime>;

    /// Refresh from the source.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Lost`] if the source no longer exists.
    fn update(&self) -> Result<(), ResourceError>;
}

/// A resource backed by one key of a [`FileSourcedCache`].
///
/// `update` only stats the file; the content is loaded on demand through
/// [`FileResource::load`].
pub struct FileResource<L: FileLoader> {
    files: FileSourcedCache<L>,
    key: String,
    modified: Mutex<Option<SystemTime>>,
}

impl<L: FileLoader> std::fmt::Debug for FileResource<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileResource")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<L: FileLoader> FileResource<L> {
    /// Create a resource for `key`. Nothing is read until the first update.
    #[must_use]
    pub fn new(files: FileSourcedCache<L>, key: impl Into<String>) -> Self {
        Self {
            files,
            key: key.into(),
            modified: Mutex::new(None),
        }
    }

    /// Logical file name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load (or reuse) the decoded file, recording its modification time.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Lost`] if the file is gone and
    /// [`ResourceError::Cache`] for loader or path errors.
    pub fn load(&self) -> Result<Arc<Loaded<L::Output>>, ResourceError> {
        match self.files.get(&self.key) {
            Ok(loaded) => {
                self.set_modified(Some(loaded.modified()));
                Ok(loaded)
            }
            Err(err) => Err(self.failed(err)),
        }
    }

    fn set_modified(&self, modified: Option<SystemTime>) {
        *self.modified.lock().unwrap_or_else(PoisonError::into_inner) = modified;
    }

    fn failed(&self, err: CacheError) -> ResourceError {
        if err.is_resource_lost() {
            self.set_modified(None);
            ResourceError::Lost {
                name: self.key.clone(),
                source: err,
            }
        } else {
            ResourceError::Cache(err)
        }
    }
}

impl<L: FileLoader> Cachable for FileResource<L> {
    fn touch(&self) {
        if let Ok(entry) = self.files.entry(&self.key) {
            entry.touch();
        }
    }

    fn uncache(&self) -> bool {
        self.files.remove(&self.key).is_ok()
    }

    fn last_access(&self) -> Option<AccessStamp> {
        self.files.entry(&self.key).ok()?.last_access()
    }
}

impl<L: FileLoader> Resource for FileResource<L> {
    fn name(&self) -> &str {
        &self.key
    }

    fn last_modified(&self) -> Option<SystemTime> {
        *self.modified.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self) -> Result<(), ResourceError> {
        match self.files.last_modified(&self.key) {
            Ok(modified) => {
                self.set_modified(Some(modified));
                Ok(())
            }
            Err(err) => Err(self.failed(err)),
        }
    }
}

/// A resource with a fixed modification time and no backing store, such as
/// a template compiled into the binary.
#[derive(Clone, Debug)]
pub struct StaticResource {
    name: String,
    modified: Option<SystemTime>,
}

impl StaticResource {
    /// Create a static resource.
    #[must_use]
    pub fn new(name: impl Into<String>, modified: Option<SystemTime>) -> Self {
        Self {
            name: name.into(),
            modified,
        }
    }
}

impl Cachable for StaticResource {
    fn touch(&self) {}

    fn uncache(&self) -> bool {
        false
    }

    fn last_access(&self) -> Option<AccessStamp> {
        None
    }
}

impl Resource for StaticResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn last_modified(&self) -> Option<SystemTime> {
        self.modified
    }

    fn update(&self) -> Result<(), ResourceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smap_cache::{Cache, TextLoader};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileSourcedCache<TextLoader>) {
        let tmp = TempDir::new().unwrap();
        let files = Cache::new()
            .file_partition("files", tmp.path(), TextLoader)
            .unwrap();
        (tmp, files)
    }

    #[test]
    fn test_file_resource_update_reads_mtime() {
        let (tmp, files) = setup();
        let path = tmp.path().join("page.xml");
        fs::write(&path, "<page/>").unwrap();

        let resource = FileResource::new(files.clone(), "page.xml");
        assert_eq!(resource.last_modified(), None);
        resource.update().unwrap();
        assert_eq!(
            resource.last_modified(),
            Some(fs::metadata(&path).unwrap().modified().unwrap())
        );
        assert!(!files.contains("page.xml"));
    }

    #[test]
    fn test_file_resource_load_caches_content() {
        let (tmp, files) = setup();
        fs::write(tmp.path().join("page.xml"), "<page/>").unwrap();

        let resource = FileResource::new(files.clone(), "page.xml");
        assert_eq!(resource.load().unwrap().as_str(), "<page/>");
        assert!(resource.last_access().is_some());
        assert!(resource.last_modified().is_some());

        assert!(resource.uncache());
        assert!(!files.contains("page.xml"));
        assert_eq!(resource.last_access(), None);
    }

    #[test]
    fn test_file_resource_lost() {
        let (tmp, files) = setup();
        let path = tmp.path().join("page.xml");
        fs::write(&path, "<page/>").unwrap();
        let resource = FileResource::new(files.clone(), "page.xml");
        resource.load().unwrap();

        fs::remove_file(&path).unwrap();
        let err = resource.update().unwrap_err();
        assert!(err.is_lost());
        assert_eq!(resource.last_modified(), None);
        assert!(!files.contains("page.xml"));
    }

    #[test]
    fn test_file_resource_invalid_key_is_not_lost() {
        let (_tmp, files) = setup();
        let resource = FileResource::new(files, "../outside.xml");
        let err = resource.update().unwrap_err();
        assert!(!err.is_lost());
        assert!(matches!(err, ResourceError::Cache(CacheError::InvalidPath(_))));
    }

    #[test]
    fn test_static_resource() {
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let resource = StaticResource::new("layout", Some(at));
        resource.update().unwrap();
        assert_eq!(resource.last_modified(), Some(at));
        assert_eq!(resource.name(), "layout");
        assert!(!resource.uncache());
    }
}
