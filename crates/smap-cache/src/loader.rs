//! Stock [`FileLoader`]s for plain text and JSON documents.

use std::fs;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::file::FileLoader;

/// Error from the stock loaders.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Reading the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON for the target type.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Loads a file as a UTF-8 string.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextLoader;

impl FileLoader for TextLoader {
    type Output = String;
    type Error = LoadError;

    fn load(&self, path: &Path) -> Result<String, LoadError> {
        Ok(fs::read_to_string(path)?)
    }
}

/// Loads a file as JSON into `T`.
///
/// # Example
///
/// ```
/// use serde::Deserialize;
/// use smap_cache::{Cache, JsonLoader};
///
/// #[derive(Deserialize)]
/// struct Sitemap { pages: Vec<String> }
///
/// let cache = Cache::new();
/// let sitemaps = cache
///     .file_partition("sitemaps", "site", JsonLoader::<Sitemap>::new())
///     .unwrap();
/// assert!(sitemaps.get("missing.json").is_err());
/// ```
pub struct JsonLoader<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonLoader<T> {
    /// Create a loader for `T`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonLoader<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonLoader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonLoader")
    }
}

impl<T: DeserializeOwned + Send + Sync + 'static> FileLoader for JsonLoader<T> {
    type Output = T;
    type Error = LoadError;

    fn load(&self, path: &Path) -> Result<T, LoadError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cache, CacheError};
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sitemap {
        title: String,
        pages: Vec<String>,
    }

    #[test]
    fn test_text_loader() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "hello").unwrap();
        assert_eq!(TextLoader.load(&tmp.path().join("a.txt")).unwrap(), "hello");
    }

    #[test]
    fn test_text_loader_rejects_invalid_utf8() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bin"), [0xFF, 0xFE, 0x00]).unwrap();
        assert!(TextLoader.load(&tmp.path().join("bin")).is_err());
    }

    #[test]
    fn test_json_loader_through_cache() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("site.json"),
            r#"{"title": "Docs", "pages": ["index", "guide"]}"#,
        )
        .unwrap();

        let files = Cache::new()
            .file_partition("sitemaps", tmp.path(), JsonLoader::<Sitemap>::new())
            .unwrap();
        let sitemap = files.get("site.json").unwrap();
        assert_eq!(
            **sitemap,
            Sitemap {
                title: "Docs".to_owned(),
                pages: vec!["index".to_owned(), "guide".to_owned()],
            }
        );
    }

    #[test]
    fn test_json_loader_decode_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bad.json"), "{not json").unwrap();

        let files = Cache::new()
            .file_partition("sitemaps", tmp.path(), JsonLoader::<Sitemap>::new())
            .unwrap();
        let err = files.get("bad.json").unwrap_err();
        let CacheError::Load { source, .. } = &err else {
            panic!("expected load error, got {err:?}");
        };
        assert!(matches!(
            source.downcast_ref::<LoadError>(),
            Some(LoadError::Json(_))
        ));
    }
}
