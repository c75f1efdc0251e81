//! Cache error types.

use std::path::PathBuf;

/// Error returned by cache and partition operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Lookup miss. Callers usually load the value and insert it.
    #[error("Key not found in partition {partition}: {key}")]
    KeyNotFound {
        /// Partition name.
        partition: String,
        /// Missing key.
        key: String,
    },
    /// The key is already bound in the partition.
    #[error("Duplicate key in partition {partition}: {key}")]
    DuplicateKey {
        /// Partition name.
        partition: String,
        /// Colliding key.
        key: String,
    },
    /// The object is already owned by a partition of this cache.
    #[error("Object is already cached under {partition}/{key}")]
    AlreadyOwned {
        /// Partition currently owning the object.
        partition: String,
        /// Key it is bound to.
        key: String,
    },
    /// A partition with this name already exists.
    #[error("Partition already exists: {0}")]
    PartitionKeyConflict(String),
    /// A partition with this name exists but holds a different value type.
    #[error("Partition {name} holds {expected}, not {requested}")]
    PartitionTypeMismatch {
        /// Partition name.
        name: String,
        /// Type the partition was created with.
        expected: &'static str,
        /// Type that was requested.
        requested: &'static str,
    },
    /// Negative cache limit.
    #[error("Cache limit must not be negative, got {0}")]
    InvalidLimit(i64),
    /// A file key escapes the partition root or is absolute.
    #[error("Invalid path: {}", .0.display())]
    InvalidPath(PathBuf),
    /// The file backing a cached object no longer exists.
    #[error("Resource lost: {}", .path.display())]
    ResourceLost {
        /// Resolved file path.
        path: PathBuf,
        /// Underlying `stat` failure.
        #[source]
        source: std::io::Error,
    },
    /// The file exists but its metadata could not be read.
    #[error("Failed to stat {}: {source}", .path.display())]
    Stat {
        /// Resolved file path.
        path: PathBuf,
        /// Underlying `stat` failure.
        #[source]
        source: std::io::Error,
    },
    /// The loader failed to decode a file.
    #[error("Failed to load {}: {source}", .path.display())]
    Load {
        /// Resolved file path.
        path: PathBuf,
        /// Loader error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CacheError {
    /// Whether this is a lookup miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    /// Whether the backing resource has disappeared.
    #[must_use]
    pub fn is_resource_lost(&self) -> bool {
        matches!(self, Self::ResourceLost { .. })
    }
}
