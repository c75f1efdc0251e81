//! Partitioned object cache for smap.
//!
//! A [`Cache`] owns named partitions ([`SubCache`]) holding heterogeneous,
//! shared objects. With a positive limit, every object across all partitions
//! takes part in a single least-recently-used order, trimmed by
//! [`Cache::enforce_limit`] at a natural checkpoint such as the end of a
//! request.
//!
//! - [`Cachable`]: the touch/uncache/last-access capability
//! - [`CacheEntry`]: handle onto a cached object, with a weak back-reference
//! - [`FileSourcedCache`]: partition keyed by file names, loading on a miss
//!   through a [`FileLoader`] ([`TextLoader`], [`JsonLoader`])
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use smap_cache::Cache;
//!
//! let cache = Cache::with_limit(1);
//! let pages = cache.partition::<String>("pages").unwrap();
//! let old = pages.insert("old", Arc::new("<p>old</p>".into())).unwrap();
//! pages.insert("new", Arc::new("<p>new</p>".into())).unwrap();
//!
//! cache.enforce_limit();
//! assert!(!old.is_cached());
//! assert_eq!(pages.get("new").unwrap().as_str(), "<p>new</p>");
//! ```

mod cache;
mod entry;
mod error;
mod file;
mod loader;
mod partition;
mod state;

pub use cache::Cache;
pub use entry::{AccessStamp, Cachable, CacheEntry, EntryId};
pub use error::CacheError;
pub use file::{FileLoader, FileSourcedCache, Loaded};
pub use loader::{JsonLoader, LoadError, TextLoader};
pub use partition::SubCache;
pub use state::CacheStats;
