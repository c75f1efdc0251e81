//! Resource freshness and conditional responses for smap.
//!
//! A response is built from several cached resources (source documents,
//! templates, data files). Each one is registered with the request's
//! [`Freshness`] as it is used; the aggregate modification time is the
//! latest one among them, and decides whether the client's copy is still
//! current.
//!
//! - [`Resource`]: a cachable object with a modification time and a refresh
//! - [`FileResource`]: resource over a [`smap_cache::FileSourcedCache`] key
//! - [`Freshness`]: per-request aggregator and the [`Conditional`] decision
//! - [`RequestContext`]: preferences, freshness and the cache for one request
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::{Duration, UNIX_EPOCH};
//! use smap_freshness::{Conditional, Freshness, Resource, StaticResource};
//!
//! let layout: Arc<dyn Resource> = Arc::new(StaticResource::new(
//!     "layout",
//!     Some(UNIX_EPOCH + Duration::from_secs(784_111_777)),
//! ));
//!
//! let mut freshness = Freshness::new();
//! freshness.use_resource(&layout).unwrap();
//! assert_eq!(
//!     freshness.check_not_modified_header(Some("Sun, 06 Nov 1994 08:49:37 GMT")),
//!     Conditional::NotModified
//! );
//! ```

mod context;
mod freshness;
mod resource;

pub use context::{RequestContext, RequestSummary};
pub use freshness::{Conditional, Freshness};
pub use resource::{FileResource, Resource, ResourceError, StaticResource};
