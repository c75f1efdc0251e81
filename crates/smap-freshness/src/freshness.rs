//! Per-request freshness aggregation and the conditional-response decision.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::resource::{Resource, ResourceError};

/// Outcome of a conditional request check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conditional {
    /// Generate the response, with a `Last-Modified` header if known.
    Proceed,
    /// Nothing changed since the client's copy; answer 304.
    NotModified,
    /// Generate the response and tell the client not to cache it.
    NoCache,
}

impl Conditional {
    /// HTTP status code for the outcome.
    #[must_use]
    pub fn status(self) -> u16 {
        match self {
            Self::NotModified => 304,
            Self::Proceed | Self::NoCache => 200,
        }
    }
}

/// Truncate to whole seconds, the resolution of an HTTP-date.
fn http_resolution(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => UNIX_EPOCH + Duration::from_secs(since.as_secs()),
        Err(_) => time,
    }
}

/// Collects the resources a response depends on.
///
/// Owned by a single request. Every resource is refreshed the first time it
/// is used; later uses of the same object (by pointer identity) are no-ops.
/// The response's modification time is the latest modification time of all
/// used resources that report one.
#[derive(Default)]
pub struct Freshness {
    seen: HashSet<usize>,
    used: Vec<Arc<dyn Resource>>,
    last_modified: Option<SystemTime>,
    uncacheable: bool,
}

impl std::fmt::Debug for Freshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Freshness")
            .field("used", &self.used.len())
            .field("last_modified", &self.last_modified)
            .field("uncacheable", &self.uncacheable)
            .finish()
    }
}

impl Freshness {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the response depends on `resource`.
    ///
    /// The first use refreshes the resource and folds its modification time
    /// into the aggregate. A resource without a modification time does not
    /// affect the aggregate.
    ///
    /// # Errors
    ///
    /// Returns the refresh error. Any failure also marks the response
    /// uncacheable; [`ResourceError::is_lost`] tells whether the data is gone.
    pub fn use_resource(&mut self, resource: &Arc<dyn Resource>) -> Result<(), ResourceError> {
        let identity = Arc::as_ptr(resource).cast::<()>().addr();
        if !self.seen.insert(identity) {
            return Ok(());
        }
        // Keeps the allocation alive so its address is not reused this request
        self.used.push(Arc::clone(resource));

        if let Err(err) = resource.update() {
            tracing::warn!(resource = resource.name(), error = %err, "refresh failed, response not cacheable");
            self.uncacheable = true;
            return Err(err);
        }

        if let Some(modified) = resource.last_modified() {
            self.last_modified = Some(self.last_modified.map_or(modified, |m| m.max(modified)));
        }
        tracing::trace!(resource = resource.name(), "resource used");
        Ok(())
    }

    /// Force the response to be sent uncacheable.
    pub fn mark_uncacheable(&mut self) {
        self.uncacheable = true;
    }

    /// Latest modification time of the used resources.
    #[must_use]
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    /// Whether the response may be cached by the client.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        !self.uncacheable
    }

    /// Number of distinct resources used.
    #[must_use]
    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// Whether no resource was used.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Decide how to answer given the client's `If-Modified-Since` time.
    ///
    /// Times are compared at whole-second resolution.
    #[must_use]
    pub fn check_not_modified(&self, if_modified_since: Option<SystemTime>) -> Conditional {
        if self.uncacheable {
            return Conditional::NoCache;
        }
        match (self.last_modified, if_modified_since) {
            (Some(modified), Some(since))
                if http_resolution(since) >= http_resolution(modified) =>
            {
                Conditional::NotModified
            }
            _ => Conditional::Proceed,
        }
    }

    /// As [`Freshness::check_not_modified`], from the raw header value.
    ///
    /// A malformed date is ignored, as if the header were absent.
    #[must_use]
    pub fn check_not_modified_header(&self, if_modified_since: Option<&str>) -> Conditional {
        let since = if_modified_since.and_then(|value| match httpdate::parse_http_date(value) {
            Ok(since) => Some(since),
            Err(_) => {
                tracing::debug!(value, "ignoring malformed If-Modified-Since");
                None
            }
        });
        self.check_not_modified(since)
    }

    /// The aggregate as an HTTP-date for a `Last-Modified` header.
    #[must_use]
    pub fn last_modified_header(&self) -> Option<String> {
        self.last_modified.map(httpdate::fmt_http_date)
    }
}
