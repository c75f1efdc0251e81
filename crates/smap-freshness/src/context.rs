//! Request-scoped state tying negotiation, freshness and the cache together.

use std::sync::Arc;
use std::time::SystemTime;

use smap_cache::Cache;
use smap_negotiate::{ClientPreferences, NegotiationError, NegotiationPolicy, Preference, PreferenceList};

use crate::freshness::{Conditional, Freshness};
use crate::resource::{Resource, ResourceError};

/// State of one request.
///
/// Created when the request arrives, with the client's preferences parsed
/// once; consumed by [`RequestContext::finish`] after the response is
/// produced, which trims the shared cache to its limit.
#[derive(Debug)]
pub struct RequestContext {
    cache: Cache,
    preferences: ClientPreferences,
    policy: NegotiationPolicy,
    freshness: Freshness,
}

/// What a finished request left behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestSummary {
    /// Distinct resources the response used.
    pub resources: usize,
    /// Aggregate modification time.
    pub last_modified: Option<SystemTime>,
    /// Whether the response was cacheable.
    pub cacheable: bool,
    /// Cache entries evicted at the end of the request.
    pub evicted: usize,
}

impl RequestContext {
    /// Create a context from already parsed preferences.
    #[must_use]
    pub fn new(cache: Cache, preferences: ClientPreferences, policy: NegotiationPolicy) -> Self {
        Self {
            cache,
            preferences,
            policy,
            freshness: Freshness::new(),
        }
    }

    /// Create a context from raw `Accept`, `Accept-Charset` and
    /// `Accept-Language` header values.
    #[must_use]
    pub fn from_headers(
        cache: Cache,
        policy: NegotiationPolicy,
        accept: Option<&str>,
        accept_charset: Option<&str>,
        accept_language: Option<&str>,
    ) -> Self {
        let preferences = ClientPreferences::from_headers(accept, accept_charset, accept_language);
        Self::new(cache, preferences, policy)
    }

    /// Shared cache.
    #[must_use]
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// The client's parsed preferences.
    #[must_use]
    pub fn preferences(&self) -> &ClientPreferences {
        &self.preferences
    }

    /// Freshness collected so far.
    #[must_use]
    pub fn freshness(&self) -> &Freshness {
        &self.freshness
    }

    /// Mutable access to the freshness aggregator.
    pub fn freshness_mut(&mut self) -> &mut Freshness {
        &mut self.freshness
    }

    /// See [`Freshness::use_resource`].
    ///
    /// # Errors
    ///
    /// Returns the resource's refresh error.
    pub fn use_resource(&mut self, resource: &Arc<dyn Resource>) -> Result<(), ResourceError> {
        self.freshness.use_resource(resource)
    }

    /// See [`Freshness::check_not_modified_header`].
    #[must_use]
    pub fn check_not_modified(&self, if_modified_since: Option<&str>) -> Conditional {
        self.freshness.check_not_modified_header(if_modified_since)
    }

    /// Negotiate the media type to serve.
    ///
    /// # Errors
    ///
    /// See [`smap_negotiate::negotiate`].
    pub fn negotiate_media_type<'a>(
        &self,
        offered: &'a PreferenceList,
    ) -> Result<&'a Preference, NegotiationError> {
        self.preferences.media_type(offered, self.policy)
    }

    /// Negotiate the charset to serve.
    ///
    /// # Errors
    ///
    /// See [`smap_negotiate::negotiate`].
    pub fn negotiate_charset<'a>(
        &self,
        offered: &'a PreferenceList,
    ) -> Result<&'a Preference, NegotiationError> {
        self.preferences.charset(offered, self.policy)
    }

    /// Negotiate the language to serve.
    ///
    /// # Errors
    ///
    /// See [`smap_negotiate::negotiate`].
    pub fn negotiate_language<'a>(
        &self,
        offered: &'a PreferenceList,
    ) -> Result<&'a Preference, NegotiationError> {
        self.preferences.language(offered, self.policy)
    }

    /// End the request: enforce the cache limit once.
    pub fn finish(self) -> RequestSummary {
        let evicted = self.cache.enforce_limit();
        let summary = RequestSummary {
            resources: self.freshness.len(),
            last_modified: self.freshness.last_modified(),
            cacheable: self.freshness.is_cacheable(),
            evicted,
        };
        tracing::debug!(
            resources = summary.resources,
            cacheable = summary.cacheable,
            evicted,
            "request finished"
        );
        summary
    }
}
