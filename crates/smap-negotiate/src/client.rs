//! Per-request client preferences and the negotiation entry point.

use serde::Deserialize;

use crate::list::{EmptyPolicy, PreferenceList};
use crate::preference::Preference;

/// Behaviour when no offer is acceptable to the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Unacceptable {
    /// Serve the server's first preference anyway.
    #[default]
    Fallback,
    /// Fail with [`NegotiationError::NotAcceptable`].
    Reject,
}

/// Negotiation policy, usually taken from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NegotiationPolicy {
    /// What to do when nothing offered is acceptable.
    pub on_unacceptable: Unacceptable,
    /// How to treat a missing or empty header.
    pub empty_accept: EmptyPolicy,
}

/// Error returned by negotiation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NegotiationError {
    /// None of the offered representations is acceptable.
    #[error("None of the offered representations is acceptable: {offered}")]
    NotAcceptable {
        /// Offers in header form, comma separated.
        offered: String,
    },
    /// The server offered nothing to choose from.
    #[error("No representations offered")]
    NothingOffered,
}

/// Pick the offer to serve.
///
/// Falls back to the server's first preference when nothing matches, unless
/// the policy says to reject.
///
/// # Errors
///
/// Returns [`NegotiationError::NothingOffered`] for an empty server list and
/// [`NegotiationError::NotAcceptable`] when rejecting.
pub fn negotiate<'a>(
    client: &PreferenceList,
    server: &'a PreferenceList,
    policy: NegotiationPolicy,
) -> Result<&'a Preference, NegotiationError> {
    let first = server
        .items()
        .first()
        .ok_or(NegotiationError::NothingOffered)?;

    if let Some(best) = client.best_match(server, policy.empty_accept) {
        return Ok(best);
    }

    match policy.on_unacceptable {
        Unacceptable::Fallback => {
            tracing::debug!(fallback = %first, "no acceptable offer, using server default");
            Ok(first)
        }
        Unacceptable::Reject => Err(NegotiationError::NotAcceptable {
            offered: server
                .items()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// The three preference lists a request carries, parsed once.
#[derive(Clone, Debug, Default)]
pub struct ClientPreferences {
    /// `Accept`.
    pub media_types: PreferenceList,
    /// `Accept-Charset`, with the implicit `iso-8859-1` applied.
    pub charsets: PreferenceList,
    /// `Accept-Language`.
    pub languages: PreferenceList,
}

impl ClientPreferences {
    /// Parse the raw header values. Missing headers yield empty lists.
    #[must_use]
    pub fn from_headers(
        accept: Option<&str>,
        accept_charset: Option<&str>,
        accept_language: Option<&str>,
    ) -> Self {
        Self {
            media_types: accept.map(PreferenceList::parse).unwrap_or_default(),
            charsets: accept_charset
                .map(PreferenceList::parse_charset)
                .unwrap_or_default(),
            languages: accept_language
                .map(PreferenceList::parse_language)
                .unwrap_or_default(),
        }
    }

    /// Negotiate a media type from the server's offers.
    ///
    /// # Errors
    ///
    /// See [`negotiate`].
    pub fn media_type<'a>(
        &self,
        offered: &'a PreferenceList,
        policy: NegotiationPolicy,
    ) -> Result<&'a Preference, NegotiationError> {
        negotiate(&self.media_types, offered, policy)
    }

    /// Negotiate a charset from the server's offers.
    ///
    /// # Errors
    ///
    /// See [`negotiate`].
    pub fn charset<'a>(
        &self,
        offered: &'a PreferenceList,
        policy: NegotiationPolicy,
    ) -> Result<&'a Preference, NegotiationError> {
        negotiate(&self.charsets, offered, policy)
    }

    /// Negotiate a language from the server's offers.
    ///
    /// # Errors
    ///
    /// See [`negotiate`].
    pub fn language<'a>(
        &self,
        offered: &'a PreferenceList,
        policy: NegotiationPolicy,
    ) -> Result<&'a Preference, NegotiationError> {
        negotiate(&self.languages, offered, policy)
    }
}
