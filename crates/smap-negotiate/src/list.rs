//! Ranked preference lists and the candidate ranking algorithm.

use std::cmp::Ordering;

use serde::Deserialize;

use crate::preference::{ParamMatching, Preference, PreferenceKind};

/// Charset HTTP/1.1 treats as acceptable unless the client says otherwise.
pub const DEFAULT_CHARSET: &str = "iso-8859-1";

/// What to do when the client sent no preferences at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyPolicy {
    /// Everything the server offers is acceptable.
    #[default]
    AcceptAll,
    /// Nothing is acceptable.
    RejectAll,
}

/// Composite sort key for one (client, server) match.
///
/// Compared field by field: wildcard penalty, matched parameter count, client
/// quality, server quality, then the negated client index so that an earlier
/// header entry wins a tie. The negated server index makes the ordering total
/// and prefers the server's earlier offers.
#[derive(Clone, Copy, Debug)]
pub struct RankKey {
    /// Combined wildcard precedence of the match.
    pub wildcard_penalty: i32,
    /// Client parameters matched.
    pub params_matched: usize,
    /// Effective (client) quality.
    pub q: f64,
    /// Server's own quality for the offer.
    pub server_q: f64,
    /// Negated position of the client preference.
    pub client_rank: i64,
    /// Negated position of the server preference.
    pub server_rank: i64,
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wildcard_penalty
            .cmp(&other.wildcard_penalty)
            .then(self.params_matched.cmp(&other.params_matched))
            .then(self.q.total_cmp(&other.q))
            .then(self.server_q.total_cmp(&other.server_q))
            .then(self.client_rank.cmp(&other.client_rank))
            .then(self.server_rank.cmp(&other.server_rank))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

/// A server preference together with its best ranking against the client.
#[derive(Clone, Debug)]
pub struct Candidate<'a> {
    /// The server's offer.
    pub preference: &'a Preference,
    /// Best key seen for this offer.
    pub key: RankKey,
}

impl Candidate<'_> {
    /// Quality the client assigns to this offer.
    #[must_use]
    pub fn quality(&self) -> f64 {
        self.key.q
    }
}

/// An insertion-ordered list of preferences parsed from one header.
///
/// Duplicates are kept; they are resolved by ranking.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreferenceList {
    items: Vec<Preference>,
    kind: PreferenceKind,
    params: ParamMatching,
}

fn negated_index(index: usize) -> i64 {
    -i64::try_from(index).unwrap_or(i64::MAX)
}

impl PreferenceList {
    /// Parse an `Accept`-style header (media ranges).
    ///
    /// Malformed sections are skipped.
    #[must_use]
    pub fn parse(header: &str) -> Self {
        Self::parse_as(header, PreferenceKind::MediaType)
    }

    /// Parse an `Accept-Language` header.
    #[must_use]
    pub fn parse_language(header: &str) -> Self {
        Self::parse_as(header, PreferenceKind::Language)
    }

    /// Parse an `Accept-Charset` header.
    ///
    /// If the header is non-empty, has no `*` entry and does not mention
    /// `iso-8859-1`, a synthetic `iso-8859-1;q=1.0` entry is appended.
    #[must_use]
    pub fn parse_charset(header: &str) -> Self {
        let mut list = Self::parse_as(header, PreferenceKind::Charset);
        let mentioned = list
            .items
            .iter()
            .any(|p| p.value() == "*" || p.value() == DEFAULT_CHARSET);
        if !list.is_empty() && !mentioned {
            tracing::trace!("injecting implicit {DEFAULT_CHARSET} charset");
            if let Some(pref) = Preference::parse_charset(DEFAULT_CHARSET) {
                list.items.push(pref);
            }
        }
        list
    }

    fn parse_as(header: &str, kind: PreferenceKind) -> Self {
        let items = header
            .split(',')
            .filter_map(|section| {
                let parsed = Preference::parse_as(section, kind);
                if parsed.is_none() && !section.trim().is_empty() {
                    tracing::debug!(section, "skipping malformed preference section");
                }
                parsed
            })
            .collect();
        Self {
            items,
            kind,
            params: ParamMatching::default(),
        }
    }

    /// Build a list from already-parsed preferences.
    #[must_use]
    pub fn from_preferences(items: Vec<Preference>) -> Self {
        let kind = items.first().map(Preference::kind).unwrap_or_default();
        Self {
            items,
            kind,
            params: ParamMatching::default(),
        }
    }

    /// Use the given parameter matching mode when ranking.
    #[must_use]
    pub fn with_param_matching(mut self, params: ParamMatching) -> Self {
        self.params = params;
        self
    }

    /// Preferences in header order.
    #[must_use]
    pub fn items(&self) -> &[Preference] {
        &self.items
    }

    /// Number of preferences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Header the list was parsed from.
    #[must_use]
    pub fn kind(&self) -> PreferenceKind {
        self.kind
    }

    /// Rank every server offer against this (client) list.
    ///
    /// Returns one candidate per distinct server offer (value and parameters),
    /// carrying the best key over all matching client preferences, in the
    /// order the offers first appear. Offers no client preference matches are
    /// dropped.
    #[must_use]
    pub fn candidates<'a>(&self, server: &'a Self, empty: EmptyPolicy) -> Vec<Candidate<'a>> {
        if self.items.is_empty() {
            return match empty {
                EmptyPolicy::AcceptAll => server
                    .items
                    .iter()
                    .enumerate()
                    .map(|(server_index, offer)| Candidate {
                        preference: offer,
                        key: RankKey {
                            wildcard_penalty: 0,
                            params_matched: 0,
                            q: offer.q(),
                            server_q: offer.q(),
                            client_rank: 0,
                            server_rank: negated_index(server_index),
                        },
                    })
                    .collect(),
                EmptyPolicy::RejectAll => Vec::new(),
            };
        }

        let mut best: Vec<Candidate<'a>> = Vec::new();
        for (server_index, offer) in server.items.iter().enumerate() {
            for (client_index, wanted) in self.items.iter().enumerate() {
                let Some(outcome) = Preference::match_against(offer, wanted, self.params) else {
                    continue;
                };
                let key = RankKey {
                    wildcard_penalty: outcome.wildcard_penalty,
                    params_matched: outcome.params_matched,
                    q: outcome.q,
                    server_q: offer.q(),
                    client_rank: negated_index(client_index),
                    server_rank: negated_index(server_index),
                };
                match best
                    .iter_mut()
                    .find(|c| c.preference.identity() == offer.identity())
                {
                    Some(existing) if existing.key < key => {
                        existing.preference = offer;
                        existing.key = key;
                    }
                    Some(_) => {}
                    None => best.push(Candidate {
                        preference: offer,
                        key,
                    }),
                }
            }
        }
        best
    }

    /// Pick the best server offer for this client list.
    ///
    /// Offers the client rejected (`q=0`) are dropped, then the remaining
    /// candidates are ordered by [`RankKey`] and the maximum wins. Returns
    /// `None` if no acceptable offer is left.
    #[must_use]
    pub fn best_match<'a>(&self, server: &'a Self, empty: EmptyPolicy) -> Option<&'a Preference> {
        self.candidates(server, empty)
            .into_iter()
            .filter(|c| c.quality() > 0.0)
            .max_by_key(|c| c.key)
            .map(|c| c.preference)
    }

    /// Quality this client list assigns to a single value.
    ///
    /// The probe is parsed the same way as the list itself (so a language
    /// list takes `en-gb`, a media-type list takes `text/html;level=1`).
    /// Returns 0 if no preference matches.
    #[must_use]
    pub fn quality(&self, value: &str) -> f64 {
        let Some(probe) = Preference::parse_as(value, self.kind) else {
            return 0.0;
        };
        self.quality_of(&probe)
    }

    /// Quality this client list assigns to an already-parsed preference.
    #[must_use]
    pub fn quality_of(&self, probe: &Preference) -> f64 {
        let server = Self::from_preferences(vec![probe.clone()]);
        self.candidates(&server, EmptyPolicy::AcceptAll)
            .into_iter()
            .max_by_key(|c| c.key)
            .map_or(0.0, |c| c.quality())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RFC_ACCEPT: &str =
        "text/*;q=0.3, text/html;q=0.7, text/html;level=1, text/html;level=2;q=0.4, */*;q=0.5";

    #[test]
    fn test_parse_keeps_order_and_duplicates() {
        let list = PreferenceList::parse("text/html, text/plain;q=0.5, text/html;q=0.1");
        let values: Vec<_> = list.items().iter().map(Preference::value).collect();
        assert_eq!(values, vec!["text/html", "text/plain", "text/html"]);
    }

    #[test]
    fn test_parse_skips_malformed_sections() {
        let list = PreferenceList::parse("text/html,, ;q=0.2 ,text/plain");
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_parse_empty_header() {
        assert!(PreferenceList::parse("").is_empty());
    }

    #[test]
    fn test_rfc2616_accept_example_qualities() {
        let client = PreferenceList::parse(RFC_ACCEPT);
        let expected = [
            ("text/html;level=1", 1.0),
            ("text/html", 0.7),
            ("text/plain", 0.3),
            ("image/jpeg", 0.5),
            ("text/html;level=2", 0.4),
            ("text/html;level=3", 0.7),
        ];
        for (probe, q) in expected {
            assert_eq!(client.quality(probe), q, "quality of {probe}");
        }
    }

    #[test]
    fn test_rfc2616_charset_example_injects_default() {
        let list = PreferenceList::parse_charset("iso-8859-5, unicode-1-1;q=0.8");
        assert_eq!(list.len(), 3);
        let injected = &list.items()[2];
        assert_eq!(injected.value(), DEFAULT_CHARSET);
        assert_eq!(injected.q(), 1.0);
        assert_eq!(list.quality("iso-8859-1"), 1.0);
        assert_eq!(list.quality("unicode-1-1"), 0.8);
        assert_eq!(list.quality("utf-8"), 0.0);
    }

    #[test]
    fn test_charset_wildcard_suppresses_injection() {
        let list = PreferenceList::parse_charset("utf-8, *;q=0.1");
        assert_eq!(list.len(), 2);
        assert_eq!(list.quality("iso-8859-1"), 0.1);
    }

    #[test]
    fn test_charset_explicit_default_is_not_duplicated() {
        let list = PreferenceList::parse_charset("utf-8, iso-8859-1;q=0.2");
        assert_eq!(list.len(), 2);
        assert_eq!(list.quality("iso-8859-1"), 0.2);
    }

    #[test]
    fn test_charset_empty_header_stays_empty() {
        assert!(PreferenceList::parse_charset("").is_empty());
    }

    #[test]
    fn test_rfc2616_language_example() {
        let client = PreferenceList::parse_language("da, en-gb;q=0.8, en;q=0.7");
        assert_eq!(client.quality("da"), 1.0);
        assert_eq!(client.quality("en-gb"), 0.8);
        assert_eq!(client.quality("en-us"), 0.7);
        assert_eq!(client.quality("en"), 0.7);
        assert_eq!(client.quality("fr"), 0.0);
    }

    #[test]
    fn test_best_match_prefers_exact_over_wildcard() {
        let client = PreferenceList::parse("text/*;q=0.9, application/xhtml+xml;q=0.5");
        let server = PreferenceList::parse("text/html, application/xhtml+xml");
        let best = client.best_match(&server, EmptyPolicy::AcceptAll).unwrap();
        assert_eq!(best.value(), "application/xhtml+xml");
    }

    #[test]
    fn test_best_match_skips_rejected_exact_offer() {
        let client = PreferenceList::parse("text/html;q=0, */*");
        let server = PreferenceList::parse("text/html, text/plain");
        let best = client.best_match(&server, EmptyPolicy::AcceptAll);
        assert_eq!(best.map(Preference::value), Some("text/plain"));
    }

    #[test]
    fn test_best_match_none_when_every_offer_rejected() {
        let client = PreferenceList::parse("text/html;q=0, text/plain;q=0");
        let server = PreferenceList::parse("text/html, text/plain");
        assert_eq!(client.best_match(&server, EmptyPolicy::AcceptAll), None);
    }

    #[test]
    fn test_best_match_uses_server_quality_on_tie() {
        let client = PreferenceList::parse("*/*");
        let server = PreferenceList::parse("text/html;q=0.5, application/xhtml+xml;q=0.9");
        let best = client.best_match(&server, EmptyPolicy::AcceptAll).unwrap();
        assert_eq!(best.value(), "application/xhtml+xml");
    }

    #[test]
    fn test_best_match_earlier_client_entry_wins_tie() {
        let client = PreferenceList::parse("text/plain, text/html");
        let server = PreferenceList::parse("text/html, text/plain");
        let best = client.best_match(&server, EmptyPolicy::AcceptAll).unwrap();
        assert_eq!(best.value(), "text/plain");
    }

    #[test]
    fn test_best_match_equal_offers_prefer_first_server_entry() {
        let client = PreferenceList::parse("*/*");
        let server = PreferenceList::parse("text/html, text/plain");
        let best = client.best_match(&server, EmptyPolicy::AcceptAll).unwrap();
        assert_eq!(best.value(), "text/html");
    }

    #[test]
    fn test_best_match_explicit_rejection_beats_wildcard() {
        let client = PreferenceList::parse("text/html;q=0, */*");
        let server = PreferenceList::parse("text/html");
        assert!(client.best_match(&server, EmptyPolicy::AcceptAll).is_none());
    }

    #[test]
    fn test_best_match_nothing_matches() {
        let client = PreferenceList::parse("image/png");
        let server = PreferenceList::parse("text/html");
        assert!(client.best_match(&server, EmptyPolicy::AcceptAll).is_none());
    }

    #[test]
    fn test_empty_client_policy() {
        let client = PreferenceList::default();
        let server = PreferenceList::parse("text/html, text/plain;q=0.5");

        let all = client.candidates(&server, EmptyPolicy::AcceptAll);
        assert_eq!(all.len(), 2);
        assert_eq!(
            client
                .best_match(&server, EmptyPolicy::AcceptAll)
                .map(Preference::value),
            Some("text/html")
        );

        assert!(client.candidates(&server, EmptyPolicy::RejectAll).is_empty());
        assert!(client.best_match(&server, EmptyPolicy::RejectAll).is_none());
    }

    #[test]
    fn test_candidates_keep_best_key_per_offer() {
        let client = PreferenceList::parse("*/*;q=0.2, text/html;q=0.6, text/*;q=0.9");
        let server = PreferenceList::parse("text/html");
        let candidates = client.candidates(&server, EmptyPolicy::AcceptAll);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].quality(), 0.6);
        assert_eq!(candidates[0].key.wildcard_penalty, 0);
    }

    #[test]
    fn test_candidates_distinguish_offers_by_params() {
        let client = PreferenceList::parse("text/html;level=2;q=0.4, text/html;q=0.7");
        let server = PreferenceList::parse("text/html;level=1, text/html;level=2");
        let candidates = client.candidates(&server, EmptyPolicy::AcceptAll);
        let qualities: Vec<_> = candidates.iter().map(Candidate::quality).collect();
        assert_eq!(qualities, vec![0.7, 0.4]);
    }

    #[test]
    fn test_exact_param_matching() {
        let client = PreferenceList::parse("text/html").with_param_matching(ParamMatching::Exact);
        assert_eq!(client.quality("text/html;level=1"), 0.0);
        assert_eq!(client.quality("text/html"), 1.0);
    }
}
