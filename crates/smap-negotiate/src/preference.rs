//! A single ranked preference, as found in one section of an `Accept*` header.
//!
//! Sections look like `text/html;level=1;q=0.7`. The first token is the value,
//! the remaining tokens are `key=value` parameters. The `q` parameter is pulled
//! out as the quality factor; everything else is kept as a match-relevant
//! attribute.

use std::fmt;

use glob::Pattern;

/// Which header a preference was parsed from.
///
/// Determines how the value is split and how the preference is rendered back
/// into header form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PreferenceKind {
    /// `Accept` media ranges (`text/html;level=1`).
    #[default]
    MediaType,
    /// `Accept-Charset` entries (`iso-8859-5`).
    Charset,
    /// `Accept-Language` ranges (`en-gb`), split into primary tag and `sub`.
    Language,
}

/// How strictly parameters are compared when matching.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParamMatching {
    /// A pattern without a parameter accepts any value for it.
    #[default]
    Wildcard,
    /// Both sides must declare exactly the same parameters.
    Exact,
}

/// Name of the parameter holding a language sub-tag.
pub const SUB_TAG: &str = "sub";

/// One parsed preference.
///
/// `precedence` is the negated number of `*` segments in `value`, so concrete
/// values rank above partial wildcards, which rank above the universal one.
#[derive(Clone, Debug, PartialEq)]
pub struct Preference {
    value: String,
    q: f64,
    params: Vec<(String, String)>,
    precedence: i32,
    kind: PreferenceKind,
}

/// Outcome of matching a client preference against a server preference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchOutcome {
    /// Sum of both sides' precedence (0 for two concrete values).
    pub wildcard_penalty: i32,
    /// Number of client parameters found, with equal values, on the server side.
    pub params_matched: usize,
    /// The client's quality factor. Zero is an explicit rejection.
    pub q: f64,
}

impl MatchOutcome {
    /// Whether the client accepts the value at all.
    #[must_use]
    pub fn is_acceptable(&self) -> bool {
        self.q > 0.0
    }
}

impl Preference {
    /// Build a preference directly.
    ///
    /// `q` is clamped into `[0, 1]`; the value is lower-cased.
    #[must_use]
    pub fn new(value: &str, q: f64, params: Vec<(String, String)>) -> Self {
        Self::with_kind(value, q, params, PreferenceKind::MediaType)
    }

    fn with_kind(
        value: &str,
        q: f64,
        params: Vec<(String, String)>,
        kind: PreferenceKind,
    ) -> Self {
        let value = value.trim().to_lowercase();
        let precedence = -i32::try_from(value.matches('*').count()).unwrap_or(i32::MAX);
        Self {
            value,
            q: if q.is_finite() { q.clamp(0.0, 1.0) } else { 0.0 },
            params,
            precedence,
            kind,
        }
    }

    /// Parse one media-type header section.
    ///
    /// Returns `None` for a section with an empty value.
    #[must_use]
    pub fn parse(section: &str) -> Option<Self> {
        Self::parse_as(section, PreferenceKind::MediaType)
    }

    /// Parse one `Accept-Charset` section.
    #[must_use]
    pub fn parse_charset(section: &str) -> Option<Self> {
        Self::parse_as(section, PreferenceKind::Charset)
    }

    /// Parse one `Accept-Language` section.
    ///
    /// `en-gb` becomes value `en` with parameter `sub=gb`.
    #[must_use]
    pub fn parse_language(section: &str) -> Option<Self> {
        Self::parse_as(section, PreferenceKind::Language)
    }

    pub(crate) fn parse_as(section: &str, kind: PreferenceKind) -> Option<Self> {
        let mut tokens = section.split(';');
        let value = tokens.next()?.trim();
        if value.is_empty() {
            return None;
        }

        let mut q = 1.0;
        let mut params = Vec::new();
        for token in tokens {
            let Some((key, raw)) = token.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let raw = raw.trim().trim_matches('"');
            if key == "q" {
                q = parse_quality(raw);
            } else if !key.is_empty() {
                params.push((key, raw.to_owned()));
            }
        }

        let mut pref = Self::with_kind(value, q, params, kind);
        if kind == PreferenceKind::Language
            && let Some((primary, sub)) = pref.value.split_once('-')
        {
            let (primary, sub) = (primary.to_owned(), sub.to_owned());
            pref.params.insert(0, (SUB_TAG.to_owned(), sub));
            pref.value = primary;
        }
        Some(pref)
    }

    /// Lower-cased value (for languages, the primary tag only).
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Quality factor in `[0, 1]`.
    #[must_use]
    pub fn q(&self) -> f64 {
        self.q
    }

    /// Parameters other than `q`, in header order.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Look up a parameter by (lower-case) name.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Negated count of `*` in the value.
    #[must_use]
    pub fn precedence(&self) -> i32 {
        self.precedence
    }

    /// Header the preference was parsed from.
    #[must_use]
    pub fn kind(&self) -> PreferenceKind {
        self.kind
    }

    /// Whether the value contains a wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.precedence < 0
    }

    /// Identity of the preference without its quality: value plus parameters.
    pub(crate) fn identity(&self) -> (&str, &[(String, String)]) {
        (&self.value, &self.params)
    }

    /// Match a server preference against a client preference.
    ///
    /// Values are compared with glob semantics in both directions. Every
    /// parameter the client declares must be present, with an equal value, on
    /// the server side; with [`ParamMatching::Exact`] the server may not
    /// declare extra ones either. Returns `None` when the two are disjoint.
    #[must_use]
    pub fn match_against(
        server: &Self,
        client: &Self,
        params: ParamMatching,
    ) -> Option<MatchOutcome> {
        if !glob_match(&client.value, &server.value) && !glob_match(&server.value, &client.value)
        {
            return None;
        }

        if params == ParamMatching::Exact && client.params.len() != server.params.len() {
            return None;
        }

        let mut params_matched = 0;
        for (key, expected) in &client.params {
            match server.param(key) {
                Some(actual) if actual.eq_ignore_ascii_case(expected) => params_matched += 1,
                _ => return None,
            }
        }

        Some(MatchOutcome {
            wildcard_penalty: server.precedence + client.precedence,
            params_matched,
            q: client.q,
        })
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)?;
        for (key, value) in &self.params {
            if self.kind == PreferenceKind::Language && key == SUB_TAG {
                write!(f, "-{value}")?;
            }
        }
        for (key, value) in &self.params {
            if self.kind != PreferenceKind::Language || key != SUB_TAG {
                write!(f, ";{key}={value}")?;
            }
        }
        if (self.q - 1.0).abs() > f64::EPSILON {
            write!(f, ";q={}", self.q)?;
        }
        Ok(())
    }
}

/// Parse a quality factor; anything malformed or out of range is a rejection.
fn parse_quality(raw: &str) -> f64 {
    match raw.parse::<f64>() {
        Ok(q) if (0.0..=1.0).contains(&q) => q,
        _ => 0.0,
    }
}

/// Glob-match `candidate` against `pattern`.
///
/// Values that do not form a valid glob are compared literally.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == candidate;
    }
    match Pattern::new(pattern) {
        Ok(p) => p.matches(candidate),
        Err(_) => pattern == candidate,
    }
}
