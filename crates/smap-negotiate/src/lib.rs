//! HTTP preference negotiation for smap.
//!
//! Matches a client's ranked `Accept`, `Accept-Charset` and `Accept-Language`
//! lists against the representations the server can produce, following
//! RFC 2616 §14: more specific ranges beat wildcards, matched parameters break
//! ties, and among otherwise equal outcomes the entry that appears earlier in
//! the client header wins.
//!
//! - [`Preference`]: one parsed header section
//! - [`PreferenceList`]: a parsed header, with [`PreferenceList::candidates`],
//!   [`PreferenceList::best_match`] and [`PreferenceList::quality`]
//! - [`ClientPreferences`]: all three lists of a request, parsed once
//!
//! # Example
//!
//! ```
//! use smap_negotiate::PreferenceList;
//!
//! let client = PreferenceList::parse("text/*;q=0.3, text/html;q=0.7, */*;q=0.5");
//! assert_eq!(client.quality("text/html"), 0.7);
//! assert_eq!(client.quality("text/plain"), 0.3);
//! assert_eq!(client.quality("image/jpeg"), 0.5);
//! ```

mod client;
mod list;
mod preference;

pub use client::{ClientPreferences, NegotiationError, NegotiationPolicy, Unacceptable, negotiate};
pub use list::{Candidate, DEFAULT_CHARSET, EmptyPolicy, PreferenceList, RankKey};
pub use preference::{MatchOutcome, ParamMatching, Preference, PreferenceKind, SUB_TAG};
