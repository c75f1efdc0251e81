//! CLI command implementations.

pub(crate) mod freshness;
pub(crate) mod negotiate;

pub(crate) use freshness::FreshnessArgs;
pub(crate) use negotiate::NegotiateArgs;
