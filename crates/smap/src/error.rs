//! CLI error types.

use smap_cache::CacheError;
use smap_config::ConfigError;
use smap_freshness::ResourceError;
use smap_negotiate::NegotiationError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Cache(#[from] CacheError),

    #[error("{0}")]
    Resource(#[from] ResourceError),

    #[error("{0}")]
    Negotiation(#[from] NegotiationError),
}
