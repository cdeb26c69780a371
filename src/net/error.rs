use thiserror::Error;

use crate::net::types::Family;

/// Errors surfaced by the endpoint and the tracer.
///
/// Parse failures and identifier mismatches never appear here: the
/// dispatcher drops those frames silently. Probe timeouts are not errors
/// either; they are a first-class [`crate::net::Response`] kind.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no supported address family for {0}")]
    UnsupportedFamily(String),

    #[error("{0} is not enabled on this endpoint")]
    FamilyDisabled(Family),

    #[error("no address family could be enabled")]
    NoFamilyAvailable,

    #[error("failed to set ttl: {0}")]
    SetTtl(#[source] std::io::Error),

    #[error("send failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("no path found: max ttl ({0}) exceeded")]
    MaxTtlExceeded(u8),

    #[error("cancelled")]
    Cancelled,
}
