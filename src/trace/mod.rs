pub mod discovery;
pub mod pinger;
pub mod tracer;

pub use tracer::*;

use async_trait::async_trait;
use std::net::IpAddr;
use tokio_util::sync::CancellationToken;

use crate::net::{Error, IcmpEndpoint, Response};

/// Probe payload used by discovery and the pingers: 56 bytes of zeros,
/// the conventional ping size. The size carries no meaning.
pub(crate) const PROBE_PAYLOAD: [u8; 56] = [0u8; 56];

/// TTL used for pings to an already-discovered hop, high enough to reach
/// any of them.
pub(crate) const PING_TTL: u8 = 64;

/// What the tracer needs from an ICMP endpoint.
///
/// [`IcmpEndpoint`] is the real thing; tests drive the tracer with a
/// scripted implementation instead of the network.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Resolve a host to an address the endpoint can probe.
    fn resolve(&self, host: &str) -> Result<IpAddr, Error>;

    /// Allocate the next probe sequence number.
    fn next_seq(&self) -> u16;

    /// Send one Echo request with the given TTL.
    fn send(&self, target: IpAddr, seq: u16, ttl: u8, payload: &[u8]) -> Result<(), Error>;

    /// Wait for the next response, a read-deadline `Timeout`, or
    /// cancellation.
    async fn read(&self, cancel: &CancellationToken) -> Result<Response, Error>;
}

#[async_trait]
impl Endpoint for IcmpEndpoint {
    fn resolve(&self, host: &str) -> Result<IpAddr, Error> {
        IcmpEndpoint::resolve(self, host)
    }

    fn next_seq(&self) -> u16 {
        IcmpEndpoint::next_seq(self)
    }

    fn send(&self, target: IpAddr, seq: u16, ttl: u8, payload: &[u8]) -> Result<(), Error> {
        IcmpEndpoint::send(self, target, seq, ttl, payload)
    }

    async fn read(&self, cancel: &CancellationToken) -> Result<Response, Error> {
        IcmpEndpoint::read(self, cancel).await
    }
}
