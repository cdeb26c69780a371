use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Address family of an ICMP endpoint or frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(ip: IpAddr) -> Self {
        if ip.is_ipv4() { Family::V4 } else { Family::V6 }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => write!(f, "IPv4"),
            Family::V6 => write!(f, "IPv6"),
        }
    }
}

/// Which address families an endpoint should try to enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FamilySet {
    #[default]
    V4,
    V6,
    Both,
}

impl FamilySet {
    pub fn wants(&self, family: Family) -> bool {
        matches!(
            (self, family),
            (FamilySet::V4 | FamilySet::Both, Family::V4) | (FamilySet::V6 | FamilySet::Both, Family::V6)
        )
    }
}

/// A probe that has been sent and is awaiting a response.
///
/// Created by the endpoint on send and handed back, embedded in the
/// [`Response`], once a reply correlates or the timeout sweep expires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub target: IpAddr,
    pub ttl: u8,
    pub seq: u16,
    pub time_sent: Instant,
}

/// The outcome of one probe, as delivered to readers of the endpoint.
#[derive(Debug, Clone)]
pub enum Response {
    EchoReply {
        from: IpAddr,
        request: Request,
        latency: Duration,
    },
    TimeExceeded {
        from: IpAddr,
        request: Request,
        latency: Duration,
    },
    /// Produced by the timeout sweeper for an expired request, or with no
    /// request when a read deadline passed with nothing to deliver.
    Timeout { request: Option<Request> },
}

impl Response {
    /// The originating request, if this response carries one.
    pub fn request(&self) -> Option<&Request> {
        match self {
            Response::EchoReply { request, .. } | Response::TimeExceeded { request, .. } => Some(request),
            Response::Timeout { request } => request.as_ref(),
        }
    }
}
