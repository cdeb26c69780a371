use parking_lot::Mutex;
use socket2::Socket;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::net::codec::{self, ParsedIcmp};
use crate::net::error::Error;
use crate::net::queue::ResponseQueue;
use crate::net::requests::RequestTable;
use crate::net::socket::{self, MAX_FRAME_LEN};
use crate::net::types::{Family, FamilySet, Request, Response};

/// Default deadline for a blocking read, and the age at which an
/// outstanding request is declared lost.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// How often the sweeper checks for expired outstanding requests.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// Endpoint construction options.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub families: FamilySet,
    pub read_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            families: FamilySet::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

// Each endpoint gets its own identifier so several of them (or several
// processes) can share the wire without stealing each other's replies.
static ENDPOINT_COUNTER: AtomicU16 = AtomicU16::new(0);

fn next_instance_id() -> u16 {
    (std::process::id() as u16) ^ ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A process-shared ICMP endpoint.
///
/// Owns the datagram sockets, the in-flight request table and the response
/// queue. Discovery and every per-hop pinger send through it; one reader
/// thread per enabled family plus a timeout sweeper (started by [`serve`])
/// feed the queue that [`read`] drains.
///
/// [`serve`]: IcmpEndpoint::serve
/// [`read`]: IcmpEndpoint::read
pub struct IcmpEndpoint {
    v4: Option<Arc<Socket>>,
    v6: Option<Arc<Socket>>,
    instance_id: u16,
    next_seq: AtomicU16,
    // TTL is a socket option, not a per-message field, so writers take
    // this lock across the option set and the send
    send_lock: Mutex<()>,
    requests: RequestTable,
    queue: Arc<ResponseQueue>,
    read_timeout: Duration,
    sweep_interval: Duration,
    serving: AtomicBool,
}

impl IcmpEndpoint {
    /// Open the endpoint. A family that fails to bind is disabled with a
    /// warning; construction fails only when no family could be enabled.
    pub fn new(config: EndpointConfig) -> Result<Self, Error> {
        let mut v4 = None;
        let mut v6 = None;

        for family in [Family::V4, Family::V6] {
            if !config.families.wants(family) {
                continue;
            }
            match socket::bind_icmp_socket(family, config.read_timeout) {
                Ok(sock) => match family {
                    Family::V4 => v4 = Some(Arc::new(sock)),
                    Family::V6 => v6 = Some(Arc::new(sock)),
                },
                Err(err) => warn!(%family, %err, "could not bind, family disabled"),
            }
        }

        if v4.is_none() && v6.is_none() {
            return Err(Error::NoFamilyAvailable);
        }

        Ok(Self {
            v4,
            v6,
            instance_id: next_instance_id(),
            next_seq: AtomicU16::new(0),
            send_lock: Mutex::new(()),
            requests: RequestTable::new(),
            queue: Arc::new(ResponseQueue::new()),
            read_timeout: config.read_timeout,
            sweep_interval: config.sweep_interval,
            serving: AtomicBool::new(false),
        })
    }

    /// The identifier written into every Echo request this endpoint sends.
    pub fn instance_id(&self) -> u16 {
        self.instance_id
    }

    /// Allocate the next probe sequence number. Endpoint-wide so discovery
    /// and pinger probes can never collide until the 16-bit space wraps.
    pub fn next_seq(&self) -> u16 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Resolve a host to the first address of an enabled family.
    /// Address literals resolve to themselves.
    pub fn resolve(&self, host: &str) -> Result<IpAddr, Error> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return if self.family_enabled(Family::of(ip)) {
                Ok(ip)
            } else {
                Err(Error::UnsupportedFamily(host.to_string()))
            };
        }

        let addrs = format!("{host}:0")
            .to_socket_addrs()
            .map_err(|source| Error::Resolve { host: host.to_string(), source })?;

        addrs
            .map(|addr| addr.ip())
            .find(|ip| self.family_enabled(Family::of(*ip)))
            .ok_or_else(|| Error::UnsupportedFamily(host.to_string()))
    }

    /// Send one Echo request and register it as outstanding.
    ///
    /// The request is registered before the frame leaves so a reply off the
    /// loopback cannot beat the bookkeeping; a failed write rolls it back.
    pub fn send(&self, target: IpAddr, seq: u16, ttl: u8, payload: &[u8]) -> Result<(), Error> {
        let family = Family::of(target);
        let sock = self
            .socket_for(family)
            .ok_or(Error::FamilyDisabled(family))?;

        let _guard = self.send_lock.lock();

        if ttl != 0 {
            socket::set_hop_limit(sock, family, ttl).map_err(Error::SetTtl)?;
        }

        let frame = codec::encode_echo(family, self.instance_id, seq, payload);

        self.requests.insert(Request {
            target,
            ttl,
            seq,
            time_sent: Instant::now(),
        });

        debug!(%target, ttl, seq, "sending probe");
        if let Err(err) = socket::send_frame(sock, &frame, target) {
            self.requests.take(seq);
            return Err(Error::Write(err));
        }
        Ok(())
    }

    /// Pop the next completed response. Returns a bare `Timeout` when the
    /// read deadline passes with nothing delivered, and `Cancelled` when
    /// the token fires.
    pub async fn read(&self, cancel: &CancellationToken) -> Result<Response, Error> {
        match tokio::time::timeout(self.read_timeout, self.queue.pop_wait(cancel)).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(Error::Cancelled),
            Err(_) => Ok(Response::Timeout { request: None }),
        }
    }

    /// Start the dispatcher: one reader thread per enabled family and the
    /// timeout sweeper. Safe to call once per endpoint; later calls are
    /// ignored. Must run inside a tokio runtime.
    pub fn serve(&self, cancel: CancellationToken) {
        if self.serving.swap(true, Ordering::SeqCst) {
            warn!("serve called twice, ignoring");
            return;
        }

        for (family, sock) in [(Family::V4, &self.v4), (Family::V6, &self.v6)] {
            let Some(sock) = sock else { continue };
            let reader = Reader {
                socket: sock.clone(),
                family,
                instance_id: self.instance_id,
                requests: self.requests.clone(),
                queue: self.queue.clone(),
                cancel: cancel.clone(),
            };
            std::thread::spawn(move || reader.run());
        }

        tokio::spawn(run_sweeper(
            self.requests.clone(),
            self.queue.clone(),
            self.read_timeout,
            self.sweep_interval,
            cancel,
        ));
    }

    fn family_enabled(&self, family: Family) -> bool {
        self.socket_for(family).is_some()
    }

    fn socket_for(&self, family: Family) -> Option<&Arc<Socket>> {
        match family {
            Family::V4 => self.v4.as_ref(),
            Family::V6 => self.v6.as_ref(),
        }
    }
}

/// Reader half of the dispatcher: drains one socket, correlates frames and
/// feeds the response queue. Runs on a dedicated thread because the socket
/// read blocks (bounded by the read timeout).
struct Reader {
    socket: Arc<Socket>,
    family: Family,
    instance_id: u16,
    requests: RequestTable,
    queue: Arc<ResponseQueue>,
    cancel: CancellationToken,
}

impl Reader {
    fn run(self) {
        let mut buffer = [0u8; MAX_FRAME_LEN];

        while !self.cancel.is_cancelled() {
            let (len, from) = match socket::recv_frame(&self.socket, &mut buffer) {
                Ok(read) => read,
                Err(err) => {
                    // deadline expiries keep the loop responsive to
                    // cancellation and are not worth logging
                    use std::io::ErrorKind;
                    if !matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) {
                        warn!(family = %self.family, %err, "read failed");
                    }
                    continue;
                }
            };

            let parsed = match codec::decode(self.family, &buffer[..len]) {
                Ok(parsed) => parsed,
                Err(err) => {
                    debug!(family = %self.family, %from, %err, "ignoring frame");
                    continue;
                }
            };

            if let Some(response) = correlate(parsed, from, self.instance_id, &self.requests) {
                self.queue.push(response);
            }
        }
    }
}

/// Match a parsed frame against the in-flight table.
///
/// Frames carrying another endpoint's identifier and frames with no
/// outstanding request (stale or duplicate) are dropped here, silently.
fn correlate(
    parsed: ParsedIcmp,
    from: IpAddr,
    instance_id: u16,
    requests: &RequestTable,
) -> Option<Response> {
    let (id, seq) = match parsed {
        ParsedIcmp::EchoReply { id, seq } => (id, seq),
        ParsedIcmp::TimeExceeded { inner_id, inner_seq } => (inner_id, inner_seq),
    };

    if id != instance_id {
        debug!(%from, id, seq, "ignoring frame: incorrect id");
        return None;
    }

    let Some(request) = requests.take(seq) else {
        debug!(%from, seq, "ignoring frame: no outstanding request");
        return None;
    };

    let latency = request.time_sent.elapsed();
    Some(match parsed {
        ParsedIcmp::EchoReply { .. } => Response::EchoReply { from, request, latency },
        ParsedIcmp::TimeExceeded { .. } => Response::TimeExceeded { from, request, latency },
    })
}

/// Periodically expire outstanding requests into `Timeout` responses so
/// readers learn about lost probes.
async fn run_sweeper(
    requests: RequestTable,
    queue: Arc<ResponseQueue>,
    read_timeout: Duration,
    sweep_interval: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                for request in requests.sweep(Instant::now(), read_timeout) {
                    debug!(seq = request.seq, ttl = request.ttl, "request timed out");
                    queue.push(Response::Timeout { request: Some(request) });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const OUR_ID: u16 = 0x4242;

    fn router() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))
    }

    fn in_flight(seq: u16) -> RequestTable {
        let requests = RequestTable::new();
        requests.insert(Request {
            target: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)),
            ttl: 4,
            seq,
            time_sent: Instant::now(),
        });
        requests
    }

    #[test]
    fn test_correlate_matches_in_flight_request() {
        let requests = in_flight(11);
        let parsed = ParsedIcmp::EchoReply { id: OUR_ID, seq: 11 };

        let response = correlate(parsed, router(), OUR_ID, &requests).unwrap();
        match response {
            Response::EchoReply { from, request, .. } => {
                assert_eq!(from, router());
                assert_eq!(request.seq, 11);
                assert_eq!(request.ttl, 4);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        assert!(requests.is_empty());
    }

    #[test]
    fn test_correlate_drops_incorrect_id() {
        // well-formed reply, seq of an in-flight request, wrong identifier:
        // nothing is delivered and the request stays in flight
        let requests = in_flight(11);
        let parsed = ParsedIcmp::EchoReply { id: OUR_ID ^ 1, seq: 11 };

        assert!(correlate(parsed, router(), OUR_ID, &requests).is_none());
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn test_correlate_drops_incorrect_inner_id() {
        let requests = in_flight(3);
        let parsed = ParsedIcmp::TimeExceeded { inner_id: 0x9999, inner_seq: 3 };

        assert!(correlate(parsed, router(), OUR_ID, &requests).is_none());
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn test_correlate_drops_stale_seq() {
        let requests = in_flight(5);
        let parsed = ParsedIcmp::EchoReply { id: OUR_ID, seq: 6 };

        assert!(correlate(parsed, router(), OUR_ID, &requests).is_none());
        // in-flight entry for seq 5 untouched
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn test_correlate_drops_duplicate_reply() {
        let requests = in_flight(8);
        let parsed = ParsedIcmp::TimeExceeded { inner_id: OUR_ID, inner_seq: 8 };

        assert!(correlate(parsed, router(), OUR_ID, &requests).is_some());
        // the duplicate finds no request and is dropped
        assert!(correlate(parsed, router(), OUR_ID, &requests).is_none());
    }

    #[tokio::test]
    async fn test_sweeper_expires_old_requests() {
        // request expiry is measured on the wall clock, so this test runs
        // in real time with short timeouts
        let requests = RequestTable::new();
        let queue = Arc::new(ResponseQueue::new());
        let cancel = CancellationToken::new();
        let read_timeout = Duration::from_millis(100);

        requests.insert(Request {
            target: router(),
            ttl: 1,
            seq: 21,
            time_sent: Instant::now(),
        });

        tokio::spawn(run_sweeper(
            requests.clone(),
            queue.clone(),
            read_timeout,
            Duration::from_millis(25),
            cancel.clone(),
        ));

        // not expired before the read timeout
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.is_empty());
        assert_eq!(requests.len(), 1);

        // expired no later than read_timeout + sweep_interval (plus slack)
        tokio::time::sleep(Duration::from_millis(150)).await;
        let response = queue.try_pop().expect("timeout response queued");
        match response {
            Response::Timeout { request: Some(request) } => assert_eq!(request.seq, 21),
            other => panic!("unexpected response: {other:?}"),
        }
        assert!(requests.is_empty());

        cancel.cancel();
    }

    #[test]
    fn test_instance_ids_differ_per_endpoint() {
        let a = next_instance_id();
        let b = next_instance_id();
        assert_ne!(a, b);
    }
}
