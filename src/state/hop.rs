use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Live statistics for one hop on the path.
///
/// Shared between the tracer's response routing, the hop's pinger and the
/// UI's snapshot taker; every access goes through the internal lock. The
/// TTL is fixed at construction and the address, once learned, never
/// changes.
pub struct HopStats {
    ttl: u8,
    inner: Mutex<HopInner>,
}

#[derive(Default)]
struct HopInner {
    ip: Option<IpAddr>,
    display_name: Option<String>,
    sent: u64,
    received: u64,
    rtts: Vec<Duration>,
    sent_at_seq: HashMap<u16, Instant>,
    has_pinger: bool,
}

/// Read-only view of one hop for the UI, taken under the lock in one go.
#[derive(Debug, Clone)]
pub struct HopSnapshot {
    pub ttl: u8,
    pub ip: Option<IpAddr>,
    pub display_name: Option<String>,
    pub sent: u64,
    pub received: u64,
    pub loss: f64,
    pub avg_rtt: Duration,
    pub median_rtt: Duration,
}

impl HopStats {
    pub fn new(ttl: u8) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HopInner::default()),
        }
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.inner.lock().ip
    }

    pub fn display_name(&self) -> Option<String> {
        self.inner.lock().display_name.clone()
    }

    pub fn set_display_name(&self, name: String) {
        self.inner.lock().display_name = Some(name);
    }

    /// Record the hop's address. The first non-empty value wins; later
    /// calls are ignored.
    pub fn record_addr(&self, ip: IpAddr) {
        let mut inner = self.inner.lock();
        if inner.ip.is_none() {
            inner.ip = Some(ip);
        }
    }

    /// Record an outbound probe for this hop.
    pub fn record_send(&self, seq: u16) {
        let mut inner = self.inner.lock();
        inner.sent += 1;
        inner.sent_at_seq.insert(seq, Instant::now());
    }

    /// Record a reply attributed to this hop. The RTT sample is taken from
    /// the matching send, when it is still known.
    pub fn record_recv(&self, seq: u16) {
        let mut inner = self.inner.lock();
        inner.received += 1;
        if let Some(sent_at) = inner.sent_at_seq.remove(&seq) {
            inner.rtts.push(sent_at.elapsed());
        }
    }

    /// Drop the pending send for a probe declared lost. Counts nothing;
    /// loss is already visible as the sent/received gap.
    pub fn record_timeout(&self, seq: u16) {
        self.inner.lock().sent_at_seq.remove(&seq);
    }

    /// Zero the counters and samples. The pinger, if any, keeps running.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.sent = 0;
        inner.received = 0;
        inner.rtts.clear();
        inner.sent_at_seq.clear();
    }

    /// Claim the right to run this hop's pinger. Returns true exactly once.
    pub fn claim_pinger(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.has_pinger {
            false
        } else {
            inner.has_pinger = true;
            true
        }
    }

    pub fn has_pinger(&self) -> bool {
        self.inner.lock().has_pinger
    }

    pub fn packets_sent_received(&self) -> (u64, u64) {
        let inner = self.inner.lock();
        (inner.sent, inner.received)
    }

    /// Fraction of probes lost, 0 when nothing was sent.
    pub fn loss(&self) -> f64 {
        let inner = self.inner.lock();
        loss_of(&inner)
    }

    /// Mean of the recorded round-trip times, zero when there are none.
    pub fn avg_rtt(&self) -> Duration {
        let inner = self.inner.lock();
        avg_of(&inner.rtts)
    }

    /// Order-statistic median of the recorded round-trip times; the mean
    /// of the two middle samples for even counts.
    pub fn median_rtt(&self) -> Duration {
        let inner = self.inner.lock();
        median_of(&inner.rtts)
    }

    pub fn snapshot(&self) -> HopSnapshot {
        let inner = self.inner.lock();
        HopSnapshot {
            ttl: self.ttl,
            ip: inner.ip,
            display_name: inner.display_name.clone(),
            sent: inner.sent,
            received: inner.received,
            loss: loss_of(&inner),
            avg_rtt: avg_of(&inner.rtts),
            median_rtt: median_of(&inner.rtts),
        }
    }
}

fn loss_of(inner: &HopInner) -> f64 {
    if inner.sent == 0 {
        0.0
    } else {
        1.0 - (inner.received as f64 / inner.sent as f64)
    }
}

fn avg_of(rtts: &[Duration]) -> Duration {
    if rtts.is_empty() {
        return Duration::ZERO;
    }
    rtts.iter().sum::<Duration>() / rtts.len() as u32
}

fn median_of(rtts: &[Duration]) -> Duration {
    let n = rtts.len();
    if n == 0 {
        return Duration::ZERO;
    }
    // sort a copy; samples stay in arrival order
    let mut sorted = rtts.to_vec();
    sorted.sort_unstable();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn router() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
    }

    #[test]
    fn test_initial_state() {
        let hop = HopStats::new(3);
        assert_eq!(hop.ttl(), 3);
        assert_eq!(hop.ip(), None);
        assert_eq!(hop.packets_sent_received(), (0, 0));
        assert_eq!(hop.loss(), 0.0);
        assert_eq!(hop.avg_rtt(), Duration::ZERO);
        assert_eq!(hop.median_rtt(), Duration::ZERO);
        assert!(!hop.has_pinger());
    }

    #[test]
    fn test_send_recv_round_trip() {
        let hop = HopStats::new(1);
        hop.record_send(5);
        hop.record_recv(5);

        let (sent, received) = hop.packets_sent_received();
        assert_eq!((sent, received), (1, 1));
        assert_eq!(hop.loss(), 0.0);
        assert!(hop.median_rtt() > Duration::ZERO);
    }

    #[test]
    fn test_recv_without_matching_send_has_no_sample() {
        let hop = HopStats::new(1);
        hop.record_send(1);
        hop.record_recv(2);

        // counted, but no RTT sample without a matching send time
        assert_eq!(hop.packets_sent_received(), (1, 1));
        assert_eq!(hop.avg_rtt(), Duration::ZERO);
    }

    #[test]
    fn test_loss_fraction() {
        let hop = HopStats::new(2);
        for seq in 0..10u16 {
            hop.record_send(seq);
        }
        for seq in [0u16, 2, 4, 6] {
            hop.record_recv(seq);
        }
        assert!((hop.loss() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_counters_monotonic() {
        let hop = HopStats::new(2);
        let mut last = (0, 0);
        for seq in 0..20u16 {
            hop.record_send(seq);
            if seq % 3 == 0 {
                hop.record_recv(seq);
            }
            let now = hop.packets_sent_received();
            assert!(now.0 >= last.0);
            assert!(now.1 >= last.1);
            assert!(now.1 <= now.0);
            last = now;
        }
    }

    #[test]
    fn test_timeout_drops_pending_send_only() {
        let hop = HopStats::new(4);
        hop.record_send(9);
        hop.record_timeout(9);

        assert_eq!(hop.packets_sent_received(), (1, 0));
        assert_eq!(hop.loss(), 1.0);

        // a late reply after the timeout no longer yields a sample
        hop.record_recv(9);
        assert_eq!(hop.avg_rtt(), Duration::ZERO);
    }

    #[test]
    fn test_addr_write_once() {
        let hop = HopStats::new(1);
        hop.record_addr(router());
        hop.record_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(hop.ip(), Some(router()));
    }

    #[test]
    fn test_claim_pinger_once() {
        let hop = HopStats::new(1);
        assert!(hop.claim_pinger());
        assert!(!hop.claim_pinger());
        assert!(hop.has_pinger());
    }

    #[test]
    fn test_reset_keeps_identity_and_pinger() {
        let hop = HopStats::new(6);
        hop.record_addr(router());
        assert!(hop.claim_pinger());
        hop.record_send(1);
        hop.record_recv(1);

        hop.reset();

        assert_eq!(hop.packets_sent_received(), (0, 0));
        assert_eq!(hop.avg_rtt(), Duration::ZERO);
        // address, ttl and the running pinger survive a reset
        assert_eq!(hop.ip(), Some(router()));
        assert_eq!(hop.ttl(), 6);
        assert!(hop.has_pinger());
    }

    #[test]
    fn test_median_odd_and_even() {
        let hop = HopStats::new(1);
        {
            let mut inner = hop.inner.lock();
            inner.rtts = vec![
                Duration::from_millis(30),
                Duration::from_millis(10),
                Duration::from_millis(20),
            ];
        }
        assert_eq!(hop.median_rtt(), Duration::from_millis(20));
        assert_eq!(hop.avg_rtt(), Duration::from_millis(20));

        {
            let mut inner = hop.inner.lock();
            inner.rtts.push(Duration::from_millis(40));
        }
        assert_eq!(hop.median_rtt(), Duration::from_millis(25));

        // median never reorders the samples
        let inner = hop.inner.lock();
        assert_eq!(inner.rtts[0], Duration::from_millis(30));
    }
}
