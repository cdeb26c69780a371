use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::state::HopStats;
use crate::trace::{Endpoint, PING_TTL, PROBE_PAYLOAD};

/// Continuously ping one discovered hop at 1 Hz.
///
/// Each tick records the send on the hop before the frame leaves; replies
/// are attributed by the tracer's response routing, not here. A failed
/// send is logged and the next tick tries again.
pub(crate) async fn ping_hop(
    endpoint: Arc<dyn Endpoint>,
    hop: Arc<HopStats>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                let Some(ip) = hop.ip() else { continue };
                let seq = endpoint.next_seq();
                hop.record_send(seq);
                debug!(%ip, seq, ttl = hop.ttl(), "pinging hop");
                if let Err(err) = endpoint.send(ip, seq, PING_TTL, &PROBE_PAYLOAD) {
                    warn!(%ip, seq, %err, "ping failed");
                }
            }
        }
    }
}
