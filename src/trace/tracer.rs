use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::net::{Error, Response};
use crate::state::{HopStats, Path};
use crate::trace::{Endpoint, discovery, pinger};

/// The probing facade: discovers the path to a target, then keeps a
/// pinger running against every hop that answered.
///
/// Owns the [`Path`]; the UI pulls TTL-ordered snapshots through
/// [`hops`](Tracer::hops) while the engine runs.
pub struct Tracer {
    endpoint: Arc<dyn Endpoint>,
    path: Arc<Path>,
    cancel: CancellationToken,
}

impl Tracer {
    pub fn new(endpoint: Arc<dyn Endpoint>, cancel: CancellationToken) -> Self {
        Self {
            endpoint,
            path: Arc::new(Path::new()),
            cancel,
        }
    }

    /// TTL-ordered snapshot of the hops. The returned slots are the live
    /// ones, so their identity is stable across calls.
    pub fn hops(&self) -> Vec<Arc<HopStats>> {
        self.path.hops()
    }

    /// Zero every hop's counters; pingers keep running.
    pub fn reset_stats(&self) {
        self.path.reset_stats();
    }

    /// Shared handle to the path, for collaborators such as the
    /// display-name worker.
    pub fn path_handle(&self) -> Arc<Path> {
        self.path.clone()
    }

    /// Trace the path to `target` and measure it until cancellation.
    ///
    /// Discovery failing with [`Error::MaxTtlExceeded`] is reported on
    /// return, but the hops that did answer keep their pingers until the
    /// token fires: a reachable prefix is still worth measuring.
    pub async fn run(&self, target: &str, max_ttl: u8) -> Result<(), Error> {
        let dest = self.endpoint.resolve(target)?;
        info!(%target, %dest, "starting trace");
        self.path.clear();

        let outcome = match discovery::discover(self, dest, max_ttl).await {
            Ok(()) => {
                info!(%dest, hops = self.path.len(), "reached target");
                Ok(())
            }
            Err(Error::MaxTtlExceeded(max)) => {
                warn!(%dest, max, "target not reached");
                Err(Error::MaxTtlExceeded(max))
            }
            Err(Error::Cancelled) => return Ok(()),
            Err(err) => return Err(err),
        };

        // keep routing replies to the hops until shutdown
        loop {
            match self.endpoint.read(&self.cancel).await {
                Ok(response) => self.handle_response(&response),
                Err(Error::Cancelled) => return outcome,
                Err(err) => {
                    warn!(%err, "read failed");
                    continue;
                }
            }
        }
    }

    pub(crate) fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Attribute one response to its hop and update the statistics.
    ///
    /// Time-Exceeded came from the router at the probe's TTL. An Echo
    /// reply is matched to the probe's TTL slot while that slot is still
    /// unclaimed (discovery probes); afterwards the sender's address
    /// identifies the hop, which also covers pings sent with a high TTL.
    pub(crate) fn handle_response(&self, response: &Response) {
        match response {
            Response::TimeExceeded { from, request, .. } => {
                let Some(hop) = self.path.get(request.ttl) else {
                    debug!(%from, ttl = request.ttl, "no hop for response");
                    return;
                };
                hop.record_addr(*from);
                hop.record_recv(request.seq);
                self.ensure_pinger(&hop);
            }
            Response::EchoReply { from, request, .. } => {
                let slot = self
                    .path
                    .get(request.ttl)
                    .filter(|hop| hop.ip().is_none_or(|ip| ip == *from));
                let Some(hop) = slot.or_else(|| self.path.find_by_ip(*from)) else {
                    debug!(%from, seq = request.seq, "no hop for reply");
                    return;
                };
                hop.record_addr(*from);
                hop.record_recv(request.seq);
                self.ensure_pinger(&hop);
            }
            Response::Timeout { request: Some(request) } => {
                debug!(seq = request.seq, ttl = request.ttl, "probe lost");
                if let Some(hop) = self
                    .path
                    .find_by_ip(request.target)
                    .or_else(|| self.path.get(request.ttl))
                {
                    hop.record_timeout(request.seq);
                }
            }
            // a read deadline with nothing in flight carries no request
            Response::Timeout { request: None } => {}
        }
    }

    /// Start the hop's pinger unless one is already running.
    pub(crate) fn ensure_pinger(&self, hop: &Arc<HopStats>) {
        if hop.ip().is_some() && hop.claim_pinger() {
            debug!(ttl = hop.ttl(), "starting pinger");
            tokio::spawn(pinger::ping_hop(
                self.endpoint.clone(),
                hop.clone(),
                self.cancel.clone(),
            ));
        }
    }
}
