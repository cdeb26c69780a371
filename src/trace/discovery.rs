use std::net::IpAddr;
use tracing::debug;

use crate::net::{Error, Response};
use crate::trace::{PROBE_PAYLOAD, Tracer};

/// Walk the path to `dest` by probing with increasing TTL.
///
/// One probe is in flight at a time: each iteration sends at the next TTL
/// and waits for exactly one response. Routers that answer fill their
/// slot; a timeout leaves the slot's address empty and moves on, so gaps
/// survive in the path. The first Echo reply from `dest` itself ends
/// discovery, even when earlier slots stayed empty.
pub(crate) async fn discover(tracer: &Tracer, dest: IpAddr, max_ttl: u8) -> Result<(), Error> {
    for ttl in 1..=max_ttl {
        let hop = tracer.path().grow_to(ttl);
        let seq = tracer.endpoint().next_seq();
        hop.record_send(seq);
        tracer.endpoint().send(dest, seq, ttl, &PROBE_PAYLOAD)?;

        let response = tracer.endpoint().read(tracer.cancel()).await?;
        tracer.handle_response(&response);

        match &response {
            Response::EchoReply { from, .. } if *from == dest => {
                debug!(%dest, ttl, "destination reached");
                return Ok(());
            }
            Response::TimeExceeded { from, request, .. } => {
                debug!(%from, ttl = request.ttl, "hop discovered");
            }
            _ => {
                debug!(ttl, "no answer at this ttl");
            }
        }
    }

    Err(Error::MaxTtlExceeded(max_ttl))
}
