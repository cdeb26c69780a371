//! In-flight request registry.
//!
//! The endpoint inserts an entry before each send; the dispatcher takes it
//! back out when a reply correlates, and the sweeper removes whatever has
//! been outstanding longer than the read timeout. Keyed by sequence number,
//! which a single endpoint-wide allocator keeps unique until wrap-around.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::net::types::Request;

/// Shared table of requests awaiting a response, keyed by sequence number.
#[derive(Clone, Default)]
pub struct RequestTable {
    inner: Arc<Mutex<HashMap<u16, Request>>>,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, req: Request) {
        self.inner.lock().insert(req.seq, req);
    }

    /// Remove and return the request for `seq`. A second take for the same
    /// sequence returns `None`, which is what drops duplicate replies.
    pub fn take(&self, seq: u16) -> Option<Request> {
        self.inner.lock().remove(&seq)
    }

    /// Remove and return every request outstanding longer than `timeout`.
    /// O(n), with n bounded by the number of in-flight probes.
    pub fn sweep(&self, now: Instant, timeout: Duration) -> Vec<Request> {
        let mut table = self.inner.lock();
        let expired: Vec<u16> = table
            .iter()
            .filter(|(_, req)| now.duration_since(req.time_sent) > timeout)
            .map(|(seq, _)| *seq)
            .collect();
        expired.into_iter().filter_map(|seq| table.remove(&seq)).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
