use parking_lot::RwLock;
use std::net::IpAddr;
use std::sync::Arc;

use crate::state::hop::HopStats;

/// The hops discovered towards a target, ordered by TTL starting at 1.
///
/// Unresponsive hops keep their slot with an empty address, so the
/// sequence only ever grows during discovery. Slots are shared: pingers
/// and the UI hold the same `Arc<HopStats>` the path does, which gives
/// the UI stable row identity across snapshots.
#[derive(Default)]
pub struct Path {
    hops: RwLock<Vec<Arc<HopStats>>>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a slot exists for every TTL up to and including `ttl`, and
    /// return the slot for `ttl`.
    pub fn grow_to(&self, ttl: u8) -> Arc<HopStats> {
        let mut hops = self.hops.write();
        while hops.len() < ttl as usize {
            let next_ttl = hops.len() as u8 + 1;
            hops.push(Arc::new(HopStats::new(next_ttl)));
        }
        hops[ttl as usize - 1].clone()
    }

    /// The slot for `ttl`, if discovery has reached it.
    pub fn get(&self, ttl: u8) -> Option<Arc<HopStats>> {
        if ttl == 0 {
            return None;
        }
        self.hops.read().get(ttl as usize - 1).cloned()
    }

    /// The hop that answered from `ip`, if any.
    pub fn find_by_ip(&self, ip: IpAddr) -> Option<Arc<HopStats>> {
        self.hops.read().iter().find(|hop| hop.ip() == Some(ip)).cloned()
    }

    /// TTL-ordered snapshot of the hop slots.
    pub fn hops(&self) -> Vec<Arc<HopStats>> {
        self.hops.read().clone()
    }

    pub fn len(&self) -> usize {
        self.hops.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.read().is_empty()
    }

    /// Drop all hops; used when a trace is (re)started.
    pub fn clear(&self) {
        self.hops.write().clear();
    }

    /// Reset every hop's counters in place.
    pub fn reset_stats(&self) {
        for hop in self.hops.read().iter() {
            hop.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_grow_preserves_gaps() {
        let path = Path::new();
        let first = path.grow_to(1);
        first.record_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));

        let third = path.grow_to(3);
        third.record_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 2, 1)));

        // hop 2 never answered: present slot, empty address
        assert_eq!(path.len(), 3);
        let hops = path.hops();
        assert_eq!(hops[0].ttl(), 1);
        assert_eq!(hops[1].ttl(), 2);
        assert_eq!(hops[1].ip(), None);
        assert_eq!(hops[2].ip(), Some(IpAddr::V4(Ipv4Addr::new(10, 0, 2, 1))));
    }

    #[test]
    fn test_grow_to_is_idempotent() {
        let path = Path::new();
        let a = path.grow_to(2);
        let b = path.grow_to(2);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn test_get_out_of_range() {
        let path = Path::new();
        path.grow_to(2);
        assert!(path.get(0).is_none());
        assert!(path.get(3).is_none());
        assert!(path.get(2).is_some());
    }

    #[test]
    fn test_find_by_ip() {
        let path = Path::new();
        let router = IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1));
        path.grow_to(2);
        path.get(2).unwrap().record_addr(router);

        let found = path.find_by_ip(router).unwrap();
        assert_eq!(found.ttl(), 2);
        assert!(path.find_by_ip(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 2))).is_none());
    }

    #[test]
    fn test_reset_stats_keeps_slots() {
        let path = Path::new();
        let hop = path.grow_to(1);
        hop.record_send(1);
        hop.record_recv(1);

        path.reset_stats();

        assert_eq!(path.len(), 1);
        assert_eq!(hop.packets_sent_received(), (0, 0));
    }
}
