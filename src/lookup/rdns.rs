//! Display names for hop addresses.
//!
//! Name resolution is a pure transform on the address, pluggable through
//! the [`NameResolver`] trait and performed by a background worker so a
//! lookup can never delay a probe.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::state::Path;

/// Turn a hop address into a name to display, or nothing when the address
/// has no name.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Option<String>;
}

struct CacheEntry {
    hostname: Option<String>,
    cached_at: Instant,
}

/// Reverse-DNS resolver with an in-memory cache.
pub struct ReverseDns {
    resolver: TokioAsyncResolver,
    cache: RwLock<HashMap<IpAddr, CacheEntry>>,
    cache_ttl: Duration,
}

impl ReverseDns {
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

impl Default for ReverseDns {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NameResolver for ReverseDns {
    async fn lookup(&self, ip: IpAddr) -> Option<String> {
        {
            let cache = self.cache.read();
            if let Some(entry) = cache.get(&ip)
                && entry.cached_at.elapsed() < self.cache_ttl
            {
                return entry.hostname.clone();
            }
        }

        let hostname = match self.resolver.reverse_lookup(ip).await {
            Ok(lookup) => lookup
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string()),
            Err(_) => None,
        };

        self.cache.write().insert(
            ip,
            CacheEntry {
                hostname: hostname.clone(),
                cached_at: Instant::now(),
            },
        );

        hostname
    }
}

/// Maximum lookups in flight per scan
const MAX_CONCURRENT_LOOKUPS: usize = 10;

/// Periodically fill in display names for hops that have an address but
/// no name yet.
pub async fn run_rdns_worker(
    resolver: Arc<dyn NameResolver>,
    path: Arc<Path>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(500));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                let pending: Vec<_> = path
                    .hops()
                    .into_iter()
                    .filter(|hop| hop.display_name().is_none())
                    .filter_map(|hop| hop.ip().map(|ip| (hop, ip)))
                    .take(MAX_CONCURRENT_LOOKUPS)
                    .collect();

                if pending.is_empty() {
                    continue;
                }

                let lookups = pending.iter().map(|(_, ip)| {
                    let resolver = resolver.clone();
                    let ip = *ip;
                    async move { resolver.lookup(ip).await }
                });

                let names = futures::future::join_all(lookups).await;
                for ((hop, _), name) in pending.iter().zip(names) {
                    if let Some(name) = name {
                        hop.set_display_name(name);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Path;
    use std::net::Ipv4Addr;

    struct StaticResolver;

    #[async_trait]
    impl NameResolver for StaticResolver {
        async fn lookup(&self, ip: IpAddr) -> Option<String> {
            match ip {
                IpAddr::V4(v4) if v4.octets()[3] == 1 => Some("gw.example.net".to_string()),
                _ => None,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_fills_display_names() {
        let path = Arc::new(Path::new());
        path.grow_to(2);
        path.get(1).unwrap().record_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        path.get(2).unwrap().record_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));

        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run_rdns_worker(
            Arc::new(StaticResolver),
            path.clone(),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();
        worker.await.unwrap();

        assert_eq!(
            path.get(1).unwrap().display_name(),
            Some("gw.example.net".to_string())
        );
        // unnamed addresses simply stay unnamed
        assert_eq!(path.get(2).unwrap().display_name(), None);
    }
}
