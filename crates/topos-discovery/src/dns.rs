//! DNS-based discovery

use crate::discovery::{DiscoveryStrategy, ResultPublisher};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use topos_core::{
    DiscoveryError, DnsConfig, Endpoint, ResolvedAddress, ResolverResult, StatusCode,
    ATTR_HOST_OVERRIDE,
};

/// Resolves a host name to socket addresses
pub trait HostResolver: Send + Sync + 'static {
    fn lookup(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = io::Result<Vec<SocketAddr>>> + Send;
}

/// System resolver via `tokio::net::lookup_host`
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioHostResolver;

impl HostResolver for TokioHostResolver {
    async fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }
}

/// Discovery strategy that resolves one DNS name to all of its addresses.
///
/// Queries are spaced at least `min_interval` apart, measured from the start
/// of the last successful query. Failed queries do not consume the window.
pub struct DnsDiscovery<R: HostResolver = TokioHostResolver> {
    host: String,
    port: u16,
    min_interval: Duration,
    resolver: R,
    last_success_start: Mutex<Option<Instant>>,
}

impl DnsDiscovery<TokioHostResolver> {
    pub fn new(config: &DnsConfig) -> Self {
        Self::with_resolver(config, TokioHostResolver)
    }
}

impl<R: HostResolver> DnsDiscovery<R> {
    pub fn with_resolver(config: &DnsConfig, resolver: R) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            min_interval: config.min_interval,
            resolver,
            last_success_start: Mutex::new(None),
        }
    }

    /// `host:port` the addresses were resolved from
    pub fn target(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    /// Earliest instant the next query may start
    fn next_allowed(&self) -> Option<Instant> {
        self.last_success_start
            .lock()
            .map(|start| start + self.min_interval)
    }
}

impl<R: HostResolver> DiscoveryStrategy for DnsDiscovery<R> {
    async fn resolve(&self, publisher: ResultPublisher, cancel: CancellationToken) {
        if let Some(ready_at) = self.next_allowed() {
            if ready_at > Instant::now() {
                tracing::debug!(
                    host = %self.host,
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Delaying DNS query to honour the minimum interval"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep_until(ready_at) => {}
                }
            }
        }

        let started = Instant::now();
        let lookup = tokio::select! {
            _ = cancel.cancelled() => return,
            lookup = self.resolver.lookup(&self.host, self.port) => lookup,
        };

        let target = self.target().to_string();
        match lookup {
            Ok(addrs) if !addrs.is_empty() => {
                *self.last_success_start.lock() = Some(started);

                let mut seen = HashSet::new();
                let addresses: Vec<ResolvedAddress> = addrs
                    .into_iter()
                    .filter(|addr| seen.insert(*addr))
                    .map(|addr| {
                        ResolvedAddress::new(Endpoint::from(addr))
                            .with_attribute(ATTR_HOST_OVERRIDE, target.clone())
                    })
                    .collect();

                tracing::info!(
                    host = %self.host,
                    addresses = addresses.len(),
                    "Resolved DNS host"
                );
                publisher.publish(ResolverResult::success(addresses));
            }
            Ok(_) => {
                tracing::error!(host = %self.host, "DNS lookup returned no addresses");
                publisher.publish(ResolverResult::failure(
                    StatusCode::Unavailable,
                    format!("No addresses found for DNS host '{target}'."),
                ));
            }
            Err(err) => {
                tracing::error!(host = %self.host, error = %err, "DNS lookup failed");
                publisher.publish(ResolverResult::failure_with_cause(
                    StatusCode::Unavailable,
                    format!("Error getting DNS hosts for address '{target}'."),
                    DiscoveryError::Dns {
                        host: self.host.clone(),
                        source: err,
                    },
                ));
            }
        }
    }
}
