//! Discovery strategies

use crate::client::ClientFactory;
use crate::dns::{DnsDiscovery, HostResolver, TokioHostResolver};
use crate::gossip::GossipDiscovery;
use std::future::Future;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use topos_core::{DiscoveryConfig, Endpoint, ResolvedAddress, ResolverResult, Result, StatusCode};

/// A discovery mechanism driven by [`PollingResolver`](crate::PollingResolver).
///
/// `resolve` publishes at most one result through `publisher`. Returning
/// without publishing (for example because `cancel` fired) produces no result.
pub trait DiscoveryStrategy: Send + Sync + 'static {
    /// Discover the current endpoints
    fn resolve(
        &self,
        publisher: ResultPublisher,
        cancel: CancellationToken,
    ) -> impl Future<Output = ()> + Send;

    /// Release resources owned by the strategy when the resolver is disposed
    fn shutdown(&self) {}
}

/// Hands one result from a strategy back to the polling core
pub struct ResultPublisher {
    tx: oneshot::Sender<ResolverResult>,
}

impl ResultPublisher {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<ResolverResult>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn publish(self, result: ResolverResult) {
        let _ = self.tx.send(result);
    }
}

/// Static list discovery (for single-node deployments and testing)
pub struct StaticDiscovery {
    endpoints: Vec<Endpoint>,
}

impl StaticDiscovery {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }
}

impl DiscoveryStrategy for StaticDiscovery {
    async fn resolve(&self, publisher: ResultPublisher, cancel: CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        if self.endpoints.is_empty() {
            publisher.publish(ResolverResult::failure(
                StatusCode::Unavailable,
                "No static endpoints configured.",
            ));
            return;
        }
        let addresses = self
            .endpoints
            .iter()
            .cloned()
            .map(ResolvedAddress::new)
            .collect();
        publisher.publish(ResolverResult::success(addresses));
    }
}

/// Strategy chosen at construction time
pub enum Discovery<F: ClientFactory, R: HostResolver = TokioHostResolver> {
    Gossip(GossipDiscovery<F>),
    Dns(DnsDiscovery<R>),
    Static(StaticDiscovery),
}

impl<F: ClientFactory> Discovery<F, TokioHostResolver> {
    /// DNS discovery when `config.dns` is set, gossip over `config.seeds` otherwise
    pub fn from_config(config: &DiscoveryConfig, factory: F) -> Result<Self> {
        config.validate()?;
        let discovery = match &config.dns {
            Some(dns) => Self::Dns(DnsDiscovery::new(dns)),
            None => Self::Gossip(GossipDiscovery::from_config(factory, config)),
        };
        Ok(discovery)
    }
}

impl<F: ClientFactory, R: HostResolver> Discovery<F, R> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gossip(_) => "gossip",
            Self::Dns(_) => "dns",
            Self::Static(_) => "static",
        }
    }
}

impl<F: ClientFactory, R: HostResolver> DiscoveryStrategy for Discovery<F, R> {
    async fn resolve(&self, publisher: ResultPublisher, cancel: CancellationToken) {
        match self {
            Self::Gossip(gossip) => gossip.resolve(publisher, cancel).await,
            Self::Dns(dns) => dns.resolve(publisher, cancel).await,
            Self::Static(fixed) => fixed.resolve(publisher, cancel).await,
        }
    }

    fn shutdown(&self) {
        match self {
            Self::Gossip(gossip) => gossip.shutdown(),
            Self::Dns(dns) => dns.shutdown(),
            Self::Static(fixed) => fixed.shutdown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFactory;
    use topos_core::{DiscoveryError, DnsConfig};

    #[test]
    fn test_static_discovery_publishes_endpoints() {
        let discovery = StaticDiscovery::new(vec![
            Endpoint::new("node1", 2113),
            Endpoint::new("node2", 2113),
        ]);
        let (publisher, rx) = ResultPublisher::channel();
        tokio_test::block_on(discovery.resolve(publisher, CancellationToken::new()));

        let result = tokio_test::block_on(rx).unwrap();
        assert_eq!(result.addresses().unwrap().len(), 2);
    }

    #[test]
    fn test_cancelled_static_discovery_publishes_nothing() {
        let discovery = StaticDiscovery::new(vec![Endpoint::new("node1", 2113)]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (publisher, rx) = ResultPublisher::channel();
        tokio_test::block_on(discovery.resolve(publisher, cancel));

        assert!(tokio_test::block_on(rx).is_err());
    }

    #[tokio::test]
    async fn test_empty_static_discovery_fails() {
        let discovery = StaticDiscovery::new(Vec::new());
        let (publisher, rx) = ResultPublisher::channel();
        discovery.resolve(publisher, CancellationToken::new()).await;

        assert_eq!(rx.await.unwrap().status(), Some(StatusCode::Unavailable));
    }

    #[test]
    fn test_from_config_picks_strategy() {
        let config = DiscoveryConfig::with_seeds(vec![Endpoint::new("node1", 2113)]);
        let discovery = Discovery::from_config(&config, ScriptedFactory::new()).unwrap();
        assert_eq!(discovery.kind(), "gossip");

        let config = DiscoveryConfig {
            dns: Some(DnsConfig::new("cluster.local", 2113)),
            ..DiscoveryConfig::default()
        };
        let discovery = Discovery::from_config(&config, ScriptedFactory::new()).unwrap();
        assert_eq!(discovery.kind(), "dns");
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let result = Discovery::from_config(&DiscoveryConfig::default(), ScriptedFactory::new());
        assert!(matches!(result, Err(DiscoveryError::InvalidConfig(_))));
    }
}
