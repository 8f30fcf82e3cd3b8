//! Gossip-based discovery
//!
//! Each attempt walks the pooled endpoints in random order and asks each node
//! for its view of the cluster. The first node that reports live members wins:
//! the pool is reconciled against the reported members and the ordered
//! addresses are published. If every node fails, the pool falls back to the
//! configured seeds and a failure is published.

use crate::client::{ClientFactory, MembershipClient};
use crate::discovery::{DiscoveryStrategy, ResultPublisher};
use crate::pool::EndpointClientPool;
use crate::preference::select_members;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use topos_core::{
    ClusterMember, DiscoveryConfig, DiscoveryError, Endpoint, NodePreference, ResolvedAddress,
    ResolverResult, Result, StatusCode,
};

/// Message published when no pooled node produced a usable member list
pub const NO_VIABLE_NODES: &str = "No viable nodes found.";

/// Orders the endpoints queried in one attempt
pub type Shuffler = Arc<dyn Fn(&mut [Endpoint]) + Send + Sync>;

/// Random order, fresh for each attempt
pub fn random_shuffler() -> Shuffler {
    Arc::new(|endpoints: &mut [Endpoint]| endpoints.shuffle(&mut rand::rng()))
}

/// What to do with the pool after every node failed
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FailurePolicy {
    /// Dispose every client and start over from the seed endpoints
    #[default]
    ReseedToSeeds,
    /// Keep the last discovered endpoints for the next attempt
    KeepLastKnown,
}

/// Discovery strategy that queries cluster members over gossip
pub struct GossipDiscovery<F: ClientFactory> {
    /// Membership clients, one per queried endpoint
    pool: EndpointClientPool<F>,

    /// Statically configured seeds
    seeds: Vec<Endpoint>,

    /// Bound on each node's query
    gossip_timeout: Duration,

    /// Ordering of published addresses
    preference: NodePreference,

    failure_policy: FailurePolicy,

    shuffler: Shuffler,
}

impl<F: ClientFactory> GossipDiscovery<F> {
    pub fn new(factory: F, seeds: Vec<Endpoint>, gossip_timeout: Duration) -> Self {
        let pool = EndpointClientPool::with_seeds(factory, &seeds);
        Self {
            pool,
            seeds,
            gossip_timeout,
            preference: NodePreference::default(),
            failure_policy: FailurePolicy::default(),
            shuffler: random_shuffler(),
        }
    }

    pub fn from_config(factory: F, config: &DiscoveryConfig) -> Self {
        Self::new(factory, config.seeds.clone(), config.gossip_timeout)
            .with_preference(config.node_preference)
    }

    pub fn with_preference(mut self, preference: NodePreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_shuffler(mut self, shuffler: Shuffler) -> Self {
        self.shuffler = shuffler;
        self
    }

    pub fn pool(&self) -> &EndpointClientPool<F> {
        &self.pool
    }

    pub fn seeds(&self) -> &[Endpoint] {
        &self.seeds
    }

    /// Query one node, bounded by the gossip timeout.
    ///
    /// The node query runs under a child of `cancel`: the timeout cancels the
    /// child only. `Cancelled` is returned only when `cancel` itself fired.
    async fn query(
        &self,
        endpoint: &Endpoint,
        client: &F::Client,
        cancel: &CancellationToken,
    ) -> Result<Vec<ClusterMember>> {
        let node_cancel = cancel.child_token();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            outcome = tokio::time::timeout(
                self.gossip_timeout,
                client.cluster_members(node_cancel.clone()),
            ) => outcome,
        };
        node_cancel.cancel();

        let members = match outcome {
            Err(_elapsed) => {
                return Err(DiscoveryError::GossipTimeout {
                    endpoint: endpoint.clone(),
                })
            }
            Ok(Err(DiscoveryError::Cancelled)) if cancel.is_cancelled() => {
                return Err(DiscoveryError::Cancelled)
            }
            Ok(Err(DiscoveryError::Cancelled)) => {
                return Err(DiscoveryError::GossipTimeout {
                    endpoint: endpoint.clone(),
                })
            }
            Ok(Err(err)) => {
                return Err(DiscoveryError::GossipFailure {
                    endpoint: endpoint.clone(),
                    message: err.to_string(),
                })
            }
            Ok(Ok(members)) => members,
        };

        let alive: Vec<ClusterMember> = members.into_iter().filter(|m| m.is_alive).collect();
        if alive.is_empty() {
            return Err(DiscoveryError::NoViableEndpoints {
                endpoint: endpoint.clone(),
            });
        }
        Ok(alive)
    }

    /// Align the pool with the members a node reported
    fn reconcile(&self, members: &[ClusterMember]) {
        let discovered: Vec<Endpoint> = members.iter().map(|m| m.endpoint.clone()).collect();
        let changes = self.pool.update(&discovered);
        if !changes.is_empty() {
            tracing::debug!(
                added = changes.added.len(),
                removed = changes.removed.len(),
                "Updated membership clients"
            );
        }
    }
}

impl<F: ClientFactory> DiscoveryStrategy for GossipDiscovery<F> {
    async fn resolve(&self, publisher: ResultPublisher, cancel: CancellationToken) {
        let mut endpoints = self.pool.endpoints();
        (self.shuffler)(&mut endpoints);

        for endpoint in &endpoints {
            if cancel.is_cancelled() {
                return;
            }
            let Some(client) = self.pool.get_or_create(endpoint) else {
                return;
            };

            match self.query(endpoint, &client, &cancel).await {
                Ok(members) => {
                    let addresses: Vec<ResolvedAddress> = select_members(&members, self.preference)
                        .iter()
                        .map(ResolvedAddress::from_member)
                        .collect();
                    if addresses.is_empty() {
                        let err = DiscoveryError::NoViableEndpoints {
                            endpoint: endpoint.clone(),
                        };
                        tracing::warn!(endpoint = %endpoint, "{}", err);
                        continue;
                    }
                    self.reconcile(&members);
                    tracing::info!(
                        endpoint = %endpoint,
                        addresses = addresses.len(),
                        "Discovered cluster members"
                    );
                    publisher.publish(ResolverResult::success(addresses));
                    return;
                }
                Err(DiscoveryError::Cancelled) => {
                    tracing::debug!("Gossip discovery cancelled");
                    return;
                }
                Err(err @ DiscoveryError::GossipTimeout { .. }) => {
                    tracing::warn!(
                        endpoint = %endpoint,
                        timeout_ms = self.gossip_timeout.as_millis() as u64,
                        "{}",
                        err
                    );
                }
                Err(err) => {
                    tracing::warn!(endpoint = %endpoint, "{}", err);
                }
            }
        }

        if cancel.is_cancelled() {
            return;
        }

        if self.failure_policy == FailurePolicy::ReseedToSeeds {
            self.pool.reseed(&self.seeds);
        }
        tracing::error!(queried = endpoints.len(), "{}", NO_VIABLE_NODES);
        publisher.publish(ResolverResult::failure_with_cause(
            StatusCode::Unavailable,
            NO_VIABLE_NODES,
            DiscoveryError::DiscoveryFailure(format!(
                "{} gossip endpoints queried without success",
                endpoints.len()
            )),
        ));
    }

    fn shutdown(&self) {
        self.pool.close();
    }
}
