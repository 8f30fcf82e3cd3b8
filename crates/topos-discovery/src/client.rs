//! Membership client contract

use std::future::Future;
use tokio_util::sync::CancellationToken;
use topos_core::{ClusterMember, Endpoint, Result};

/// One node's view of cluster membership.
///
/// Implementations must stop and return [`DiscoveryError::Cancelled`] once
/// `cancel` fires, so callers can tell a deadline apart from a transport error.
///
/// [`DiscoveryError::Cancelled`]: topos_core::DiscoveryError::Cancelled
pub trait MembershipClient: Send + Sync + 'static {
    /// Query the node for the current cluster members
    fn cluster_members(
        &self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Vec<ClusterMember>>> + Send;

    /// Release connection resources. Idempotent.
    fn dispose(&self);
}

/// Creates the membership client for an endpoint
pub trait ClientFactory: Send + Sync + 'static {
    type Client: MembershipClient;

    fn create(&self, endpoint: &Endpoint) -> Self::Client;
}

impl<F, C> ClientFactory for F
where
    F: Fn(&Endpoint) -> C + Send + Sync + 'static,
    C: MembershipClient,
{
    type Client = C;

    fn create(&self, endpoint: &Endpoint) -> C {
        self(endpoint)
    }
}
