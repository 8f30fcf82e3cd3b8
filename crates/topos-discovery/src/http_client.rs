//! HTTP gossip client
//!
//! Queries `GET http://{endpoint}/gossip` and maps the JSON member list onto
//! [`ClusterMember`] values.

use crate::client::{ClientFactory, MembershipClient};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use topos_core::{ClusterMember, DiscoveryError, Endpoint, NodeId, NodeRole, Result};
use uuid::Uuid;

/// Gossip response body
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GossipResponse {
    #[serde(default)]
    pub members: Vec<MemberInfo>,
}

/// One entry of a gossip response
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    #[serde(default)]
    pub instance_id: Uuid,
    pub state: String,
    pub is_alive: bool,
    pub http_end_point_ip: String,
    pub http_end_point_port: u16,
}

impl From<MemberInfo> for ClusterMember {
    fn from(info: MemberInfo) -> Self {
        ClusterMember::new(
            NodeId::new(info.instance_id),
            Endpoint::new(info.http_end_point_ip, info.http_end_point_port),
            NodeRole::from_state_name(&info.state),
            info.is_alive,
        )
    }
}

/// Creates [`HttpMembershipClient`]s sharing one connection pool
#[derive(Clone)]
pub struct HttpClientFactory {
    client: Client,
}

impl HttpClientFactory {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| DiscoveryError::Transport(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl ClientFactory for HttpClientFactory {
    type Client = HttpMembershipClient;

    fn create(&self, endpoint: &Endpoint) -> HttpMembershipClient {
        HttpMembershipClient::new(self.client.clone(), endpoint.clone())
    }
}

/// Membership client for a single node
pub struct HttpMembershipClient {
    client: Client,
    endpoint: Endpoint,
    url: String,
    disposed: AtomicBool,
}

impl HttpMembershipClient {
    pub fn new(client: Client, endpoint: Endpoint) -> Self {
        let url = format!("http://{}/gossip", endpoint);
        Self {
            client,
            endpoint,
            url,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn fetch(&self) -> Result<GossipResponse> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Transport(format!("HTTP {}: {}", status, text)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DiscoveryError::Transport(e.to_string()))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl MembershipClient for HttpMembershipClient {
    async fn cluster_members(&self, cancel: CancellationToken) -> Result<Vec<ClusterMember>> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(DiscoveryError::Disposed);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            response = self.fetch() => response?,
        };

        tracing::trace!(
            endpoint = %self.endpoint,
            members = response.members.len(),
            "Received gossip"
        );
        Ok(response.members.into_iter().map(ClusterMember::from).collect())
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            tracing::debug!(endpoint = %self.endpoint, "Disposed gossip client");
        }
    }
}
