//! Core types for topology discovery

use crate::error::DiscoveryError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Network endpoint of a cluster node (host name or IP literal plus port)
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({})", self)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DiscoveryError::InvalidEndpoint(s.to_string());

        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;

        let host = match host.strip_prefix('[') {
            Some(rest) => rest.strip_suffix(']').ok_or_else(invalid)?,
            // An unbracketed host may not itself contain a colon
            None if host.contains(':') => return Err(invalid()),
            None => host,
        };

        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = DiscoveryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Node identifier reported by gossip
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a node reports for itself in the cluster
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum NodeRole {
    Initializing,
    DiscoverLeader,
    Unknown,
    PreReplica,
    CatchingUp,
    Clone,
    Follower,
    PreLeader,
    Leader,
    Manager,
    ShuttingDown,
    Shutdown,
    ReadOnlyLeaderless,
    PreReadOnlyReplica,
    ReadOnlyReplica,
    ResigningLeader,
}

impl NodeRole {
    /// Map a gossip state name onto a role. Unrecognised names become `Unknown`.
    pub fn from_state_name(name: &str) -> Self {
        match name {
            "Initializing" => Self::Initializing,
            "DiscoverLeader" => Self::DiscoverLeader,
            "PreReplica" => Self::PreReplica,
            "CatchingUp" => Self::CatchingUp,
            "Clone" => Self::Clone,
            "Follower" => Self::Follower,
            "PreLeader" => Self::PreLeader,
            "Leader" => Self::Leader,
            "Manager" => Self::Manager,
            "ShuttingDown" => Self::ShuttingDown,
            "Shutdown" => Self::Shutdown,
            "ReadOnlyLeaderless" => Self::ReadOnlyLeaderless,
            "PreReadOnlyReplica" => Self::PreReadOnlyReplica,
            "ReadOnlyReplica" => Self::ReadOnlyReplica,
            "ResigningLeader" => Self::ResigningLeader,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::DiscoverLeader => "DiscoverLeader",
            Self::Unknown => "Unknown",
            Self::PreReplica => "PreReplica",
            Self::CatchingUp => "CatchingUp",
            Self::Clone => "Clone",
            Self::Follower => "Follower",
            Self::PreLeader => "PreLeader",
            Self::Leader => "Leader",
            Self::Manager => "Manager",
            Self::ShuttingDown => "ShuttingDown",
            Self::Shutdown => "Shutdown",
            Self::ReadOnlyLeaderless => "ReadOnlyLeaderless",
            Self::PreReadOnlyReplica => "PreReadOnlyReplica",
            Self::ReadOnlyReplica => "ReadOnlyReplica",
            Self::ResigningLeader => "ResigningLeader",
        }
    }

    /// Roles that can never serve client traffic
    pub fn is_unservable(&self) -> bool {
        matches!(self, Self::Manager | Self::ShuttingDown | Self::Shutdown)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One member of the cluster as reported by a gossip query
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub node_id: NodeId,
    pub endpoint: Endpoint,
    pub role: NodeRole,
    pub is_alive: bool,
}

impl ClusterMember {
    pub fn new(node_id: NodeId, endpoint: Endpoint, role: NodeRole, is_alive: bool) -> Self {
        Self {
            node_id,
            endpoint,
            role,
            is_alive,
        }
    }
}

/// Desired role class when choosing among discovered nodes
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodePreference {
    #[default]
    Leader,
    Follower,
    ReadOnlyReplica,
    Any,
}

impl FromStr for NodePreference {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leader" => Ok(Self::Leader),
            "follower" => Ok(Self::Follower),
            "readonlyreplica" | "read_only_replica" | "read-only-replica" => {
                Ok(Self::ReadOnlyReplica)
            }
            "any" | "random" => Ok(Self::Any),
            other => Err(DiscoveryError::InvalidConfig(format!(
                "unknown node preference: {other}"
            ))),
        }
    }
}

/// Attribute key carrying the node id of a gossip-discovered address
pub const ATTR_NODE_ID: &str = "node_id";

/// Attribute key carrying the reported role of a gossip-discovered address
pub const ATTR_NODE_ROLE: &str = "node_role";

/// Attribute key carrying the original `host:port` of a DNS-discovered address
pub const ATTR_HOST_OVERRIDE: &str = "host_override";

/// Address published to the downstream listener
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAddress {
    pub endpoint: Endpoint,
    pub attributes: BTreeMap<String, Value>,
}

impl ResolvedAddress {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Address carrying the node id and role of a gossip member
    pub fn from_member(member: &ClusterMember) -> Self {
        Self::new(member.endpoint.clone())
            .with_attribute(ATTR_NODE_ID, member.node_id.to_string())
            .with_attribute(ATTR_NODE_ROLE, member.role.as_str())
    }
}

/// Status attached to a failed resolution
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum StatusCode {
    Unavailable,
    Cancelled,
    DeadlineExceeded,
    InvalidArgument,
    Internal,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unavailable => "Unavailable",
            Self::Cancelled => "Cancelled",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::InvalidArgument => "InvalidArgument",
            Self::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// Outcome of one completed resolution attempt
#[derive(Clone, Debug)]
pub enum ResolverResult {
    Success(Vec<ResolvedAddress>),
    Failure {
        status: StatusCode,
        message: String,
        cause: Option<Arc<DiscoveryError>>,
    },
}

impl ResolverResult {
    pub fn success(addresses: Vec<ResolvedAddress>) -> Self {
        Self::Success(addresses)
    }

    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Failure {
            status,
            message: message.into(),
            cause: None,
        }
    }

    pub fn failure_with_cause(
        status: StatusCode,
        message: impl Into<String>,
        cause: DiscoveryError,
    ) -> Self {
        Self::Failure {
            status,
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn addresses(&self) -> Option<&[ResolvedAddress]> {
        match self {
            Self::Success(addresses) => Some(addresses),
            Self::Failure { .. } => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Success(_) => None,
            Self::Failure { status, .. } => Some(*status),
        }
    }
}
