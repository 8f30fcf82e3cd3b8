//! Error types for topology discovery

use crate::types::Endpoint;
use thiserror::Error;

/// Main error type for topology discovery
#[derive(Error, Debug)]
pub enum DiscoveryError {
    // Per-node gossip outcomes
    #[error("gossip query to {endpoint} timed out")]
    GossipTimeout { endpoint: Endpoint },

    #[error("node {endpoint} reported no viable endpoints")]
    NoViableEndpoints { endpoint: Endpoint },

    #[error("gossip query to {endpoint} failed: {message}")]
    GossipFailure { endpoint: Endpoint, message: String },

    // Attempt-scoped
    #[error("discovery failed: {0}")]
    DiscoveryFailure(String),

    #[error("operation cancelled")]
    Cancelled,

    // Transport errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("dns lookup for {host} failed: {source}")]
    Dns {
        host: String,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("client has been disposed")]
    Disposed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoveryError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::GossipTimeout { .. }
                | Self::NoViableEndpoints { .. }
                | Self::GossipFailure { .. }
                | Self::DiscoveryFailure(_)
                | Self::Transport(_)
                | Self::Dns { .. }
                | Self::Io(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for topology discovery
pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_node_errors_are_retriable() {
        let endpoint = Endpoint::new("node1", 2113);
        assert!(DiscoveryError::GossipTimeout {
            endpoint: endpoint.clone()
        }
        .is_retriable());
        assert!(DiscoveryError::NoViableEndpoints { endpoint }.is_retriable());
        assert!(!DiscoveryError::InvalidConfig("x".into()).is_retriable());
        assert!(!DiscoveryError::Cancelled.is_retriable());
        assert!(DiscoveryError::Cancelled.is_cancelled());
    }
}
