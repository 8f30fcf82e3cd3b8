//! Configuration types for topology discovery

use crate::error::{DiscoveryError, Result};
use crate::types::{Endpoint, NodePreference};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for a discovery resolver
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Statically configured seed endpoints
    pub seeds: Vec<Endpoint>,

    /// Upper bound on a single node's gossip query
    #[serde(with = "duration_millis")]
    pub gossip_timeout: Duration,

    /// Periodic refresh interval, `None` disables the timer
    #[serde(with = "option_duration_millis")]
    pub refresh_interval: Option<Duration>,

    /// Backoff between failed resolutions
    pub backoff: BackoffConfig,

    /// Preferred node role
    pub node_preference: NodePreference,

    /// DNS discovery, used instead of gossip when set
    pub dns: Option<DnsConfig>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            gossip_timeout: Duration::from_secs(5),
            refresh_interval: Some(Duration::from_secs(30)),
            backoff: BackoffConfig::default(),
            node_preference: NodePreference::Leader,
            dns: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_seeds(seeds: Vec<Endpoint>) -> Self {
        Self {
            seeds,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check the configuration for values the resolver cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.seeds.is_empty() && self.dns.is_none() {
            return Err(invalid("at least one seed endpoint or a dns host is required"));
        }
        if self.gossip_timeout.is_zero() {
            return Err(invalid("gossip_timeout must be greater than zero"));
        }
        if self.refresh_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(invalid("refresh_interval must be greater than zero when set"));
        }
        self.backoff.validate()?;
        if let Some(dns) = &self.dns {
            dns.validate()?;
        }
        Ok(())
    }
}

/// Backoff between failed resolution cycles
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay after the first failure
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Upper bound on any delay
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    /// Growth factor applied after each failure
    pub multiplier: f64,

    /// Random spread as a fraction of the delay (0 disables)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
            multiplier: 1.6,
            jitter: 0.2,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay > self.max_delay {
            return Err(invalid("backoff initial_delay must not exceed max_delay"));
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(invalid("backoff multiplier must be at least 1.0"));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(invalid("backoff jitter must be within [0, 1]"));
        }
        Ok(())
    }
}

/// DNS-based discovery
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Name to resolve
    pub host: String,

    /// Port attached to every resolved address
    pub port: u16,

    /// Minimum spacing between actual DNS queries
    #[serde(with = "duration_millis", default = "DnsConfig::default_min_interval")]
    pub min_interval: Duration,
}

impl DnsConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            min_interval: Self::default_min_interval(),
        }
    }

    fn default_min_interval() -> Duration {
        Duration::from_secs(30)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(invalid("dns host must not be empty"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> DiscoveryError {
    DiscoveryError::InvalidConfig(message.to_string())
}

// Serde helpers for Duration
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_needs_seeds() {
        let config = DiscoveryConfig::default();
        assert!(matches!(
            config.validate(),
            Err(DiscoveryError::InvalidConfig(_))
        ));

        let config = DiscoveryConfig::with_seeds(vec![Endpoint::new("node1", 2113)]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{
            "seeds": ["node1:2113", "node2:2113"],
            "gossip_timeout": 2500,
            "refresh_interval": null,
            "node_preference": "follower",
            "backoff": { "initial_delay": 100, "max_delay": 1000 }
        }"#;

        let config = DiscoveryConfig::from_json_str(json).unwrap();
        assert_eq!(config.seeds.len(), 2);
        assert_eq!(config.gossip_timeout, Duration::from_millis(2500));
        assert_eq!(config.refresh_interval, None);
        assert_eq!(config.node_preference, NodePreference::Follower);
        assert_eq!(config.backoff.initial_delay, Duration::from_millis(100));
        assert_eq!(config.backoff.multiplier, 1.6);
    }

    #[test]
    fn test_dns_only_config_is_valid() {
        let json = r#"{ "dns": { "host": "cluster.local", "port": 2113 } }"#;
        let config = DiscoveryConfig::from_json_str(json).unwrap();
        let dns = config.dns.unwrap();
        assert_eq!(dns.min_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_reject_inverted_backoff() {
        let mut config = DiscoveryConfig::with_seeds(vec![Endpoint::new("node1", 2113)]);
        config.backoff.initial_delay = Duration::from_secs(10);
        config.backoff.max_delay = Duration::from_secs(1);
        assert!(config.validate().is_err());

        config.backoff = BackoffConfig {
            jitter: 1.5,
            ..BackoffConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_zero_refresh_interval() {
        let mut config = DiscoveryConfig::with_seeds(vec![Endpoint::new("node1", 2113)]);
        config.refresh_interval = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
