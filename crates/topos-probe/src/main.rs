//! Topos Probe - discovers a cluster and reports its topology

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use topos_core::{DiscoveryConfig, DnsConfig, Endpoint, NodePreference, ResolverResult};
use topos_discovery::{Discovery, HttpClientFactory, PollingOptions, PollingResolver};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "topos-probe")]
#[command(about = "Discover cluster nodes through gossip or DNS")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Gossip seed endpoint (host:port), may be repeated
    #[arg(short, long = "seed")]
    seeds: Vec<Endpoint>,

    /// Resolve nodes from this DNS name (host:port) instead of gossip
    #[arg(long)]
    dns: Option<Endpoint>,

    /// Per-node gossip timeout in milliseconds
    #[arg(long)]
    gossip_timeout_ms: Option<u64>,

    /// Refresh interval after a success in milliseconds, 0 disables it
    #[arg(long)]
    refresh_interval_ms: Option<u64>,

    /// Preferred node role (leader, follower, read_only_replica, any)
    #[arg(long)]
    preference: Option<NodePreference>,

    /// Resolve once, print the addresses and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<DiscoveryConfig> {
        let mut config = match &self.config {
            Some(path) => DiscoveryConfig::from_json_file(path)?,
            None => DiscoveryConfig::default(),
        };

        if !self.seeds.is_empty() {
            config.seeds = self.seeds;
        }
        if let Some(dns) = self.dns {
            config.dns = Some(DnsConfig::new(dns.host(), dns.port()));
        }
        if let Some(ms) = self.gossip_timeout_ms {
            config.gossip_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.refresh_interval_ms {
            config.refresh_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(preference) = self.preference {
            config.node_preference = preference;
        }

        config.validate()?;
        Ok(config)
    }
}

fn report(result: &ResolverResult) {
    match result {
        ResolverResult::Success(addresses) => {
            let endpoints: Vec<String> =
                addresses.iter().map(|a| a.endpoint.to_string()).collect();
            tracing::info!(count = endpoints.len(), endpoints = ?endpoints, "Topology updated");
        }
        ResolverResult::Failure {
            status, message, ..
        } => {
            tracing::warn!(%status, %message, "Discovery failed");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, discovered addresses to stdout
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let once = args.once;
    let config = args.into_config()?;

    let discovery = Discovery::from_config(&config, HttpClientFactory::new()?)?;
    tracing::info!(
        mode = discovery.kind(),
        seeds = config.seeds.len(),
        "Starting topos probe"
    );

    let resolver = PollingResolver::new(
        discovery,
        |result: ResolverResult| report(&result),
        PollingOptions::from(&config),
    );

    if once {
        let result = resolver.refresh_and_await(None).await;
        resolver.shutdown();
        return match result {
            Some(ResolverResult::Success(addresses)) => {
                for address in &addresses {
                    println!("{}", serde_json::to_string(address)?);
                }
                Ok(())
            }
            Some(ResolverResult::Failure { message, .. }) => anyhow::bail!(message),
            None => anyhow::bail!("resolution was cancelled"),
        };
    }

    resolver.start();
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    resolver.shutdown();

    Ok(())
}
