//! Scripted doubles for membership clients, host resolvers and listeners

use crate::client::{ClientFactory, MembershipClient};
use crate::dns::HostResolver;
use crate::listener::ResolverListener;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use topos_core::{
    ClusterMember, DiscoveryError, Endpoint, NodeId, NodeRole, ResolverResult, Result,
};

/// How a scripted node answers a gossip query
#[derive(Clone, Debug)]
pub(crate) enum Script {
    /// Reply with these members
    Members(Vec<ClusterMember>),
    /// Reply with an empty member list
    Empty,
    /// Fail with a transport error
    Fail,
    /// Wait until the query token fires
    Hang,
    /// Never answer and ignore the query token
    Stall,
}

#[derive(Default)]
struct FactoryState {
    scripts: Mutex<HashMap<Endpoint, Script>>,
    created: Mutex<Vec<Endpoint>>,
    disposed: Mutex<Vec<Endpoint>>,
    queried: Mutex<Vec<Endpoint>>,
    next_id: AtomicU64,
}

/// Factory handing out [`ScriptedClient`]s that share one call log
#[derive(Clone, Default)]
pub(crate) struct ScriptedFactory {
    state: Arc<FactoryState>,
}

impl ScriptedFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(&self, endpoint: &Endpoint, script: Script) -> &Self {
        self.state.scripts.lock().insert(endpoint.clone(), script);
        self
    }

    pub(crate) fn created(&self) -> Vec<Endpoint> {
        self.state.created.lock().clone()
    }

    pub(crate) fn disposed(&self) -> Vec<Endpoint> {
        self.state.disposed.lock().clone()
    }

    pub(crate) fn queried(&self) -> Vec<Endpoint> {
        self.state.queried.lock().clone()
    }
}

impl ClientFactory for ScriptedFactory {
    type Client = ScriptedClient;

    fn create(&self, endpoint: &Endpoint) -> ScriptedClient {
        self.state.created.lock().push(endpoint.clone());
        ScriptedClient {
            id: self.state.next_id.fetch_add(1, Ordering::SeqCst),
            endpoint: endpoint.clone(),
            state: self.state.clone(),
            disposals: AtomicUsize::new(0),
        }
    }
}

pub(crate) struct ScriptedClient {
    id: u64,
    endpoint: Endpoint,
    state: Arc<FactoryState>,
    disposals: AtomicUsize,
}

impl ScriptedClient {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl MembershipClient for ScriptedClient {
    async fn cluster_members(&self, cancel: CancellationToken) -> Result<Vec<ClusterMember>> {
        self.state.queried.lock().push(self.endpoint.clone());
        let script = self
            .state
            .scripts
            .lock()
            .get(&self.endpoint)
            .cloned()
            .unwrap_or(Script::Fail);

        match script {
            Script::Members(members) => Ok(members),
            Script::Empty => Ok(Vec::new()),
            Script::Fail => Err(DiscoveryError::Transport("connection refused".into())),
            Script::Hang => {
                cancel.cancelled().await;
                Err(DiscoveryError::Cancelled)
            }
            Script::Stall => std::future::pending().await,
        }
    }

    fn dispose(&self) {
        if self.disposals.fetch_add(1, Ordering::SeqCst) == 0 {
            self.state.disposed.lock().push(self.endpoint.clone());
        }
    }
}

pub(crate) fn member(host: &str, role: NodeRole) -> ClusterMember {
    ClusterMember::new(NodeId::random(), Endpoint::new(host, 2113), role, true)
}

pub(crate) fn dead_member(host: &str, role: NodeRole) -> ClusterMember {
    ClusterMember::new(NodeId::random(), Endpoint::new(host, 2113), role, false)
}

/// Listener that records every published result
#[derive(Clone, Default)]
pub(crate) struct RecordingListener {
    results: Arc<Mutex<Vec<ResolverResult>>>,
}

impl RecordingListener {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn results(&self) -> Vec<ResolverResult> {
        self.results.lock().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.results.lock().len()
    }
}

impl ResolverListener for RecordingListener {
    fn on_result(&self, result: ResolverResult) {
        self.results.lock().push(result);
    }
}

/// Host resolver answering from a fixed table and recording lookup times
#[derive(Clone, Default)]
pub(crate) struct ScriptedHostResolver {
    answers: Arc<Mutex<Option<io::Result<Vec<SocketAddr>>>>>,
    lookups: Arc<Mutex<Vec<Instant>>>,
    latency: Duration,
}

impl ScriptedHostResolver {
    pub(crate) fn answering(addrs: Vec<SocketAddr>) -> Self {
        let resolver = Self::default();
        resolver.set_answer(Ok(addrs));
        resolver
    }

    pub(crate) fn failing() -> Self {
        let resolver = Self::default();
        resolver.set_answer(Err(io::Error::new(io::ErrorKind::NotFound, "no such host")));
        resolver
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn set_answer(&self, answer: io::Result<Vec<SocketAddr>>) {
        *self.answers.lock() = Some(answer);
    }

    pub(crate) fn lookups(&self) -> Vec<Instant> {
        self.lookups.lock().clone()
    }
}

impl HostResolver for ScriptedHostResolver {
    async fn lookup(&self, _host: &str, _port: u16) -> io::Result<Vec<SocketAddr>> {
        self.lookups.lock().push(Instant::now());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.answers.lock().as_ref() {
            Some(Ok(addrs)) => Ok(addrs.clone()),
            Some(Err(err)) => Err(io::Error::new(err.kind(), err.to_string())),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no answer scripted")),
        }
    }
}
