//! Endpoint client pool

use crate::client::{ClientFactory, MembershipClient};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use topos_core::Endpoint;

/// Endpoints added and removed by a reconciliation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolChanges {
    pub added: Vec<Endpoint>,
    pub removed: Vec<Endpoint>,
}

impl PoolChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Membership clients keyed by endpoint.
///
/// Holds at most one client per endpoint. A client is disposed exactly once,
/// by whichever caller removes it from the map.
pub struct EndpointClientPool<F: ClientFactory> {
    /// Pooled clients
    clients: DashMap<Endpoint, Arc<F::Client>>,

    /// Client constructor
    factory: F,

    /// Set once the owning resolver is disposed
    closed: AtomicBool,
}

impl<F: ClientFactory> EndpointClientPool<F> {
    pub fn new(factory: F) -> Self {
        Self {
            clients: DashMap::new(),
            factory,
            closed: AtomicBool::new(false),
        }
    }

    /// Create a pool already populated with `seeds`
    pub fn with_seeds(factory: F, seeds: &[Endpoint]) -> Self {
        let pool = Self::new(factory);
        pool.reseed(seeds);
        pool
    }

    /// Get the client for an endpoint, creating it on first use.
    /// Returns `None` once the pool is closed.
    pub fn get_or_create(&self, endpoint: &Endpoint) -> Option<Arc<F::Client>> {
        if self.is_closed() {
            return None;
        }
        let client = self
            .clients
            .entry(endpoint.clone())
            .or_insert_with(|| {
                tracing::debug!(endpoint = %endpoint, "Creating membership client");
                Arc::new(self.factory.create(endpoint))
            })
            .clone();
        Some(client)
    }

    /// Get the client for an endpoint if one is pooled
    pub fn get(&self, endpoint: &Endpoint) -> Option<Arc<F::Client>> {
        self.clients.get(endpoint).map(|c| c.clone())
    }

    /// Add a client for `endpoint`. Returns false if one was already pooled.
    pub fn add(&self, endpoint: &Endpoint) -> bool {
        if self.is_closed() || self.clients.contains_key(endpoint) {
            return false;
        }
        let mut created = false;
        self.clients.entry(endpoint.clone()).or_insert_with(|| {
            created = true;
            tracing::debug!(endpoint = %endpoint, "Adding membership client");
            Arc::new(self.factory.create(endpoint))
        });
        created
    }

    /// Remove and dispose the client for `endpoint`
    pub fn remove(&self, endpoint: &Endpoint) -> bool {
        match self.clients.remove(endpoint) {
            Some((endpoint, client)) => {
                tracing::debug!(endpoint = %endpoint, "Disposing membership client");
                client.dispose();
                true
            }
            None => false,
        }
    }

    /// Align the pool with a discovered endpoint set: add missing endpoints,
    /// dispose endpoints that are no longer listed. Clients for endpoints
    /// present on both sides are kept as they are.
    pub fn update(&self, discovered: &[Endpoint]) -> PoolChanges {
        let wanted: HashSet<&Endpoint> = discovered.iter().collect();
        let mut changes = PoolChanges::default();

        for endpoint in self.endpoints() {
            if !wanted.contains(&endpoint) && self.remove(&endpoint) {
                changes.removed.push(endpoint);
            }
        }

        for endpoint in discovered {
            if self.add(endpoint) {
                changes.added.push(endpoint.clone());
            }
        }

        changes
    }

    /// Dispose every pooled client and rebuild the pool from `seeds`
    pub fn reseed(&self, seeds: &[Endpoint]) {
        self.dispose_all();
        for seed in seeds {
            self.add(seed);
        }
        tracing::debug!(seeds = seeds.len(), "Reseeded membership clients");
    }

    /// Dispose every pooled client
    pub fn dispose_all(&self) {
        for endpoint in self.endpoints() {
            self.remove(&endpoint);
        }
    }

    /// Dispose every pooled client and refuse further additions
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.dispose_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Pooled endpoints in sorted order
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = self.clients.iter().map(|e| e.key().clone()).collect();
        endpoints.sort();
        endpoints
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.clients.contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl<F: ClientFactory> Drop for EndpointClientPool<F> {
    fn drop(&mut self) {
        for entry in self.clients.iter() {
            entry.value().dispose();
        }
    }
}
