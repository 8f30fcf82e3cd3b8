//! Polling resolution core
//!
//! Serializes resolution attempts for one resolver: at most one attempt is in
//! flight, concurrent refresh requests join it, and every completed attempt is
//! delivered to the listener exactly once. After a failure the next automatic
//! attempt waits for the backoff delay; after a success it waits for the
//! refresh interval, if one is configured.

use crate::backoff::Backoff;
use crate::discovery::{DiscoveryStrategy, ResultPublisher};
use crate::listener::ResolverListener;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use topos_core::{BackoffConfig, DiscoveryConfig, ResolverResult};

/// Lifecycle phase of a resolver
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolverState {
    Idle,
    Resolving,
    BackingOff,
    Disposed,
}

/// Scheduling options for the polling core
#[derive(Clone, Debug)]
pub struct PollingOptions {
    /// Delay before the next automatic attempt after a success, `None` disables it
    pub refresh_interval: Option<Duration>,

    /// Delay policy after failures
    pub backoff: BackoffConfig,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            refresh_interval: None,
            backoff: BackoffConfig::default(),
        }
    }
}

impl From<&DiscoveryConfig> for PollingOptions {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            refresh_interval: config.refresh_interval,
            backoff: config.backoff.clone(),
        }
    }
}

type Waiter = oneshot::Sender<Option<ResolverResult>>;

struct CoreState {
    phase: ResolverState,
    in_flight: bool,
    waiters: Vec<Waiter>,
    backoff: Backoff,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever a timer is scheduled or cancelled
    timer_generation: u64,
    last_result: Option<ResolverResult>,
    attempts: u64,
}

struct Inner<S> {
    strategy: S,
    listener: Arc<dyn ResolverListener>,
    refresh_interval: Option<Duration>,
    shutdown: CancellationToken,
    state: Mutex<CoreState>,
    /// Held while a result is handed to the listener so results arrive in completion order
    publish: Mutex<()>,
}

/// Single-flight, timer-driven resolver around a [`DiscoveryStrategy`].
///
/// Must be used from within a Tokio runtime. Dropping the resolver disposes it.
pub struct PollingResolver<S: DiscoveryStrategy> {
    inner: Arc<Inner<S>>,
}

impl<S: DiscoveryStrategy> PollingResolver<S> {
    pub fn new(strategy: S, listener: impl ResolverListener, options: PollingOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                strategy,
                listener: Arc::new(listener),
                refresh_interval: options.refresh_interval,
                shutdown: CancellationToken::new(),
                state: Mutex::new(CoreState {
                    phase: ResolverState::Idle,
                    in_flight: false,
                    waiters: Vec::new(),
                    backoff: Backoff::new(options.backoff),
                    timer: None,
                    timer_generation: 0,
                    last_result: None,
                    attempts: 0,
                }),
                publish: Mutex::new(()),
            }),
        }
    }

    /// Kick off the first resolution
    pub fn start(&self) {
        tracing::debug!("Starting resolver");
        self.inner.trigger(None);
    }

    /// Start a resolution unless one is already in flight
    pub fn refresh(&self) {
        self.inner.trigger(None);
    }

    /// Start or join a resolution and wait for its result.
    ///
    /// Returns `None` if `cancel` fires first, if the attempt was abandoned, or
    /// if the resolver is disposed. Firing `cancel` does not stop the shared
    /// resolution.
    pub async fn refresh_and_await(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Option<ResolverResult> {
        let (tx, rx) = oneshot::channel();
        self.inner.trigger(Some(tx));

        match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => None,
                result = rx => result.ok().flatten(),
            },
            None => rx.await.ok().flatten(),
        }
    }

    pub fn state(&self) -> ResolverState {
        self.inner.state.lock().phase
    }

    pub fn last_result(&self) -> Option<ResolverResult> {
        self.inner.state.lock().last_result.clone()
    }

    /// Number of resolution attempts started so far
    pub fn attempts(&self) -> u64 {
        self.inner.state.lock().attempts
    }

    pub fn strategy(&self) -> &S {
        &self.inner.strategy
    }

    /// Dispose the resolver: abandon any in-flight attempt without publishing,
    /// stop the timer, and release the strategy's resources.
    pub fn shutdown(&self) {
        let waiters = {
            let mut state = self.inner.state.lock();
            if state.phase == ResolverState::Disposed {
                return;
            }
            state.phase = ResolverState::Disposed;
            state.timer_generation += 1;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            if state.in_flight {
                // The attempt task releases its own waiters when it observes the cancellation
                Vec::new()
            } else {
                std::mem::take(&mut state.waiters)
            }
        };

        self.inner.shutdown.cancel();
        self.inner.strategy.shutdown();
        for waiter in waiters {
            let _ = waiter.send(None);
        }
        tracing::debug!("Resolver disposed");
    }
}

impl<S: DiscoveryStrategy> Drop for PollingResolver<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S: DiscoveryStrategy> Inner<S> {
    fn trigger(self: &Arc<Self>, waiter: Option<Waiter>) {
        let mut state = self.state.lock();
        if state.phase == ResolverState::Disposed {
            drop(state);
            if let Some(waiter) = waiter {
                let _ = waiter.send(None);
            }
            return;
        }

        if let Some(waiter) = waiter {
            state.waiters.push(waiter);
        }
        if state.in_flight {
            return;
        }

        state.in_flight = true;
        state.phase = ResolverState::Resolving;
        state.attempts += 1;
        state.timer_generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let attempt = state.attempts;
        drop(state);

        let inner = Arc::clone(self);
        let cancel = self.shutdown.child_token();
        tokio::spawn(async move {
            inner.run_attempt(attempt, cancel).await;
        });
    }

    async fn run_attempt(self: Arc<Self>, attempt: u64, cancel: CancellationToken) {
        tracing::debug!(attempt, "Resolution attempt started");
        let (publisher, rx) = ResultPublisher::channel();
        self.strategy.resolve(publisher, cancel.clone()).await;

        let result = if cancel.is_cancelled() {
            None
        } else {
            rx.await.ok()
        };
        self.complete(attempt, result);
    }

    fn complete(self: &Arc<Self>, attempt: u64, result: Option<ResolverResult>) {
        let _publish = self.publish.lock();
        let mut state = self.state.lock();
        state.in_flight = false;
        let waiters = std::mem::take(&mut state.waiters);

        if state.phase == ResolverState::Disposed || self.shutdown.is_cancelled() {
            state.phase = ResolverState::Disposed;
            drop(state);
            tracing::debug!(attempt, "Resolution abandoned");
            for waiter in waiters {
                let _ = waiter.send(None);
            }
            return;
        }

        match &result {
            Some(ResolverResult::Success(addresses)) => {
                state.backoff.reset();
                state.phase = ResolverState::Idle;
                tracing::debug!(attempt, addresses = addresses.len(), "Resolution succeeded");
                if let Some(interval) = self.refresh_interval {
                    self.schedule(&mut state, interval);
                }
            }
            Some(ResolverResult::Failure { status, message, .. }) => {
                let delay = state.backoff.next_delay();
                state.phase = ResolverState::BackingOff;
                tracing::debug!(
                    attempt,
                    status = %status,
                    message = %message,
                    delay_ms = delay.as_millis() as u64,
                    "Resolution failed, backing off"
                );
                self.schedule(&mut state, delay);
            }
            None => {
                state.phase = ResolverState::Idle;
                tracing::debug!(attempt, "Resolution finished without a result");
                if let Some(interval) = self.refresh_interval {
                    self.schedule(&mut state, interval);
                }
            }
        }

        if result.is_some() {
            state.last_result = result.clone();
        }
        drop(state);

        if let Some(result) = &result {
            self.listener.on_result(result.clone());
        }
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }

    /// Arm the timer for the next automatic attempt. The timer task only holds
    /// a weak reference and the values it was given.
    fn schedule(self: &Arc<Self>, state: &mut CoreState, delay: Duration) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.timer_generation += 1;
        let generation = state.timer_generation;
        let weak: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        state.timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.timer_fired(generation);
                    }
                }
            }
        }));
    }

    fn timer_fired(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.timer_generation != generation {
                return;
            }
            // This task is the timer; let it finish instead of aborting it
            state.timer = None;
            if state.phase == ResolverState::BackingOff {
                state.phase = ResolverState::Idle;
            }
        }
        tracing::debug!("Timer fired, refreshing");
        self.trigger(None);
    }
}
