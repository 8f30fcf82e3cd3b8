//! Delivery of resolver results to the connection layer

use tokio::sync::watch;
use topos_core::ResolverResult;

/// Receives the outcome of every completed resolution attempt
pub trait ResolverListener: Send + Sync + 'static {
    fn on_result(&self, result: ResolverResult);
}

impl<F> ResolverListener for F
where
    F: Fn(ResolverResult) + Send + Sync + 'static,
{
    fn on_result(&self, result: ResolverResult) {
        self(result)
    }
}

/// Listener that keeps only the latest result in a watch channel
pub struct WatchListener {
    tx: watch::Sender<Option<ResolverResult>>,
}

impl WatchListener {
    pub fn new() -> (Self, watch::Receiver<Option<ResolverResult>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ResolverResult>> {
        self.tx.subscribe()
    }
}

impl ResolverListener for WatchListener {
    fn on_result(&self, result: ResolverResult) {
        self.tx.send_replace(Some(result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topos_core::{Endpoint, ResolvedAddress, StatusCode};

    #[tokio::test]
    async fn test_watch_listener_keeps_latest() {
        let (listener, mut rx) = WatchListener::new();
        assert!(rx.borrow().is_none());

        listener.on_result(ResolverResult::failure(StatusCode::Unavailable, "down"));
        listener.on_result(ResolverResult::success(vec![ResolvedAddress::new(
            Endpoint::new("node1", 2113),
        )]));

        rx.changed().await.unwrap();
        let latest = rx.borrow().clone().unwrap();
        assert!(latest.is_success());
    }
}
