//! Hard navigation on terminal session failure.

use std::fmt::Debug;
use tokio::sync::broadcast;
use tracing::{debug, info};

const DEFAULT_CAPACITY: usize = 16;

/// Leaves the current page for `path`, dropping all in-memory page state.
pub trait Navigator: Send + Sync + Debug {
    fn navigate(&self, path: &str);
}

/// Publishes navigation targets to every subscriber.
#[derive(Debug, Clone)]
pub struct BroadcastNavigator {
    tx: broadcast::Sender<String>,
}

impl BroadcastNavigator {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNavigator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Navigator for BroadcastNavigator {
    fn navigate(&self, path: &str) {
        info!("Navigating to {path}");
        if self.tx.send(path.to_string()).is_err() {
            debug!("No navigation subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_targets() {
        let navigator = BroadcastNavigator::default();
        let mut rx = navigator.subscribe();

        navigator.navigate("/login");

        assert_eq!(rx.recv().await.ok(), Some("/login".to_string()));
    }

    #[test]
    fn navigate_without_subscribers_is_harmless() {
        BroadcastNavigator::new(0).navigate("/login");
    }
}
