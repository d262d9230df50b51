//! Node run state: block production on/off and the shutdown signal.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::info;

/// Shared by the control commands, the block producer and the server.
#[derive(Debug)]
pub struct NodeLifecycle {
    producing: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl NodeLifecycle {
    pub fn new(producing: bool) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            producing: AtomicBool::new(producing),
            shutdown_tx,
        }
    }

    /// Resume block production. Returns the previous state.
    pub fn start(&self) -> bool {
        let was = self.producing.swap(true, Ordering::SeqCst);
        if !was {
            info!("Block production started");
        }
        was
    }

    /// Pause block production. Returns the previous state.
    pub fn stop(&self) -> bool {
        let was = self.producing.swap(false, Ordering::SeqCst);
        if was {
            info!("Block production stopped");
        }
        was
    }

    pub fn is_producing(&self) -> bool {
        self.producing.load(Ordering::SeqCst)
    }

    /// Signal every subscriber to shut down. Idempotent.
    pub fn request_shutdown(&self) {
        self.producing.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
        info!("Shutdown requested");
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Receiver that flips to `true` once shutdown is requested.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

impl Default for NodeLifecycle {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop_report_previous_state() {
        let lifecycle = NodeLifecycle::new(false);
        assert!(!lifecycle.start());
        assert!(lifecycle.start());
        assert!(lifecycle.is_producing());
        assert!(lifecycle.stop());
        assert!(!lifecycle.is_producing());
    }

    #[tokio::test]
    async fn test_shutdown_reaches_late_subscribers() {
        let lifecycle = NodeLifecycle::default();
        let mut early = lifecycle.subscribe_shutdown();
        lifecycle.request_shutdown();
        let late = lifecycle.subscribe_shutdown();

        early.changed().await.unwrap();
        assert!(*early.borrow());
        assert!(*late.borrow());
        assert!(lifecycle.is_shutting_down());
        assert!(!lifecycle.is_producing());
    }
}
