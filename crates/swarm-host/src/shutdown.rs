//! # Shutdown Signal
//!
//! Cancellation token shared by the host's `main`, the lifecycle manager and
//! every module. Any holder may trigger it; `main` waits on it alongside OS
//! signals and then tears the host down.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Cloneable, level-triggered shutdown flag backed by a `watch` channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Repeated triggers are no-ops.
    pub fn trigger(&self) {
        let was_triggered = self.tx.send_replace(true);
        if !was_triggered {
            info!("Shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once shutdown has been requested (immediately if it already
    /// was).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // The sender lives in `self`, so the channel cannot close here.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Raw receiver for callers that select on it themselves.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
