//! Process-level shutdown signal shared by every wait in the engine.

use crate::clock::Clock;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled by shutdown")]
pub struct Cancelled;

/// Fires the signal. Dropping it without firing leaves receivers waiting
/// forever.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl Shutdown {
    /// A signal that never fires.
    pub fn never() -> Self {
        channel().1
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Trigger dropped without firing.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep on `clock`, returning early with `Cancelled` on shutdown.
    pub async fn sleep(&self, clock: &dyn Clock, duration: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            biased;
            _ = self.triggered() => Err(Cancelled),
            _ = clock.sleep(duration) => Ok(()),
        }
    }
}
