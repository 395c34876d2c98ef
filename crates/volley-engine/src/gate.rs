//! Request gate: stops all traffic while the server demands a human.
//!
//! ```text
//! Open ──[marker in a response]──▶ Blocked ──[sentinel removed]──▶ Open
//! ```
//!
//! The caller that observes the challenge owns the block: it raises the
//! sentinel, notifies, and polls until an operator deletes the file. Every
//! other caller parks in [`CaptchaGate::wait_open`] until the state flips
//! back. There is no timeout unless `gate.timeout_secs` is configured.

use crate::clock::Clock;
use crate::error::GateError;
use crate::notify::{notify, Notifier};
use crate::shutdown::Shutdown;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use volley_core::config::GateConfig;
use volley_core::sentinel::Sentinel;

/// Poll iterations between two "still waiting" log lines.
const LOG_EVERY: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Open,
    Blocked,
}

pub struct CaptchaGate {
    state: watch::Sender<GateState>,
    sentinel: Sentinel,
    marker: String,
    poll_interval: Duration,
    timeout: Option<Duration>,
    account: String,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    shutdown: Shutdown,
}

impl CaptchaGate {
    pub fn new(
        cfg: &GateConfig,
        account: impl Into<String>,
        sentinel: Sentinel,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            state: watch::channel(GateState::Open).0,
            sentinel,
            marker: cfg.marker.clone(),
            poll_interval: Duration::from_secs(cfg.poll_interval_secs.max(1)),
            timeout: cfg.timeout_secs.map(Duration::from_secs),
            account: account.into(),
            notifier,
            clock,
            shutdown,
        }
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    pub fn sentinel(&self) -> &Sentinel {
        &self.sentinel
    }

    /// Whether `body` carries the challenge marker.
    pub fn detect(&self, body: &str) -> bool {
        body.contains(&self.marker)
    }

    /// Park until the gate is Open.
    pub async fn wait_open(&self) -> Result<(), GateError> {
        let mut rx = self.state.subscribe();
        loop {
            if *rx.borrow_and_update() == GateState::Open {
                return Ok(());
            }
            tokio::select! {
                biased;
                _ = self.shutdown.triggered() => return Err(GateError::Cancelled),
                changed = rx.changed() => {
                    // Sender lives in self, so this cannot close while we borrow it.
                    if changed.is_err() {
                        return Err(GateError::Cancelled);
                    }
                }
            }
        }
    }

    /// Report a challenge. Returns once the gate is Open again.
    ///
    /// The first caller to trip an Open gate runs the clearance loop; callers
    /// that trip an already Blocked gate just wait.
    pub async fn trip(&self) -> Result<(), GateError> {
        let entered = self.state.send_if_modified(|s| {
            if *s == GateState::Open {
                *s = GateState::Blocked;
                true
            } else {
                false
            }
        });
        if !entered {
            return self.wait_open().await;
        }
        tracing::warn!(account = %self.account, "challenge detected, blocking all requests");
        if let Err(e) = self.sentinel.raise() {
            self.state.send_replace(GateState::Open);
            return Err(e.into());
        }
        notify(
            &*self.notifier,
            &format!(
                "{}: the server wants a human. Solve the challenge in a browser, then delete {}",
                self.account,
                self.sentinel.path().display()
            ),
            true,
        )
        .await;
        self.await_clearance().await
    }

    /// Enter Blocked when a sentinel survived a previous run.
    pub async fn resume_if_pending(&self) -> Result<(), GateError> {
        if !self.sentinel.is_raised() {
            return Ok(());
        }
        self.state.send_replace(GateState::Blocked);
        tracing::warn!(
            path = %self.sentinel.path().display(),
            "sentinel present at startup, waiting for clearance"
        );
        notify(
            &*self.notifier,
            &format!(
                "{}: a challenge is still pending. Delete {} once it is solved",
                self.account,
                self.sentinel.path().display()
            ),
            true,
        )
        .await;
        self.await_clearance().await
    }

    async fn await_clearance(&self) -> Result<(), GateError> {
        let started = self.clock.now();
        let mut checks: u64 = 0;
        while self.sentinel.is_raised() {
            let waited = (self.clock.now() - started).to_std().unwrap_or_default();
            if let Some(limit) = self.timeout {
                if waited >= limit {
                    tracing::warn!(waited_secs = waited.as_secs(), "clearance timed out, resuming");
                    self.sentinel.clear()?;
                    notify(
                        &*self.notifier,
                        &format!(
                            "{}: no clearance after {}s, resuming anyway",
                            self.account,
                            waited.as_secs()
                        ),
                        true,
                    )
                    .await;
                    break;
                }
            }
            // On shutdown the state and sentinel stay Blocked, so the next
            // start resumes waiting.
            self.shutdown
                .sleep(&*self.clock, self.poll_interval)
                .await
                .map_err(|_| GateError::Cancelled)?;
            checks += 1;
            if checks % LOG_EVERY == 0 {
                tracing::info!(waited_secs = waited.as_secs(), "still waiting for clearance");
            }
        }

        self.sentinel.clear()?;
        self.state.send_replace(GateState::Open);
        tracing::info!(account = %self.account, "challenge cleared, resuming");
        notify(
            &*self.notifier,
            &format!("{}: challenge cleared, resuming", self.account),
            true,
        )
        .await;
        Ok(())
    }
}
