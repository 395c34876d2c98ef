//! Inter-request pacing and the Priority override used while a batch fires.

use crate::clock::Clock;
use crate::shutdown::{Cancelled, Shutdown};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingMode {
    Normal,
    Priority,
}

pub struct Pacing {
    priority: AtomicBool,
    delay: f64,
    clock: Arc<dyn Clock>,
    shutdown: Shutdown,
}

impl Pacing {
    /// `delay` scales the random gap: `[3 * delay, 7 * delay]` whole seconds.
    pub fn new(delay: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            priority: AtomicBool::new(false),
            delay: delay.max(0.0),
            clock,
            shutdown: Shutdown::never(),
        }
    }

    /// Cut pacing sleeps short when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn mode(&self) -> PacingMode {
        if self.priority.load(Ordering::SeqCst) {
            PacingMode::Priority
        } else {
            PacingMode::Normal
        }
    }

    /// Switch to Priority until the returned guard is dropped.
    pub fn enter_priority(self: &Arc<Self>) -> PriorityGuard {
        self.priority.store(true, Ordering::SeqCst);
        tracing::debug!("pacing: priority mode on");
        PriorityGuard {
            pacing: Arc::clone(self),
        }
    }

    pub fn next_delay(&self) -> Duration {
        let lo = (3.0 * self.delay) as u64;
        let hi = ((7.0 * self.delay) as u64).max(lo);
        Duration::from_secs(rand::thread_rng().gen_range(lo..=hi))
    }

    /// Sleep before an outgoing call. No-op in Priority mode.
    pub async fn pace(&self) -> Result<(), Cancelled> {
        if self.mode() == PacingMode::Priority {
            return Ok(());
        }
        let delay = self.next_delay();
        if delay.is_zero() {
            return Ok(());
        }
        tracing::debug!(delay_secs = delay.as_secs(), "pacing");
        self.shutdown.sleep(&*self.clock, delay).await
    }
}

/// Restores Normal pacing on drop, whichever way the holder exits.
pub struct PriorityGuard {
    pacing: Arc<Pacing>,
}

impl Drop for PriorityGuard {
    fn drop(&mut self) {
        self.pacing.priority.store(false, Ordering::SeqCst);
        tracing::debug!("pacing: priority mode off");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn pacing(delay: f64) -> (Arc<Pacing>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_secs(0));
        (Arc::new(Pacing::new(delay, clock.clone())), clock)
    }

    #[test]
    fn delay_stays_in_range() {
        let (p, _) = pacing(1.5);
        for _ in 0..200 {
            let d = p.next_delay().as_secs();
            assert!((4..=10).contains(&d), "delay {d} out of range");
        }
    }

    #[tokio::test]
    async fn priority_suppresses_pacing() {
        let (p, clock) = pacing(1.0);
        let guard = p.enter_priority();
        assert_eq!(p.mode(), PacingMode::Priority);
        p.pace().await.unwrap();
        assert_eq!(clock.now_secs(), 0);
        drop(guard);
        assert_eq!(p.mode(), PacingMode::Normal);
        p.pace().await.unwrap();
        assert!((3..=7).contains(&clock.now_secs()));
    }

    #[test]
    fn guard_resets_on_panic() {
        let (p, _) = pacing(1.0);
        let inner = Arc::clone(&p);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.enter_priority();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(p.mode(), PacingMode::Normal);
    }

    #[tokio::test]
    async fn zero_delay_never_sleeps() {
        let (p, clock) = pacing(0.0);
        p.pace().await.unwrap();
        assert_eq!(clock.now_secs(), 0);
    }

    #[tokio::test]
    async fn shutdown_cuts_pacing_short() {
        let clock = Arc::new(ManualClock::at_secs(0));
        let (trigger, shutdown) = crate::shutdown::channel();
        let p = Pacing::new(1.0, clock).with_shutdown(shutdown);
        trigger.trigger();
        assert_eq!(p.pace().await, Err(Cancelled));
    }
}
