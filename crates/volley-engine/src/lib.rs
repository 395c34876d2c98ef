//! `volley-engine` — time-synchronized dispatch on top of `volley-core`.
//!
//! # Architecture
//!
//! ```text
//! Runner            ← periodic control loop: next activation → take → run
//!     │
//!     ▼
//! DispatchCoordinator
//!     │   Validating: prepare every request, abort all if any is late
//!     │   Waiting:    Priority pacing, coarse then fine sleeps
//!     │   Dispatching: submit in insertion order with fixed spacing
//!     ▼
//! ActionGateway     ← HttpGateway: pacing → request → challenge check
//!     │
//!     ▼
//! CaptchaGate       ← Open / Blocked, sentinel file, forced notifications
//! ```
//!
//! Every sleep goes through [`Clock`] and is raced against [`Shutdown`], so
//! tests run on virtual time and Ctrl-C interrupts any wait.

pub mod clock;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod notify;
pub mod pacing;
pub mod runner;
pub mod session;
pub mod shutdown;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{DispatchCoordinator, Phase};
pub use error::{EngineError, GateError, GatewayError};
pub use gate::{CaptchaGate, GateState};
pub use gateway::{Ack, ActionGateway, HttpGateway, PreparedAction};
pub use notify::{Delivery, LogNotifier, Notifier, RateLimited, TelegramNotifier};
pub use pacing::{Pacing, PacingMode, PriorityGuard};
pub use runner::Runner;
pub use session::SessionStore;
pub use shutdown::{Cancelled, Shutdown, ShutdownTrigger};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, EngineError>;
