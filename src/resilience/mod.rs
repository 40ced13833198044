//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarder session fails
//!     → backoff.rs (exponential delay with jitter, capped)
//!     → reconnect
//!
//! Probe / connect / send / shutdown
//!     → timeouts.rs (bounded deadline)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every coordination call has a deadline
//! - Backoff resets after a successful connection

pub mod backoff;
pub mod timeouts;

pub use backoff::{calculate_backoff, Backoff};
pub use timeouts::{with_deadline, TimedOut};
