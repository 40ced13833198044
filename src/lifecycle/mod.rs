//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     config → open descriptor store → spawn forwarder → spawn coordinator → Node
//!
//! Shutdown (Node::shutdown):
//!     flush forwarder + disconnect → Control::Stop → hub stops → descriptor + lock removed
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Node::shutdown
//! ```
//!
//! # Design Decisions
//! - A disabled config starts nothing (`start` returns `None`)
//! - Every shutdown step is bounded by the configured timeouts
//! - `Node::abort` exists to reproduce a crash: nothing is cleaned up

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{start, start_with, Node, StartupError};
