//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Election winner
//!     → listener.rs (scan base_port..base_port+port_range)
//!     → BoundListener handed to the hub server
//! ```
//!
//! # Design Decisions
//! - The port is bound before the descriptor is published
//! - Address-in-use moves on to the next port; other errors are fatal

pub mod listener;

pub use listener::{bind_in_range, BoundListener, ListenerError};
