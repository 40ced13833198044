//! Auto-discovering shared log hub.
//!
//! Processes on one machine that enable log observation elect a single
//! hub through a shared directory; the others stream structured events
//! into it over loopback WebSockets and take over if it disappears.

pub mod config;
pub mod descriptor;
pub mod election;
pub mod event;
pub mod failover;
pub mod forwarder;
pub mod hub;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod query;
pub mod resilience;

pub use config::LogHubConfig;
pub use event::{Level, LogEvent};
pub use failover::NodeState;
pub use lifecycle::{start, Node, Shutdown, StartupError};
