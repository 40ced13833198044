//! Failover subsystem.
//!
//! # Data Flow
//! ```text
//! Coordinator (coordinator.rs) ── owns ──► StateCell (state.rs) ──watch──► Node::state()
//!     client term: FailoverMonitor probes + forwarder failures → HealthTracker (monitor.rs)
//!     hub term:    HubServer task + lock ownership ticker
//! ```
//!
//! # Design Decisions
//! - One task owns the role; everything else observes it through `watch`
//! - Illegal transitions are logged and ignored rather than panicking
//! - `missed_limit` consecutive failures, from either source, end a client term

pub mod coordinator;
pub mod monitor;
pub mod state;

pub use coordinator::{Control, Coordinator};
pub use monitor::{FailoverMonitor, HealthTracker};
pub use state::{NodeState, Phase, StateCell};
