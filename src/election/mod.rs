//! Election & discovery subsystem.
//!
//! # Data Flow
//! ```text
//! acquire_role()
//!     → remote override?            → Client(descriptor, pid 0)
//!     → store.read() + probe        → Client(live descriptor)
//!     → store.try_lock()
//!         Acquired                  → bind port → Hub(lease)
//!         Held, stale               → break lock → retry now
//!         Held, fresh               → random sleep → retry (bounded)
//! ```
//!
//! # Design Decisions
//! - Generic over `DescriptorStore`, `HubProbe` and `Clock` for in-memory tests
//! - A lock is stale only if its holder is dead, or it is old and its hub is silent
//! - Publishing the descriptor is the coordinator's job, after the server is up

pub mod discovery;
pub mod probe;
pub mod types;

pub use discovery::{Clock, Election, SystemClock};
pub use probe::{pid_alive, HttpProbe, HubProbe};
pub use types::{Elected, ElectionError, HubLease};
