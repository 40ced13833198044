//! Descriptor store subsystem.
//!
//! # Data Flow
//! ```text
//! Election winner
//!     → store.try_lock(LockRecord)       (exclusive create of hub.lock)
//!     → store.publish(HubDescriptor)     (temp write + rename to hub.json)
//!
//! Starting process
//!     → store.read() → probe → become client
//!
//! Graceful hub shutdown
//!     → remove_if_matches(descriptor) → release_lock(record)
//! ```
//!
//! # Design Decisions
//! - Only three filesystem primitives: exclusive create, rename, hard link
//! - Staleness is decided by probing, never by timestamps alone
//! - `MemoryStore` mirrors the filesystem semantics for tests

pub mod store;
pub mod types;

pub use store::{DescriptorStore, FsDescriptorStore, LockAttempt, LockState, MemoryStore, StoreError};
pub use types::{is_loopback_host, DescriptorError, HubDescriptor, LockRecord, PROTOCOL_VERSION};
