//! Log event model.
//!
//! # Data Flow
//! ```text
//! Application
//!     → LogEvent::new(..) + builder methods (types.rs)
//!     → Forwarder queue (by value)
//!     → wire JSON (serde)
//!     → Hub: LogEvent::stamped(origin) → new immutable value
//!     → ring buffer (Arc<LogEvent>) → viewers
//! ```
//!
//! # Design Decisions
//! - Events are never mutated after creation; the hub builds a stamped copy
//! - Context is a typed, size-capped map (context.rs)
//! - Field lookup is shared by the query engine and field filters

pub mod context;
pub mod types;

pub use context::{ContextError, ContextMap, FieldValue, MAX_CONTEXT_FIELDS, MAX_CONTEXT_KEY_BYTES};
pub use types::{Level, LogEvent, Origin, ParseLevelError};
