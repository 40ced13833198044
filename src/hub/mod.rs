//! Hub server subsystem.
//!
//! # Data Flow
//! ```text
//! producer socket (websocket.rs)
//!     → ProducerMessage (protocol.rs)
//!     → HubState::ingest (state.rs)
//!         → stamp → encode once
//!         → lock { ring buffer push (buffer.rs) → try_send per viewer }
//!     → viewer writer task → socket
//!
//! HTTP (handlers.rs): /healthz /system /version /metrics
//! ```
//!
//! # Design Decisions
//! - One mutex covers append + fan-out and viewer registration (gap-free replay)
//! - Viewer queues are bounded; a full queue drops for that viewer only
//! - Events are shared as `Arc<LogEvent>` and encoded once per ingest
//! - Live filters sit behind `ArcSwap` so `apply_filter` never takes the hub lock

pub mod auth;
pub mod buffer;
pub mod connection;
pub mod export;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod state;
pub mod stats;
pub mod websocket;

pub use connection::{ClientConnection, ConnectionId, ConnectionKind, ConnectionState};
pub use export::ExportFormat;
pub use server::HubServer;
pub use state::{HubState, Outbound};
