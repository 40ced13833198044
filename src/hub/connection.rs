//! Hub-side connection records.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track per-connection activity and relay/drop counters
//! - Track lifecycle state (Handshake → Active)

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Origin;
use crate::hub::protocol::ConnectionSnapshot;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Producer,
    Viewer,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Producer => "producer",
            ConnectionKind::Viewer => "viewer",
        }
    }
}

/// Connection lifecycle. `Active` after the first valid message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Handshake,
    Active,
}

/// A producer or viewer attached to the hub.
#[derive(Debug)]
pub struct ClientConnection {
    id: ConnectionId,
    kind: ConnectionKind,
    service: Option<String>,
    host: String,
    pid: Option<u32>,
    connected_at: DateTime<Utc>,
    authenticated: bool,
    last_seen_ms: AtomicI64,
    relayed: AtomicU64,
    dropped: AtomicU64,
    active: AtomicBool,
}

impl ClientConnection {
    pub fn new(
        kind: ConnectionKind,
        service: Option<String>,
        host: impl Into<String>,
        pid: Option<u32>,
        authenticated: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ConnectionId::new(),
            kind,
            service,
            host: host.into(),
            pid,
            connected_at: now,
            authenticated,
            last_seen_ms: AtomicI64::new(now.timestamp_millis()),
            relayed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            active: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn origin(&self) -> Origin {
        Origin {
            host: self.host.clone(),
            pid: self.pid,
        }
    }

    pub fn touch(&self) {
        self.last_seen_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_seen_ms.load(Ordering::Relaxed))
            .single()
            .unwrap_or(self.connected_at)
    }

    pub fn activate(&self) {
        if !self.active.swap(true, Ordering::Relaxed) {
            tracing::debug!(connection_id = %self.id, "Connection active");
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.active.load(Ordering::Relaxed) {
            ConnectionState::Active
        } else {
            ConnectionState::Handshake
        }
    }

    pub fn record_relayed(&self) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relayed(&self) -> u64 {
        self.relayed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Dropped share of everything routed to this connection.
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.dropped();
        let total = self.relayed() + dropped;
        if total == 0 {
            0.0
        } else {
            dropped as f64 / total as f64
        }
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            id: self.id,
            kind: self.kind,
            service: self.service.clone(),
            host: self.host.clone(),
            pid: self.pid,
            connected_at: self.connected_at,
            last_seen: self.last_seen(),
            events_relayed: self.relayed(),
            dropped: self.dropped(),
            drop_rate: self.drop_rate(),
            authenticated: self.authenticated,
            state: self.state(),
        }
    }
}
