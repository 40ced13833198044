//! Shared hub state: ring buffer, connection registry and fan-out.
//!
//! One mutex guards the buffer, the viewer table and the rate window.
//! Append + broadcast and viewer registration both run under it, so a
//! new viewer's replay snapshot and its first live event never overlap
//! or leave a gap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;

use crate::config::{HeartbeatConfig, HubConfig, LogHubConfig};
use crate::descriptor::PROTOCOL_VERSION;
use crate::event::LogEvent;
use crate::hub::auth::AuthPolicy;
use crate::hub::buffer::RingBuffer;
use crate::hub::connection::{ClientConnection, ConnectionId, ConnectionKind};
use crate::hub::export;
use crate::hub::protocol::{
    self, ClientEvent, ClientEventKind, ErrorReply, Export, ExportRequest, FilterApplied, HealthReport, History,
    HistoryRequest, Pong, SystemSnapshot, SystemStatus, VersionInfo, ViewerRequest,
};
use crate::hub::stats::{HubStats, RateWindow};
use crate::observability::metrics;
use crate::query::{CompiledFilter, FilterConfiguration, QueryError};

/// Length of the `log_event` envelope around a serialized event.
const EVENT_ENVELOPE_LEN: usize = r#"{"type":"log_event","payload":}"#.len();

/// Frames queued for a viewer's socket writer.
#[derive(Debug, Clone)]
pub enum Outbound {
    Text(Utf8Bytes),
    Close(u16, &'static str),
}

/// Live filter of one viewer, swapped without locking the hub.
pub type FilterHandle = Arc<ArcSwap<CompiledFilter>>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("event of {size} bytes exceeds the {limit} byte limit")]
    Oversized { size: usize, limit: usize },

    #[error("event has an empty service")]
    MissingService,

    #[error("event could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A page of matches, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub events: Vec<Arc<LogEvent>>,
    pub total_matched: usize,
    pub offset: usize,
    pub limit: usize,
}

struct ViewerSink {
    tx: mpsc::Sender<Outbound>,
    filter: FilterHandle,
    conn: Arc<ClientConnection>,
}

struct Shared {
    buffer: RingBuffer<Arc<LogEvent>>,
    viewers: HashMap<ConnectionId, ViewerSink>,
    rate: RateWindow,
}

pub struct HubState {
    config: HubConfig,
    heartbeat: HeartbeatConfig,
    auth: AuthPolicy,
    pid: u32,
    port: u16,
    started_at: DateTime<Utc>,
    started: Instant,
    shared: Mutex<Shared>,
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
    stats: HubStats,
    closing: watch::Sender<bool>,
    prometheus: bool,
}

/// Removes its connection from the registry when dropped.
pub struct ConnectionGuard {
    state: Arc<HubState>,
    id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.unregister(self.id);
    }
}

impl HubState {
    pub fn new(config: &LogHubConfig, port: u16, token: Option<String>) -> Arc<Self> {
        let (closing, _) = watch::channel(false);
        Arc::new(Self {
            config: config.hub.clone(),
            heartbeat: config.heartbeat.clone(),
            auth: AuthPolicy::new(token),
            pid: std::process::id(),
            port,
            started_at: Utc::now(),
            started: Instant::now(),
            shared: Mutex::new(Shared {
                buffer: RingBuffer::new(config.hub.buffer_size),
                viewers: HashMap::new(),
                rate: RateWindow::default(),
            }),
            connections: DashMap::new(),
            stats: HubStats::default(),
            closing,
            prometheus: config.observability.prometheus,
        })
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn heartbeat(&self) -> &HeartbeatConfig {
        &self.heartbeat
    }

    pub fn auth(&self) -> &AuthPolicy {
        &self.auth
    }

    pub fn stats(&self) -> &HubStats {
        &self.stats
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn prometheus_enabled(&self) -> bool {
        self.prometheus
    }

    pub fn idle_timeout(&self) -> Duration {
        self.heartbeat.idle_timeout()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn has_capacity(&self) -> bool {
        self.connections.len() < self.config.max_connections
    }

    pub fn connection_count(&self, kind: ConnectionKind) -> usize {
        self.connections.iter().filter(|c| c.kind() == kind).count()
    }

    pub fn buffered(&self) -> usize {
        self.shared().buffer.len()
    }

    // -- Registry --------------------------------------------------------

    /// Register a producer (or a viewer without a sink, in tests).
    pub fn register(self: &Arc<Self>, conn: Arc<ClientConnection>) -> ConnectionGuard {
        let id = conn.id();
        let kind = conn.kind();
        self.connections.insert(id, conn.clone());
        self.stats.record_connection();
        self.publish_connection_gauges();

        tracing::info!(
            connection_id = %id,
            kind = kind.as_str(),
            service = conn.service().unwrap_or(""),
            host = conn.host(),
            "Client connected"
        );
        if kind == ConnectionKind::Producer {
            self.broadcast_client_event(&conn, ClientEventKind::Connected);
        }

        ConnectionGuard {
            state: Arc::clone(self),
            id,
        }
    }

    /// Register a viewer and take its replay snapshot atomically.
    ///
    /// Every buffered event is in the returned snapshot; every later
    /// event goes through `tx`.
    pub fn register_viewer(
        self: &Arc<Self>,
        conn: Arc<ClientConnection>,
        tx: mpsc::Sender<Outbound>,
    ) -> (ConnectionGuard, Vec<Arc<LogEvent>>, FilterHandle) {
        let filter: FilterHandle = Arc::new(ArcSwap::from_pointee(CompiledFilter::everything()));
        let snapshot = {
            let mut shared = self.shared();
            shared.viewers.insert(
                conn.id(),
                ViewerSink {
                    tx,
                    filter: Arc::clone(&filter),
                    conn: Arc::clone(&conn),
                },
            );
            shared.buffer.snapshot()
        };
        let guard = self.register(conn);
        (guard, snapshot, filter)
    }

    fn unregister(&self, id: ConnectionId) {
        let Some((_, conn)) = self.connections.remove(&id) else {
            return;
        };
        if conn.kind() == ConnectionKind::Viewer {
            self.shared().viewers.remove(&id);
        }
        self.publish_connection_gauges();

        tracing::info!(
            connection_id = %id,
            kind = conn.kind().as_str(),
            relayed = conn.relayed(),
            dropped = conn.dropped(),
            "Client disconnected"
        );
        if conn.kind() == ConnectionKind::Producer {
            self.broadcast_client_event(&conn, ClientEventKind::Disconnected);
        }
    }

    fn publish_connection_gauges(&self) {
        metrics::set_connections("producer", self.connection_count(ConnectionKind::Producer));
        metrics::set_connections("viewer", self.connection_count(ConnectionKind::Viewer));
    }

    // -- Ingest and fan-out ----------------------------------------------

    /// Stamp, buffer and fan out one producer event.
    pub fn ingest(&self, conn: &ClientConnection, event: LogEvent) -> Result<(), IngestError> {
        if event.service.trim().is_empty() {
            self.stats.record_rejected("invalid");
            return Err(IngestError::MissingService);
        }

        let event = Arc::new(event.stamped(&conn.origin(), Utc::now()));
        let frame = protocol::encode_event(&event)?;
        let size = frame.len().saturating_sub(EVENT_ENVELOPE_LEN);
        if size > self.config.max_event_bytes {
            self.stats.record_rejected("oversized");
            return Err(IngestError::Oversized {
                size,
                limit: self.config.max_event_bytes,
            });
        }
        let text = Utf8Bytes::from(frame);
        let second = self.started.elapsed().as_secs();

        let occupancy = {
            let mut shared = self.shared();
            if shared.buffer.push(Arc::clone(&event)).is_some() {
                metrics::record_evicted(1);
            }
            shared.rate.record(second);
            for sink in shared.viewers.values() {
                if !sink.filter.load().matches(&event) {
                    continue;
                }
                match sink.tx.try_send(Outbound::Text(text.clone())) {
                    Ok(()) => sink.conn.record_relayed(),
                    Err(TrySendError::Full(_)) => {
                        sink.conn.record_dropped();
                        metrics::record_viewer_drop();
                    }
                    Err(TrySendError::Closed(_)) => {}
                }
            }
            shared.buffer.len()
        };

        conn.record_relayed();
        self.stats.record_ingested(&event.service);
        metrics::set_buffer_occupancy(occupancy);
        Ok(())
    }

    /// Send a frame to every viewer regardless of filters.
    fn broadcast(&self, text: Utf8Bytes) {
        let shared = self.shared();
        for sink in shared.viewers.values() {
            if let Err(TrySendError::Full(_)) = sink.tx.try_send(Outbound::Text(text.clone())) {
                sink.conn.record_dropped();
                metrics::record_viewer_drop();
            }
        }
    }

    fn broadcast_client_event(&self, conn: &ClientConnection, event: ClientEventKind) {
        let payload = ClientEvent {
            event,
            connection_id: conn.id(),
            service: conn.service().map(str::to_string),
            host: conn.host().to_string(),
            pid: conn.pid(),
        };
        match protocol::encode("client_event", &payload) {
            Ok(text) => self.broadcast(text.into()),
            Err(e) => tracing::warn!(error = %e, "Failed to encode client event"),
        }
    }

    pub fn broadcast_status(&self) {
        match protocol::encode("system_status", &self.status()) {
            Ok(text) => self.broadcast(text.into()),
            Err(e) => tracing::warn!(error = %e, "Failed to encode system status"),
        }
    }

    // -- Snapshots ---------------------------------------------------------

    pub fn status(&self) -> SystemStatus {
        let second = self.started.elapsed().as_secs();
        let (occupancy, capacity, evicted, rate) = {
            let shared = self.shared();
            (
                shared.buffer.len(),
                shared.buffer.capacity(),
                shared.buffer.evicted(),
                shared.rate.per_second(second),
            )
        };
        let ingested = self.stats.ingested();
        SystemStatus {
            buffer_occupancy: occupancy,
            buffer_capacity: capacity,
            dropped_events: evicted,
            drop_rate: if ingested == 0 { 0.0 } else { evicted as f64 / ingested as f64 },
            client_count: self.connection_count(ConnectionKind::Producer),
            viewer_count: self.connection_count(ConnectionKind::Viewer),
            events_per_second: rate,
        }
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        let status = self.status();
        let evicted = self.shared().buffer.evicted();
        let mut connections: Vec<_> = self.connections.iter().map(|c| c.snapshot()).collect();
        connections.sort_by_key(|c| c.connected_at);

        SystemSnapshot {
            buffer_occupancy: status.buffer_occupancy,
            buffer_capacity: status.buffer_capacity,
            events_ingested: self.stats.ingested(),
            events_evicted: evicted,
            events_rejected: self.stats.rejected(),
            events_malformed: self.stats.malformed(),
            events_per_second: status.events_per_second,
            producer_count: status.client_count,
            viewer_count: status.viewer_count,
            total_connections: self.stats.total_connections(),
            services: self.stats.services(),
            uptime_secs: self.uptime().as_secs(),
            port: self.port,
            pid: self.pid,
            started_at: self.started_at,
            connections,
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            uptime_secs: self.uptime().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: self.pid,
        }
    }

    pub fn version(&self) -> VersionInfo {
        VersionInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol: PROTOCOL_VERSION,
        }
    }

    // -- Viewer requests ---------------------------------------------------

    fn matching(&self, filter: &CompiledFilter) -> Vec<Arc<LogEvent>> {
        let snapshot = self.shared().buffer.snapshot();
        if filter.is_everything() {
            return snapshot;
        }
        snapshot.into_iter().filter(|e| filter.matches(e)).collect()
    }

    /// Replace a viewer's live filter; returns the buffered match count.
    pub fn apply_filter(&self, handle: &FilterHandle, config: &FilterConfiguration) -> Result<FilterApplied, QueryError> {
        let compiled = config.compile()?;
        let matched = {
            let shared = self.shared();
            shared.buffer.iter().filter(|e| compiled.matches(e)).count()
        };
        handle.store(Arc::new(compiled));
        Ok(FilterApplied {
            name: config.name.clone(),
            matched,
        })
    }

    /// Page through matches, newest first; each page is returned oldest first.
    pub fn history(&self, request: &HistoryRequest) -> Result<HistoryPage, QueryError> {
        let filter = request.filter.compile()?;
        let matches = self.matching(&filter);
        let limit = request
            .limit
            .unwrap_or(self.config.history_default_limit)
            .min(self.config.history_max_limit);

        let total_matched = matches.len();
        let end = total_matched.saturating_sub(request.offset);
        let start = end.saturating_sub(limit);
        Ok(HistoryPage {
            events: matches[start..end].to_vec(),
            total_matched,
            offset: request.offset,
            limit,
        })
    }

    pub fn export(&self, request: &ExportRequest) -> Result<Export, ExportError> {
        let filter = request.filter.compile()?;
        let mut matches = self.matching(&filter);
        if let Some(limit) = self.config.export_limit {
            let skip = matches.len().saturating_sub(limit);
            matches.drain(..skip);
        }
        let content = export::render(request.format, &matches)?;
        Ok(Export {
            format: request.format,
            count: matches.len(),
            content,
        })
    }

    /// Answer one viewer request with an encoded reply frame.
    pub fn handle_viewer_request(&self, handle: &FilterHandle, request: ViewerRequest) -> Result<String, serde_json::Error> {
        match request {
            ViewerRequest::ApplyFilter(config) => match self.apply_filter(handle, &config) {
                Ok(applied) => protocol::encode("filter_applied", &applied),
                Err(e) => error_reply(e.to_string()),
            },
            ViewerRequest::RequestHistory(request) => match self.history(&request) {
                Ok(page) => {
                    let body = History {
                        events: page.events.iter().map(|e| e.as_ref()).collect::<Vec<&LogEvent>>(),
                        total_matched: page.total_matched,
                        offset: page.offset,
                        limit: page.limit,
                    };
                    protocol::encode("history", &body)
                }
                Err(e) => error_reply(e.to_string()),
            },
            ViewerRequest::ExportRequest(request) => match self.export(&request) {
                Ok(export) => protocol::encode("export", &export),
                Err(e) => error_reply(e.to_string()),
            },
            ViewerRequest::Ping => protocol::encode("pong", &Pong { timestamp: Utc::now() }),
        }
    }

    pub fn record_malformed(&self) {
        self.stats.record_malformed();
    }

    // -- Shutdown ----------------------------------------------------------

    /// Ask every connection task to close.
    pub fn close_all(&self) {
        self.closing.send_replace(true);
    }

    pub fn is_closing(&self) -> bool {
        *self.closing.borrow()
    }

    pub fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("export failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub fn error_reply(message: impl Into<String>) -> Result<String, serde_json::Error> {
    protocol::encode("error", &ErrorReply { message: message.into() })
}

impl std::fmt::Debug for HubState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubState")
            .field("port", &self.port)
            .field("pid", &self.pid)
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;
    use crate::hub::export::ExportFormat;
    use crate::hub::protocol::HubMessage;

    fn state_with(buffer_size: usize, viewer_queue: usize) -> Arc<HubState> {
        let mut config = LogHubConfig::default();
        config.hub.buffer_size = buffer_size;
        config.hub.viewer_queue = viewer_queue;
        config.hub.history_default_limit = 3;
        config.hub.history_max_limit = 5;
        HubState::new(&config, 17361, None)
    }

    fn producer(service: &str) -> Arc<ClientConnection> {
        Arc::new(ClientConnection::new(
            ConnectionKind::Producer,
            Some(service.to_string()),
            "127.0.0.1",
            Some(4242),
            false,
        ))
    }

    fn viewer() -> Arc<ClientConnection> {
        Arc::new(ClientConnection::new(ConnectionKind::Viewer, None, "127.0.0.1", None, false))
    }

    fn decode(frame: &Outbound) -> HubMessage {
        match frame {
            Outbound::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            Outbound::Close(code, _) => panic!("unexpected close {code}"),
        }
    }

    #[test]
    fn ingest_stamps_and_buffers() {
        let state = state_with(10, 8);
        let conn = producer("api");
        let _guard = state.register(conn.clone());

        state.ingest(&conn, LogEvent::new(Level::Info, "api", "hello")).unwrap();

        let page = state.history(&HistoryRequest::default()).unwrap();
        assert_eq!(page.total_matched, 1);
        let event = &page.events[0];
        assert_eq!(event.source_host.as_deref(), Some("127.0.0.1"));
        assert_eq!(event.source_pid, Some(4242));
        assert!(event.received_at.is_some());
        assert_eq!(conn.relayed(), 1);
    }

    #[test]
    fn eviction_counts_each_overflow() {
        let state = state_with(3, 8);
        let conn = producer("api");
        for i in 0..5 {
            state.ingest(&conn, LogEvent::new(Level::Info, "api", format!("e{i}"))).unwrap();
        }
        let status = state.status();
        assert_eq!(status.buffer_occupancy, 3);
        assert_eq!(status.dropped_events, 2);
    }

    #[test]
    fn rejects_oversized_and_serviceless_events() {
        let mut config = LogHubConfig::default();
        config.hub.max_event_bytes = 256;
        let state = HubState::new(&config, 17361, None);
        let conn = producer("api");

        let big = LogEvent::new(Level::Info, "api", "x".repeat(512));
        assert!(matches!(state.ingest(&conn, big), Err(IngestError::Oversized { .. })));

        let anonymous = LogEvent::new(Level::Info, "  ", "who");
        assert!(matches!(state.ingest(&conn, anonymous), Err(IngestError::MissingService)));

        assert_eq!(state.buffered(), 0);
        assert_eq!(state.stats().rejected(), 2);
    }

    #[tokio::test]
    async fn viewer_gets_snapshot_then_live_events() {
        let state = state_with(100, 16);
        let conn = producer("api");
        for i in 0..3 {
            state.ingest(&conn, LogEvent::new(Level::Info, "api", format!("old{i}"))).unwrap();
        }

        let (tx, mut rx) = mpsc::channel(16);
        let (_guard, snapshot, _filter) = state.register_viewer(viewer(), tx);
        assert_eq!(snapshot.len(), 3);

        state.ingest(&conn, LogEvent::new(Level::Info, "api", "new")).unwrap();
        match decode(&rx.recv().await.unwrap()) {
            HubMessage::LogEvent(event) => assert_eq!(event.message, "new"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_viewer_queue_drops_for_that_viewer_only() {
        let state = state_with(100, 1);
        let conn = producer("api");

        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let slow = viewer();
        let (_g1, _, _) = state.register_viewer(slow.clone(), slow_tx);

        let (fast_tx, mut fast_rx) = mpsc::channel(16);
        let fast = viewer();
        let (_g2, _, _) = state.register_viewer(fast.clone(), fast_tx);

        for i in 0..3 {
            state.ingest(&conn, LogEvent::new(Level::Info, "api", format!("e{i}"))).unwrap();
        }

        assert_eq!(slow.relayed(), 1);
        assert_eq!(slow.dropped(), 2);
        assert_eq!(fast.dropped(), 0);
        for _ in 0..3 {
            assert!(matches!(decode(&fast_rx.recv().await.unwrap()), HubMessage::LogEvent(_)));
        }
    }

    #[tokio::test]
    async fn live_filter_applies_to_broadcasts() {
        let state = state_with(100, 16);
        let conn = producer("api");
        state.ingest(&conn, LogEvent::new(Level::Error, "api", "old failure")).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let (_guard, _, filter) = state.register_viewer(viewer(), tx);
        let applied = state
            .apply_filter(&filter, &FilterConfiguration::from_query("level:error"))
            .unwrap();
        assert_eq!(applied.matched, 1);

        state.ingest(&conn, LogEvent::new(Level::Info, "api", "noise")).unwrap();
        state.ingest(&conn, LogEvent::new(Level::Error, "api", "boom")).unwrap();
        match decode(&rx.recv().await.unwrap()) {
            HubMessage::LogEvent(event) => assert_eq!(event.message, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn history_pages_back_from_newest() {
        let state = state_with(100, 16);
        let conn = producer("api");
        for i in 0..10 {
            state.ingest(&conn, LogEvent::new(Level::Info, "api", format!("e{i}"))).unwrap();
        }

        let messages = |page: &HistoryPage| page.events.iter().map(|e| e.message.clone()).collect::<Vec<_>>();

        let first = state.history(&HistoryRequest::default()).unwrap();
        assert_eq!(first.limit, 3);
        assert_eq!(first.total_matched, 10);
        assert_eq!(messages(&first), ["e7", "e8", "e9"]);

        let second = state
            .history(&HistoryRequest {
                offset: 3,
                limit: Some(100),
                ..HistoryRequest::default()
            })
            .unwrap();
        assert_eq!(second.limit, 5);
        assert_eq!(messages(&second), ["e2", "e3", "e4", "e5", "e6"]);

        let past_end = state
            .history(&HistoryRequest {
                offset: 50,
                ..HistoryRequest::default()
            })
            .unwrap();
        assert!(past_end.events.is_empty());
    }

    #[test]
    fn export_honors_limit() {
        let mut config = LogHubConfig::default();
        config.hub.export_limit = Some(2);
        let state = HubState::new(&config, 17361, None);
        let conn = producer("api");
        for i in 0..5 {
            state.ingest(&conn, LogEvent::new(Level::Info, "api", format!("e{i}"))).unwrap();
        }

        let export = state
            .export(&ExportRequest {
                format: ExportFormat::Ndjson,
                ..ExportRequest::default()
            })
            .unwrap();
        assert_eq!(export.count, 2);
        assert!(export.content.contains("e4"));
        assert!(!export.content.contains("e2"));
    }

    #[test]
    fn bad_query_becomes_error_reply() {
        let state = state_with(10, 8);
        let handle: FilterHandle = Arc::new(ArcSwap::from_pointee(CompiledFilter::everything()));
        let reply = state
            .handle_viewer_request(&handle, ViewerRequest::ApplyFilter(FilterConfiguration::from_query("(level:error")))
            .unwrap();
        let message: HubMessage = serde_json::from_str(&reply).unwrap();
        assert!(matches!(message, HubMessage::Error(_)));
        assert!(handle.load().is_everything());
    }

    #[tokio::test]
    async fn producer_lifecycle_is_announced_to_viewers() {
        let state = state_with(10, 8);
        let (tx, mut rx) = mpsc::channel(8);
        let (_viewer, _, _) = state.register_viewer(viewer(), tx);

        let guard = state.register(producer("billing"));
        assert_eq!(state.connection_count(ConnectionKind::Producer), 1);
        drop(guard);
        assert_eq!(state.connection_count(ConnectionKind::Producer), 0);

        let mut kinds = Vec::new();
        for _ in 0..2 {
            match decode(&rx.recv().await.unwrap()) {
                HubMessage::ClientEvent(event) => {
                    assert_eq!(event.service.as_deref(), Some("billing"));
                    kinds.push(event.event);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(kinds, [ClientEventKind::Connected, ClientEventKind::Disconnected]);
    }
}
