//! Wire messages exchanged over the hub WebSocket and HTTP endpoints.
//!
//! Every frame is a JSON text message `{"type": ..., "payload": ...}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::LogEvent;
use crate::hub::connection::{ConnectionId, ConnectionKind, ConnectionState};
use crate::hub::export::ExportFormat;
use crate::query::FilterConfiguration;

/// Producer → hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ProducerMessage {
    LogEvent(LogEvent),
    Heartbeat(Heartbeat),
    Disconnect(Disconnect),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heartbeat {
    pub pid: Option<u32>,
    pub queued_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Disconnect {
    pub reason: String,
}

/// Viewer → hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ViewerRequest {
    ApplyFilter(FilterConfiguration),
    RequestHistory(HistoryRequest),
    ExportRequest(ExportRequest),
    Ping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryRequest {
    pub filter: FilterConfiguration,
    pub limit: Option<usize>,
    /// Matches to skip, counted back from the newest.
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub filter: FilterConfiguration,
}

/// Hub → viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum HubMessage {
    LogEvent(LogEvent),
    SystemStatus(SystemStatus),
    ClientEvent(ClientEvent),
    FilterApplied(FilterApplied),
    History(History<LogEvent>),
    Export(Export),
    Pong(Pong),
    Error(ErrorReply),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub buffer_occupancy: usize,
    pub buffer_capacity: usize,
    pub dropped_events: u64,
    pub drop_rate: f64,
    pub client_count: usize,
    pub viewer_count: usize,
    pub events_per_second: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientEventKind {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEvent {
    pub event: ClientEventKind,
    pub connection_id: ConnectionId,
    pub service: Option<String>,
    pub host: String,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterApplied {
    pub name: String,
    pub matched: usize,
}

/// One page of history, oldest first. `E` is borrowed when encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History<E> {
    pub events: Vec<E>,
    pub total_matched: usize,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    pub format: ExportFormat,
    pub count: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub message: String,
}

/// Borrowing envelope so hot paths avoid cloning payloads.
#[derive(Serialize)]
struct Tagged<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    payload: &'a T,
}

/// Encode `{"type": kind, "payload": payload}` without taking ownership.
pub fn encode<T: Serialize>(kind: &'static str, payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Tagged { kind, payload })
}

pub fn encode_event(event: &LogEvent) -> Result<String, serde_json::Error> {
    encode("log_event", event)
}

/// `GET /healthz` body; also parsed by probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub uptime_secs: u64,
    pub version: String,
    pub pid: u32,
}

/// `GET /version` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub protocol: u32,
}

/// Per-connection entry in `GET /system`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub kind: ConnectionKind,
    pub service: Option<String>,
    pub host: String,
    pub pid: Option<u32>,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub events_relayed: u64,
    pub dropped: u64,
    pub drop_rate: f64,
    pub authenticated: bool,
    pub state: ConnectionState,
}

/// `GET /system` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub buffer_occupancy: usize,
    pub buffer_capacity: usize,
    pub events_ingested: u64,
    pub events_evicted: u64,
    pub events_rejected: u64,
    pub events_malformed: u64,
    pub events_per_second: u64,
    pub producer_count: usize,
    pub viewer_count: usize,
    pub total_connections: u64,
    pub services: Vec<String>,
    pub uptime_secs: u64,
    pub port: u16,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub connections: Vec<ConnectionSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;
    use serde_json::json;

    #[test]
    fn producer_messages_use_type_and_payload() {
        let msg: ProducerMessage =
            serde_json::from_value(json!({"type": "heartbeat", "payload": {"pid": 12, "queued_count": 3}})).unwrap();
        assert_eq!(
            msg,
            ProducerMessage::Heartbeat(Heartbeat {
                pid: Some(12),
                queued_count: 3
            })
        );

        assert!(serde_json::from_value::<ProducerMessage>(json!({"type": "shout", "payload": {}})).is_err());
        assert!(serde_json::from_value::<ProducerMessage>(json!({"payload": {}})).is_err());
    }

    #[test]
    fn borrowed_encoding_matches_owned() {
        let event = LogEvent::new(Level::Warn, "svc", "disk low");
        let borrowed: serde_json::Value = serde_json::from_str(&encode_event(&event).unwrap()).unwrap();
        let owned = serde_json::to_value(HubMessage::LogEvent(event)).unwrap();
        assert_eq!(borrowed, owned);
    }

    #[test]
    fn viewer_requests_parse() {
        let ping: ViewerRequest = serde_json::from_value(json!({"type": "ping"})).unwrap();
        assert_eq!(ping, ViewerRequest::Ping);

        let history: ViewerRequest = serde_json::from_value(json!({
            "type": "request_history",
            "payload": {"filter": {"query": "level:error"}, "limit": 50}
        }))
        .unwrap();
        match history {
            ViewerRequest::RequestHistory(req) => {
                assert_eq!(req.limit, Some(50));
                assert_eq!(req.offset, 0);
                assert_eq!(req.filter.query, "level:error");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
