//! `/ws` handshake and per-connection tasks.
//!
//! # Data Flow
//! ```text
//! GET /ws?type=..&service=..&token=..
//!     → token check (401) → type/service check (400) → capacity (503)
//!     → upgrade
//!         producer: recv loop → HubState::ingest
//!         viewer:   register_viewer (snapshot) → writer task
//!                   reader loop → HubState::handle_viewer_request
//! ```
//!
//! Producer frames above `max_event_bytes + 1 KiB` are rejected unparsed and
//! the connection stays open. Frames above the socket cap
//! (`4 × max_event_bytes + 64 KiB`) cannot be read at all: they are counted
//! as oversized too and the connection is closed with 1009.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::hub::connection::{ClientConnection, ConnectionKind};
use crate::hub::protocol::{self, ProducerMessage, ViewerRequest};
use crate::hub::state::{error_reply, HubState, IngestError, Outbound};

/// Frames this far beyond the event limit are rejected unparsed.
const FRAME_SLACK: usize = 1024;

const WRITER_DRAIN: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HandshakeParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub service: Option<String>,
    pub pid: Option<u32>,
    pub host: Option<String>,
    pub token: Option<String>,
}

fn parse_kind(kind: Option<&str>) -> Option<ConnectionKind> {
    match kind.map(str::trim) {
        None | Some("") | Some("producer") => Some(ConnectionKind::Producer),
        Some("viewer") | Some("ui") => Some(ConnectionKind::Viewer),
        Some(_) => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub async fn ws_handler(
    State(state): State<Arc<HubState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<HandshakeParams>,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.auth().check(params.token.as_deref()) {
        tracing::warn!(peer = %peer, "Rejected handshake with invalid token");
        state.stats().record_rejected("unauthorized");
        return (StatusCode::UNAUTHORIZED, "invalid or missing token").into_response();
    }

    let Some(kind) = parse_kind(params.kind.as_deref()) else {
        return (StatusCode::BAD_REQUEST, "type must be producer or viewer").into_response();
    };

    let service = non_empty(params.service);
    if kind == ConnectionKind::Producer && service.is_none() {
        return (StatusCode::BAD_REQUEST, "producers must declare a service").into_response();
    }

    if !state.has_capacity() {
        tracing::warn!(peer = %peer, max = state.config().max_connections, "Connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let host = non_empty(params.host).unwrap_or_else(|| peer.ip().to_string());
    let conn = Arc::new(ClientConnection::new(
        kind,
        service,
        host,
        params.pid,
        state.auth().required(),
    ));

    let limit = state.config().max_event_bytes * 4 + 64 * 1024;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            match kind {
                ConnectionKind::Producer => run_producer(socket, state, conn).await,
                ConnectionKind::Viewer => run_viewer(socket, state, conn).await,
            }
        })
}

enum Flow {
    Continue,
    Close(u16, &'static str),
}

fn handle_producer_text(state: &HubState, conn: &ClientConnection, text: &str) -> Flow {
    let limit = state.config().max_event_bytes;
    if text.len() > limit + FRAME_SLACK {
        tracing::debug!(connection_id = %conn.id(), size = text.len(), "Oversized frame rejected");
        state.stats().record_rejected("oversized");
        return Flow::Continue;
    }

    let message = match serde_json::from_str::<ProducerMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(connection_id = %conn.id(), error = %e, "Malformed producer message");
            state.record_malformed();
            return Flow::Close(close_code::UNSUPPORTED, "malformed message");
        }
    };

    conn.touch();
    match message {
        ProducerMessage::LogEvent(event) => match state.ingest(conn, event) {
            Ok(()) => conn.activate(),
            Err(IngestError::Encode(e)) => {
                tracing::warn!(connection_id = %conn.id(), error = %e, "Failed to encode event");
            }
            Err(e) => {
                tracing::debug!(connection_id = %conn.id(), error = %e, "Event rejected");
            }
        },
        ProducerMessage::Heartbeat(beat) => {
            conn.activate();
            tracing::trace!(connection_id = %conn.id(), queued = beat.queued_count, "Heartbeat");
        }
        ProducerMessage::Disconnect(bye) => {
            tracing::info!(connection_id = %conn.id(), reason = %bye.reason, "Producer disconnecting");
            return Flow::Close(close_code::NORMAL, "bye");
        }
    }
    Flow::Continue
}

/// Whether a socket error came from the frame or message size cap.
fn exceeds_size_cap(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        let text = e.to_string();
        if text.contains("Message too long") || text.contains("Space limit exceeded") {
            return true;
        }
        source = e.source();
    }
    false
}

async fn run_producer(mut socket: WebSocket, state: Arc<HubState>, conn: Arc<ClientConnection>) {
    let guard = state.register(Arc::clone(&conn));
    let mut closing = state.closing();
    let idle = state.idle_timeout();
    let reap = time::sleep(idle);
    tokio::pin!(reap);

    let close = loop {
        if *closing.borrow() {
            break Some((close_code::AWAY, "hub shutting down"));
        }

        tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => {
                    reap.as_mut().reset(Instant::now() + idle);
                    if let Flow::Close(code, reason) = handle_producer_text(&state, &conn, text.as_str()) {
                        break Some((code, reason));
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    state.record_malformed();
                    break Some((close_code::UNSUPPORTED, "binary frames are not accepted"));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    conn.touch();
                    reap.as_mut().reset(Instant::now() + idle);
                }
                Some(Ok(Message::Close(_))) | None => break None,
                Some(Err(e)) if exceeds_size_cap(&e) => {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "Frame over the socket size cap");
                    state.stats().record_rejected("oversized");
                    break Some((close_code::SIZE, "message too large"));
                }
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "Producer socket error");
                    break None;
                }
            },
            _ = &mut reap => {
                tracing::info!(connection_id = %conn.id(), idle_ms = idle.as_millis() as u64, "Reaping silent producer");
                break Some((close_code::AWAY, "heartbeat timeout"));
            }
            changed = closing.changed() => {
                if changed.is_err() {
                    break Some((close_code::AWAY, "hub shutting down"));
                }
            }
        }
    };

    drop(guard);
    if let Some((code, reason)) = close {
        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }));
        let _ = time::timeout(WRITER_DRAIN, socket.send(frame)).await;
    }
}

async fn run_viewer(socket: WebSocket, state: Arc<HubState>, conn: Arc<ClientConnection>) {
    let (tx, rx) = mpsc::channel(state.config().viewer_queue.max(1));
    let (guard, snapshot, filter) = state.register_viewer(Arc::clone(&conn), tx.clone());
    let (sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(write_viewer(
        sink,
        rx,
        snapshot,
        Arc::clone(&state),
        Arc::clone(&conn),
    ));
    let mut writer_done = false;

    let mut closing = state.closing();
    let idle = state.idle_timeout();
    let reap = time::sleep(idle);
    tokio::pin!(reap);

    let close = loop {
        if *closing.borrow() {
            break Some((close_code::AWAY, "hub shutting down"));
        }

        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    conn.touch();
                    reap.as_mut().reset(Instant::now() + idle);
                    let reply = match serde_json::from_str::<ViewerRequest>(text.as_str()) {
                        Ok(request) => {
                            conn.activate();
                            state.handle_viewer_request(&filter, request)
                        }
                        Err(e) => error_reply(format!("invalid request: {e}")),
                    };
                    match reply {
                        Ok(reply) => {
                            if tx.send(Outbound::Text(reply.into())).await.is_err() {
                                break None;
                            }
                        }
                        Err(e) => tracing::warn!(connection_id = %conn.id(), error = %e, "Failed to encode reply"),
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    conn.touch();
                    reap.as_mut().reset(Instant::now() + idle);
                }
                Some(Ok(Message::Binary(_))) => {
                    if tx.send(Outbound::Text(error_reply("binary frames are not accepted").unwrap_or_default().into())).await.is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break None,
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "Viewer socket error");
                    break None;
                }
            },
            _ = &mut reap => {
                tracing::info!(connection_id = %conn.id(), "Reaping silent viewer");
                break Some((close_code::AWAY, "heartbeat timeout"));
            }
            changed = closing.changed() => {
                if changed.is_err() {
                    break Some((close_code::AWAY, "hub shutting down"));
                }
            }
            _ = &mut writer, if !writer_done => {
                writer_done = true;
                break None;
            }
        }
    };

    drop(guard);
    if let Some((code, reason)) = close {
        let _ = tx.try_send(Outbound::Close(code, reason));
    }
    drop(tx);

    if !writer_done && time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
}

async fn write_viewer(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    snapshot: Vec<Arc<crate::event::LogEvent>>,
    state: Arc<HubState>,
    conn: Arc<ClientConnection>,
) -> Result<(), axum::Error> {
    for event in &snapshot {
        match protocol::encode_event(event) {
            Ok(text) => {
                sink.send(Message::Text(text.into())).await?;
                conn.record_relayed();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode buffered event"),
        }
    }
    tracing::debug!(connection_id = %conn.id(), replayed = snapshot.len(), "Replay complete");
    drop(snapshot);

    if let Ok(status) = protocol::encode("system_status", &state.status()) {
        sink.send(Message::Text(status.into())).await?;
    }

    let every = state.heartbeat().interval();
    let mut ping = time::interval_at(Instant::now() + every, every);
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(Outbound::Text(text)) => sink.send(Message::Text(text)).await?,
                Some(Outbound::Close(code, reason)) => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
                        .await;
                    break;
                }
                None => break,
            },
            _ = ping.tick() => sink.send(Message::Ping(Bytes::new())).await?,
        }
    }
    let _ = sink.close().await;
    Ok(())
}
