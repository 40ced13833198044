//! Background task that owns the connection to the hub.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::config::{ForwarderConfig, HeartbeatConfig};
use crate::descriptor::HubDescriptor;
use crate::failover::HealthTracker;
use crate::forwarder::queue::EventQueue;
use crate::forwarder::Identity;
use crate::hub::protocol::{self, Disconnect, Heartbeat};
use crate::observability::metrics;
use crate::resilience::{with_deadline, Backoff, TimedOut};

const BATCH: usize = 256;

type HubSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("invalid hub url: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Timeout(#[from] TimedOut),

    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("connection closed by hub")]
    Closed,
}

enum SessionEnd {
    Stopped,
    Retarget,
    Failed(SendError),
}

pub(crate) struct Sender {
    pub(crate) queue: Arc<EventQueue>,
    pub(crate) target: watch::Receiver<Option<HubDescriptor>>,
    pub(crate) stop: watch::Receiver<Option<String>>,
    pub(crate) config: ForwarderConfig,
    pub(crate) heartbeat: HeartbeatConfig,
    pub(crate) identity: Identity,
    pub(crate) tracker: Option<Arc<HealthTracker>>,
}

impl Sender {
    fn stop_requested(&self) -> bool {
        self.stop.borrow().is_some()
    }

    pub(crate) async fn run(mut self) {
        let mut backoff = Backoff::new(self.config.backoff_base_ms, self.config.backoff_max_ms);

        loop {
            if self.stop_requested() {
                return;
            }

            let target = self.target.borrow_and_update().clone();
            let Some(target) = target else {
                tokio::select! {
                    _ = self.target.changed() => {}
                    _ = self.stop.changed() => return,
                }
                continue;
            };

            let failure = match self.connect(&target).await {
                Ok(socket) => {
                    tracing::info!(hub = %target.authority(), service = %self.identity.service, "Connected to hub");
                    backoff.reset();
                    if let Some(tracker) = &self.tracker {
                        tracker.record_success();
                    }
                    match self.session(socket).await {
                        SessionEnd::Stopped => return,
                        SessionEnd::Retarget => continue,
                        SessionEnd::Failed(e) => e,
                    }
                }
                Err(e) => e,
            };

            metrics::record_forwarder_reconnect();
            if let Some(tracker) = &self.tracker {
                tracker.record_failure();
            }
            let delay = backoff.next_delay();
            tracing::warn!(
                hub = %target.authority(),
                error = %failure,
                attempt = backoff.attempt(),
                retry_in_ms = delay.as_millis() as u64,
                "Hub connection failed"
            );

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = self.target.changed() => {}
                _ = self.stop.changed() => return,
            }
        }
    }

    async fn connect(&self, target: &HubDescriptor) -> Result<HubSocket, SendError> {
        let mut url = Url::parse(&target.ws_url())?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("type", "producer")
                .append_pair("service", &self.identity.service)
                .append_pair("pid", &self.identity.pid.to_string())
                .append_pair("host", &self.identity.host);
            if let Some(token) = &target.token {
                query.append_pair("token", token);
            }
        }

        let (socket, _response) =
            with_deadline("hub connect", self.config.connect_timeout(), connect_async(url.as_str())).await??;
        Ok(socket)
    }

    async fn session(&mut self, socket: HubSocket) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();
        let send_timeout = self.config.send_timeout();
        let current = self.target.borrow_and_update().clone();
        let every = self.heartbeat.interval();
        let mut beat = time::interval_at(Instant::now() + every, every);

        if let Err(e) = drain(&self.queue, &mut sink, send_timeout).await {
            return SessionEnd::Failed(e);
        }

        loop {
            tokio::select! {
                changed = self.stop.changed() => {
                    let reason = match changed {
                        Ok(()) => self.stop.borrow().clone().unwrap_or_default(),
                        Err(_) => "forwarder dropped".to_string(),
                    };
                    let _ = drain(&self.queue, &mut sink, send_timeout).await;
                    say_goodbye(&mut sink, reason, send_timeout).await;
                    return SessionEnd::Stopped;
                }
                changed = self.target.changed() => {
                    if changed.is_err() {
                        return SessionEnd::Stopped;
                    }
                    if *self.target.borrow() != current {
                        say_goodbye(&mut sink, "hub changed".to_string(), send_timeout).await;
                        return SessionEnd::Retarget;
                    }
                }
                _ = beat.tick() => {
                    let heartbeat = Heartbeat {
                        pid: Some(self.identity.pid),
                        queued_count: self.queue.len() as u64,
                    };
                    if let Err(e) = send_frame(&mut sink, protocol::encode("heartbeat", &heartbeat), send_timeout).await {
                        return SessionEnd::Failed(e);
                    }
                }
                _ = self.queue.ready() => {
                    if let Err(e) = drain(&self.queue, &mut sink, send_timeout).await {
                        return SessionEnd::Failed(e);
                    }
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Failed(SendError::Closed),
                    Some(Err(e)) => return SessionEnd::Failed(e.into()),
                    Some(Ok(_)) => {}
                },
            }
        }
    }
}

type HubSink = futures_util::stream::SplitSink<HubSocket, Message>;

async fn send_frame(
    sink: &mut HubSink,
    frame: Result<String, serde_json::Error>,
    limit: Duration,
) -> Result<(), SendError> {
    let text = frame?;
    with_deadline("hub send", limit, sink.send(Message::Text(text.into()))).await??;
    Ok(())
}

/// Send everything queued. Events taken from the queue are lost if the send fails.
async fn drain(queue: &EventQueue, sink: &mut HubSink, limit: Duration) -> Result<(), SendError> {
    loop {
        let batch = queue.take(BATCH);
        if batch.is_empty() {
            return Ok(());
        }
        for event in &batch {
            send_frame(sink, protocol::encode("log_event", event), limit).await?;
        }
    }
}

async fn say_goodbye(sink: &mut HubSink, reason: String, limit: Duration) {
    let _ = send_frame(sink, protocol::encode("disconnect", &Disconnect { reason }), limit).await;
    let _ = with_deadline("hub close", limit, sink.close()).await;
}
