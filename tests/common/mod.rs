//! Shared utilities for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use loghub::descriptor::{FsDescriptorStore, HubDescriptor};
use loghub::election::HttpProbe;
use loghub::forwarder::Identity;
use loghub::hub::protocol::HubMessage;
use loghub::hub::{HubServer, HubState};
use loghub::lifecycle::start_with;
use loghub::{LogHubConfig, Node, NodeState};

pub type Viewer = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const SETTLE: Duration = Duration::from_secs(10);

/// Fast timings over a private descriptor directory and port range.
pub fn test_config(dir: &Path, base_port: u16) -> LogHubConfig {
    let mut config = LogHubConfig::default();
    config.election.dir = dir.to_path_buf();
    config.election.base_port = base_port;
    config.election.port_range = 20;
    config.election.retry_min_ms = 5;
    config.election.retry_max_ms = 30;
    config.election.probe_timeout_ms = 300;
    config.heartbeat.interval_ms = 100;
    config.heartbeat.missed_limit = 3;
    config.forwarder.backoff_base_ms = 20;
    config.forwarder.backoff_max_ms = 200;
    config.hub.status_interval_ms = 200;
    config.hub.shutdown_timeout_ms = 500;
    config.observability.prometheus = false;
    config
}

pub fn spawn_node(config: &LogHubConfig, service: &str) -> Node {
    let store = Arc::new(FsDescriptorStore::open(&config.election.dir).unwrap());
    let probe = HttpProbe::new(config.election.probe_timeout());
    start_with(config.clone(), Identity::current(service), store, probe).unwrap()
}

/// A bare hub server on an ephemeral loopback port, without election.
pub async fn start_hub(
    config: &LogHubConfig,
    token: Option<String>,
) -> (Arc<HubState>, HubDescriptor, broadcast::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = HubState::new(config, port, token.clone());
    let (stop, stop_rx) = broadcast::channel(1);
    tokio::spawn(HubServer::new(state.clone()).run(listener, stop_rx));
    let hub = HubDescriptor::new("127.0.0.1", port, std::process::id(), token);
    (state, hub, stop)
}

/// Wait until the node has settled as hub or client and return that hub.
pub async fn settled(node: &Node) -> HubDescriptor {
    let state = node
        .wait_for(|s| matches!(s, NodeState::Hub(_) | NodeState::Client(_)), SETTLE)
        .await
        .expect("node never settled");
    state.hub().cloned().expect("settled state carries a hub")
}

pub async fn wait_until<F>(mut condition: F, limit: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

pub async fn connect_viewer(hub: &HubDescriptor) -> Viewer {
    let url = format!("{}?type=viewer", hub.ws_url());
    let (ws, _) = connect_async(url.as_str()).await.unwrap();
    ws
}

pub async fn send_json(ws: &mut Viewer, text: String) {
    ws.send(Message::Text(text.into())).await.unwrap();
}

/// Next hub message, skipping control frames.
pub async fn next_message(ws: &mut Viewer) -> HubMessage {
    loop {
        let frame = tokio::time::timeout(SETTLE, ws.next())
            .await
            .expect("timed out waiting for hub message")
            .expect("hub closed the stream")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}
