mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use loghub::hub::protocol::{self, HistoryRequest, HubMessage};
use loghub::hub::ConnectionKind;
use loghub::query::FilterConfiguration;
use loghub::{Level, LogEvent, LogHubConfig};

use common::{
    connect_viewer, next_message, send_json, settled, spawn_node, start_hub, test_config, wait_until, SETTLE,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn viewer_receives_buffer_before_live_events() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), 28300);
    let node = spawn_node(&config, "bulk");
    let hub = settled(&node).await;
    let state = node.hub_state().expect("single node is the hub");

    for i in 0..10_000 {
        node.log(Level::Info, format!("event {i}"));
    }
    assert!(wait_until(|| state.buffered() >= 10_000, SETTLE).await);
    assert_eq!(state.buffered(), 10_000);

    let mut viewer = connect_viewer(&hub).await;
    for i in 0..10_000 {
        match next_message(&mut viewer).await {
            HubMessage::LogEvent(event) => assert_eq!(event.message, format!("event {i}")),
            other => panic!("expected buffered event {i}, got {other:?}"),
        }
    }
    assert!(matches!(next_message(&mut viewer).await, HubMessage::SystemStatus(_)));

    node.log(Level::Warn, "live");
    let live = loop {
        if let HubMessage::LogEvent(event) = next_message(&mut viewer).await {
            break event;
        }
    };
    assert_eq!(live.message, "live");
    assert_eq!(live.source_pid, Some(std::process::id()));

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn history_and_filters_follow_queries() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), 28330);
    let node = spawn_node(&config, "mixed");
    let hub = settled(&node).await;
    let state = node.hub_state().unwrap();

    for i in 0..30 {
        let (level, service) = match i % 3 {
            0 => (Level::Error, "checkout"),
            1 => (Level::Info, "checkout"),
            _ => (Level::Error, "billing"),
        };
        node.emit(LogEvent::new(level, service, format!("n{i}")));
    }
    assert!(wait_until(|| state.buffered() >= 30, SETTLE).await);

    let mut viewer = connect_viewer(&hub).await;
    let request = HistoryRequest {
        filter: FilterConfiguration::from_query("level:ERROR AND service:checkout"),
        limit: Some(4),
        offset: 0,
    };
    send_json(&mut viewer, protocol::encode("request_history", &request).unwrap()).await;
    let page = loop {
        if let HubMessage::History(page) = next_message(&mut viewer).await {
            break page;
        }
    };
    assert_eq!(page.total_matched, 10);
    let messages: Vec<_> = page.events.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["n18", "n21", "n24", "n27"]);

    let filter = FilterConfiguration::from_query("service:billing");
    send_json(&mut viewer, protocol::encode("apply_filter", &filter).unwrap()).await;
    let applied = loop {
        if let HubMessage::FilterApplied(applied) = next_message(&mut viewer).await {
            break applied;
        }
    };
    assert_eq!(applied.matched, 10);

    node.emit(LogEvent::new(Level::Info, "checkout", "hidden"));
    node.emit(LogEvent::new(Level::Info, "billing", "shown"));
    let live = loop {
        if let HubMessage::LogEvent(event) = next_message(&mut viewer).await {
            break event;
        }
    };
    assert_eq!(live.message, "shown");

    send_json(&mut viewer, r#"{"type":"request_history","payload":{"filter":{"query":"(level:error"}}}"#.to_string()).await;
    let error = loop {
        if let HubMessage::Error(reply) = next_message(&mut viewer).await {
            break reply;
        }
    };
    assert!(!error.message.is_empty());

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_producer_frames_close_only_that_connection() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), 28360);
    let node = spawn_node(&config, "steady");
    let hub = settled(&node).await;
    let state = node.hub_state().unwrap();

    let url = format!("{}?type=producer&service=raw&pid=77", hub.ws_url());
    let (mut raw, _) = connect_async(url.as_str()).await.unwrap();
    let good = protocol::encode_event(&LogEvent::new(Level::Info, "raw", "hello")).unwrap();
    send_json(&mut raw, good).await;
    send_json(&mut raw, "not json".to_string()).await;

    assert!(wait_until(|| state.stats().malformed() >= 1, SETTLE).await);
    assert!(state.stats().services().contains(&"raw".to_string()));

    let before = state.buffered();
    node.log(Level::Info, "still flowing");
    assert!(wait_until(|| state.buffered() > before, Duration::from_secs(5)).await);

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn silent_producers_are_reaped_with_going_away() {
    let mut config = LogHubConfig::default();
    config.heartbeat.interval_ms = 50;
    config.heartbeat.missed_limit = 2;
    config.observability.prometheus = false;
    let (state, hub, stop) = start_hub(&config, None).await;

    let url = format!("{}?type=producer&service=idle", hub.ws_url());
    let (mut raw, _) = connect_async(url.as_str()).await.unwrap();

    let code = loop {
        let frame = tokio::time::timeout(SETTLE, raw.next())
            .await
            .expect("hub never closed the idle producer")
            .expect("stream ended without a close frame")
            .unwrap();
        if let Message::Close(frame) = frame {
            break frame.map(|f| u16::from(f.code));
        }
    };
    assert_eq!(code, Some(1001));
    assert!(wait_until(|| state.connection_count(ConnectionKind::Producer) == 0, SETTLE).await);
    let _ = stop.send(());
}

#[tokio::test]
async fn oversized_frames_are_counted_at_both_limits() {
    let mut config = LogHubConfig::default();
    config.hub.max_event_bytes = 1024;
    config.observability.prometheus = false;
    let (state, hub, stop) = start_hub(&config, None).await;

    let url = format!("{}?type=producer&service=bulky", hub.ws_url());
    let (mut raw, _) = connect_async(url.as_str()).await.unwrap();
    assert!(wait_until(|| state.connection_count(ConnectionKind::Producer) == 1, SETTLE).await);

    // Above the event limit but under the socket cap: rejected, connection kept.
    send_json(&mut raw, "x".repeat(4096)).await;
    assert!(wait_until(|| state.stats().rejected() == 1, SETTLE).await);
    assert_eq!(state.connection_count(ConnectionKind::Producer), 1);

    // Above the socket cap of 4 x 1024 + 64 KiB: rejected and disconnected.
    let _ = raw.send(Message::Text("y".repeat(80_000).into())).await;
    assert!(wait_until(|| state.stats().rejected() == 2, SETTLE).await);
    assert!(wait_until(|| state.connection_count(ConnectionKind::Producer) == 0, SETTLE).await);
    assert_eq!(state.buffered(), 0);
    let _ = stop.send(());
}
