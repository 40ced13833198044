//! Client forwarder subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarder::emit(event)
//!     → EventQueue::push (short mutex, drop-oldest, Notify)   queue.rs
//!     → sender task (sender.rs)
//!         connect ws://hub/ws?type=producer&service=..   (deadline)
//!         drain queue FIFO → log_event frames
//!         heartbeat{pid, queued_count} every interval
//!         failure → backoff with jitter → reconnect
//! ```
//!
//! # Design Decisions
//! - `emit` never awaits and never fails
//! - At-most-once: events taken off the queue are not replayed after a failure
//! - The target hub lives in a `watch` channel; changing it ends the session

pub mod queue;
pub mod sender;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{ForwarderConfig, HeartbeatConfig};
use crate::descriptor::HubDescriptor;
use crate::event::LogEvent;
use crate::failover::HealthTracker;
use crate::observability::metrics;

pub use queue::EventQueue;
pub use sender::SendError;

/// How this process introduces itself to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub service: String,
    pub pid: u32,
    pub host: String,
}

impl Identity {
    /// Current process, local hostname.
    pub fn current(service: impl Into<String>) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        Self {
            service: service.into(),
            pid: std::process::id(),
            host,
        }
    }
}

/// Non-blocking event forwarder with a background sender task.
#[derive(Debug)]
pub struct Forwarder {
    queue: Arc<EventQueue>,
    target: watch::Sender<Option<HubDescriptor>>,
    stop: watch::Sender<Option<String>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Forwarder {
    /// Start the sender task. Must be called inside a Tokio runtime.
    pub fn spawn(
        config: &ForwarderConfig,
        heartbeat: &HeartbeatConfig,
        identity: Identity,
        tracker: Option<Arc<HealthTracker>>,
    ) -> Self {
        let queue = Arc::new(EventQueue::new(config.queue_capacity));
        let (target, target_rx) = watch::channel(None);
        let (stop, stop_rx) = watch::channel(None);

        let sender = sender::Sender {
            queue: Arc::clone(&queue),
            target: target_rx,
            stop: stop_rx,
            config: config.clone(),
            heartbeat: heartbeat.clone(),
            identity,
            tracker,
        };
        let task = tokio::spawn(sender.run());

        Self {
            queue,
            target,
            stop,
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue an event for the hub. Never blocks.
    pub fn emit(&self, event: LogEvent) {
        if !self.queue.push(event) {
            metrics::record_forwarder_drop();
        }
    }

    /// Point the sender at a different hub (or none).
    pub fn retarget(&self, hub: Option<HubDescriptor>) {
        self.target.send_if_modified(|current| {
            if *current == hub {
                false
            } else {
                *current = hub;
                true
            }
        });
    }

    pub fn target(&self) -> Option<HubDescriptor> {
        self.target.borrow().clone()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Send what is queued, say `disconnect{reason}` and stop, within `limit`.
    pub async fn shutdown(&self, reason: &str, limit: Duration) {
        self.stop.send_replace(Some(reason.to_string()));
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut task) = task {
            if tokio::time::timeout(limit, &mut task).await.is_err() {
                tracing::warn!("Forwarder did not stop in time");
                task.abort();
            }
        }
    }

    /// Stop immediately without a goodbye.
    pub fn abort(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;

    #[tokio::test]
    async fn emit_without_hub_is_bounded() {
        let config = ForwarderConfig {
            queue_capacity: 100,
            ..ForwarderConfig::default()
        };
        let forwarder = Forwarder::spawn(&config, &HeartbeatConfig::default(), Identity::current("svc"), None);

        for i in 0..1000 {
            forwarder.emit(LogEvent::new(Level::Info, "svc", format!("e{i}")));
        }
        assert_eq!(forwarder.queued(), 100);
        assert_eq!(forwarder.dropped(), 900);

        forwarder.shutdown("test over", Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn retarget_ignores_same_hub() {
        let forwarder = Forwarder::spawn(
            &ForwarderConfig::default(),
            &HeartbeatConfig::default(),
            Identity::current("svc"),
            None,
        );
        let hub = HubDescriptor::new("127.0.0.1", 1, 1, None);
        let mut rx = forwarder.target.subscribe();
        forwarder.retarget(Some(hub.clone()));
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();
        forwarder.retarget(Some(hub));
        assert!(!rx.has_changed().unwrap());
        forwarder.abort();
    }
}
