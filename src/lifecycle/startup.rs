//! Node startup and the handle applications hold.
//!
//! # Responsibilities
//! - Open the descriptor store (fatal if the directory cannot be created)
//! - Spawn the forwarder, then the coordinator that elects a role
//! - Give the application a non-blocking `emit` and orderly shutdown

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::LogHubConfig;
use crate::descriptor::{DescriptorStore, FsDescriptorStore, StoreError};
use crate::election::{Election, ElectionError, HttpProbe, HubProbe, SystemClock};
use crate::event::{Level, LogEvent};
use crate::failover::{Control, Coordinator, HealthTracker, NodeState};
use crate::forwarder::{Forwarder, Identity};
use crate::hub::HubState;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("descriptor store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("election failed: {0}")]
    Election(#[from] ElectionError),

    #[error("coordinator task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("coordinator did not stop within {0:?}")]
    StopTimeout(Duration),
}

/// Join (or become) the hub. Returns `None` when loghub is disabled.
pub async fn start(config: LogHubConfig, service: &str) -> Result<Option<Node>, StartupError> {
    if config.disabled {
        tracing::info!("loghub disabled");
        return Ok(None);
    }
    let store = Arc::new(FsDescriptorStore::open(&config.election.dir)?);
    let probe = HttpProbe::new(config.election.probe_timeout());
    start_with(config, Identity::current(service), store, probe).map(Some)
}

/// Start with an explicit store and probe.
pub fn start_with<S, P>(
    config: LogHubConfig,
    identity: Identity,
    store: Arc<S>,
    probe: P,
) -> Result<Node, StartupError>
where
    S: DescriptorStore,
    P: HubProbe,
{
    tracing::info!(
        service = %identity.service,
        pid = identity.pid,
        dir = %config.election.dir.display(),
        remote = ?config.remote,
        "Starting loghub node"
    );

    let tracker = Arc::new(HealthTracker::new(config.heartbeat.missed_limit));
    let forwarder = Arc::new(Forwarder::spawn(
        &config.forwarder,
        &config.heartbeat,
        identity.clone(),
        Some(Arc::clone(&tracker)),
    ));

    let election = Election::new(store, probe, SystemClock, config.election.clone())
        .with_remote(config.remote.clone())
        .with_token(config.token.clone())
        .with_pid(identity.pid);

    let (control, control_rx) = watch::channel(Control::Run);
    let stop_after = config.hub.shutdown_timeout() + config.forwarder.send_timeout();
    let coordinator = Coordinator::new(election, config, Arc::clone(&forwarder), tracker, control_rx);
    let state = coordinator.subscribe();
    let hub = coordinator.subscribe_hub();
    let task = tokio::spawn(coordinator.run());

    Ok(Node {
        service: identity.service,
        forwarder,
        state,
        hub,
        control,
        task: Mutex::new(Some(task)),
        stop_after,
    })
}

/// A running loghub participant.
#[derive(Debug)]
pub struct Node {
    service: String,
    forwarder: Arc<Forwarder>,
    state: watch::Receiver<NodeState>,
    hub: watch::Receiver<Option<Arc<HubState>>>,
    control: watch::Sender<Control>,
    task: Mutex<Option<JoinHandle<Result<(), ElectionError>>>>,
    stop_after: Duration,
}

impl Node {
    /// Queue an event for the hub. Never blocks, never fails.
    pub fn emit(&self, event: LogEvent) {
        self.forwarder.emit(event);
    }

    /// Emit a plain message under this node's service.
    pub fn log(&self, level: Level, message: impl Into<String>) {
        self.emit(LogEvent::new(level, self.service.clone(), message));
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn state(&self) -> NodeState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeState> {
        self.state.clone()
    }

    /// The hub's live state while this node is the hub.
    pub fn hub_state(&self) -> Option<Arc<HubState>> {
        self.hub.borrow().clone()
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// Wait until the role satisfies `predicate`, or `limit` passes.
    pub async fn wait_for<F>(&self, mut predicate: F, limit: Duration) -> Option<NodeState>
    where
        F: FnMut(&NodeState) -> bool,
    {
        let mut rx = self.state.clone();
        let found = tokio::time::timeout(limit, rx.wait_for(|s| predicate(s))).await;
        match found {
            Ok(Ok(state)) => Some(state.clone()),
            _ => None,
        }
    }

    fn take_task(&self) -> Option<JoinHandle<Result<(), ElectionError>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Flush, say goodbye, stop serving and remove our descriptor and lock.
    pub async fn shutdown(&self) -> Result<(), StartupError> {
        tracing::info!(service = %self.service, "Shutting down loghub node");
        self.forwarder.shutdown("shutdown", self.stop_after).await;
        self.control.send_replace(Control::Stop);

        let Some(mut task) = self.take_task() else {
            return Ok(());
        };
        match tokio::time::timeout(self.stop_after * 2, &mut task).await {
            Ok(result) => Ok(result??),
            Err(_) => {
                task.abort();
                Err(StartupError::StopTimeout(self.stop_after * 2))
            }
        }
    }

    /// Stop at once, leaving descriptor and lock behind as a crash would.
    pub async fn abort(&self) {
        self.forwarder.abort();
        self.control.send_replace(Control::Abort);
        if let Some(mut task) = self.take_task() {
            if tokio::time::timeout(Duration::from_secs(2), &mut task).await.is_err() {
                task.abort();
            }
        }
    }
}
