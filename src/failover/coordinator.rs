//! The single task that owns this node's role.
//!
//! # Data Flow
//! ```text
//! Electing ──acquire_role──► Client(hub) ── monitor / forwarder failures ──► Degraded
//!     ▲                  └─► Hub(lease) ── server exit / lock lost ─────────► Degraded
//!     └──────────────────────────────────────────────────────────────────────────┘
//! Control::Stop  → graceful: stop server, remove descriptor + lock
//! Control::Abort → stop serving, leave descriptor + lock behind
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time;

use crate::config::LogHubConfig;
use crate::descriptor::{DescriptorStore, HubDescriptor, LockRecord};
use crate::election::{Clock, Elected, Election, ElectionError, HubLease, HubProbe};
use crate::failover::monitor::{FailoverMonitor, HealthTracker};
use crate::failover::state::{NodeState, StateCell};
use crate::forwarder::Forwarder;
use crate::hub::{HubServer, HubState};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::Backoff;

/// Requests from the owning `Node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Run,
    Stop,
    Abort,
}

/// How a role term ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermEnd {
    Lost,
    Stop,
    Abort,
}

pub struct Coordinator<S, P, C> {
    election: Election<S, P, C>,
    config: LogHubConfig,
    forwarder: Arc<Forwarder>,
    tracker: Arc<HealthTracker>,
    state: StateCell,
    control: watch::Receiver<Control>,
    hub: watch::Sender<Option<Arc<HubState>>>,
}

impl<S, P, C> Coordinator<S, P, C>
where
    S: DescriptorStore,
    P: HubProbe,
    C: Clock,
{
    pub fn new(
        election: Election<S, P, C>,
        config: LogHubConfig,
        forwarder: Arc<Forwarder>,
        tracker: Arc<HealthTracker>,
        control: watch::Receiver<Control>,
    ) -> Self {
        let (hub, _) = watch::channel(None);
        Self {
            election,
            config,
            forwarder,
            tracker,
            state: StateCell::new(),
            control,
            hub,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeState> {
        self.state.subscribe()
    }

    /// The running hub's state while this node is the hub.
    pub fn subscribe_hub(&self) -> watch::Receiver<Option<Arc<HubState>>> {
        self.hub.subscribe()
    }

    /// Drive elections until stopped. Fatal election errors are returned.
    pub async fn run(mut self) -> Result<(), ElectionError> {
        let mut backoff = Backoff::new(self.config.forwarder.backoff_base_ms, self.config.forwarder.backoff_max_ms);
        self.state.transition(NodeState::Electing);

        loop {
            let outcome = tokio::select! {
                result = self.election.acquire_role() => result,
                end = wait_control(&mut self.control) => {
                    self.finish(end);
                    return Ok(());
                }
            };

            let end = match outcome {
                Ok(Elected::Client(hub)) => {
                    backoff.reset();
                    self.client_term(hub).await
                }
                Ok(Elected::Hub(lease)) => {
                    backoff.reset();
                    self.hub_term(lease).await
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "Election failed");
                    self.forwarder.retarget(None);
                    self.state.transition(NodeState::Stopped);
                    return Err(e);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Election attempt failed");
                    self.state.transition(NodeState::Degraded);
                    tokio::select! {
                        _ = time::sleep(delay) => {}
                        end = wait_control(&mut self.control) => {
                            self.finish(end);
                            return Ok(());
                        }
                    }
                    self.state.transition(NodeState::Electing);
                    continue;
                }
            };

            match end {
                TermEnd::Lost => {
                    metrics::record_failover();
                    self.forwarder.retarget(None);
                    self.state.transition(NodeState::Degraded);
                    self.state.transition(NodeState::Electing);
                }
                TermEnd::Stop | TermEnd::Abort => {
                    self.finish(end);
                    return Ok(());
                }
            }
        }
    }

    fn finish(&self, end: TermEnd) {
        if end == TermEnd::Stop {
            self.forwarder.retarget(None);
        }
        self.state.transition(NodeState::Stopped);
    }

    async fn client_term(&mut self, hub: HubDescriptor) -> TermEnd {
        self.tracker.reset();
        self.forwarder.retarget(Some(hub.clone()));
        self.state.transition(NodeState::Client(hub.clone()));

        let monitor = FailoverMonitor::new(
            self.election.probe(),
            Arc::clone(&self.tracker),
            self.config.heartbeat.interval(),
        );

        tokio::select! {
            _ = monitor.watch(&hub) => TermEnd::Lost,
            _ = self.tracker.lost() => {
                tracing::warn!(hub = %hub.authority(), "Forwarder lost the hub");
                TermEnd::Lost
            }
            end = wait_control(&mut self.control) => end,
        }
    }

    async fn hub_term(&mut self, lease: HubLease) -> TermEnd {
        let descriptor = lease.descriptor();
        let HubLease { listener, lock, port, token, .. } = lease;
        let store = Arc::clone(self.election.store());

        let state = HubState::new(&self.config, port, token);
        let shutdown = Shutdown::new();
        let mut server = tokio::spawn(HubServer::new(Arc::clone(&state)).run(listener, shutdown.subscribe()));

        match store.lock_owned_by(&lock) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Hub lock taken before publishing");
                state.close_all();
                server.abort();
                return TermEnd::Lost;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot verify hub lock");
                state.close_all();
                server.abort();
                release(store.as_ref(), &descriptor, &lock);
                return TermEnd::Lost;
            }
        }
        if let Err(e) = store.publish(&descriptor) {
            tracing::error!(error = %e, "Failed to publish hub descriptor");
            state.close_all();
            server.abort();
            release(store.as_ref(), &descriptor, &lock);
            return TermEnd::Lost;
        }

        tracing::info!(hub = %descriptor.authority(), "Serving as hub");
        self.hub.send_replace(Some(Arc::clone(&state)));
        self.forwarder.retarget(Some(descriptor.clone()));
        self.state.transition(NodeState::Hub(descriptor.clone()));

        let every = self.config.heartbeat.interval();
        let mut check = time::interval_at(time::Instant::now() + every, every);

        let end = loop {
            tokio::select! {
                result = &mut server => {
                    match result {
                        Ok(Ok(())) => tracing::warn!("Hub server exited"),
                        Ok(Err(e)) => tracing::error!(error = %e, "Hub server failed"),
                        Err(e) => tracing::error!(error = %e, "Hub server task panicked"),
                    }
                    release(store.as_ref(), &descriptor, &lock);
                    break TermEnd::Lost;
                }
                _ = check.tick() => {
                    if !self.still_owner(store.as_ref(), &descriptor, &lock) {
                        shutdown.trigger();
                        state.close_all();
                        if time::timeout(self.config.hub.shutdown_timeout(), &mut server).await.is_err() {
                            server.abort();
                        }
                        let _ = store.remove_if_matches(&descriptor);
                        break TermEnd::Lost;
                    }
                }
                end = wait_control(&mut self.control) => {
                    match end {
                        TermEnd::Abort => {
                            state.close_all();
                            server.abort();
                        }
                        _ => {
                            shutdown.trigger();
                            if time::timeout(self.config.hub.shutdown_timeout(), &mut server).await.is_err() {
                                tracing::warn!("Hub server did not stop in time");
                                state.close_all();
                                server.abort();
                            }
                            release(store.as_ref(), &descriptor, &lock);
                        }
                    }
                    break end;
                }
            }
        };

        self.hub.send_replace(None);
        end
    }

    /// Lock still ours; republish the descriptor if it went missing.
    fn still_owner(&self, store: &S, descriptor: &HubDescriptor, lock: &LockRecord) -> bool {
        match store.lock_owned_by(lock) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Hub lock lost");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read hub lock");
                return true;
            }
        }
        match store.read() {
            Ok(Some(current)) if current == *descriptor => {}
            Ok(_) => {
                tracing::warn!("Hub descriptor missing or replaced, republishing");
                if let Err(e) = store.publish(descriptor) {
                    tracing::warn!(error = %e, "Failed to republish hub descriptor");
                }
            }
            Err(e) => tracing::debug!(error = %e, "Cannot read hub descriptor"),
        }
        true
    }
}

/// Remove our descriptor and lock, leaving anyone else's alone.
fn release<S: DescriptorStore>(store: &S, descriptor: &HubDescriptor, lock: &LockRecord) {
    match store.remove_if_matches(descriptor) {
        Ok(true) => tracing::debug!("Hub descriptor removed"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to remove hub descriptor"),
    }
    match store.release_lock(lock) {
        Ok(true) => tracing::debug!("Hub lock released"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to release hub lock"),
    }
}

async fn wait_control(control: &mut watch::Receiver<Control>) -> TermEnd {
    loop {
        let current = *control.borrow_and_update();
        match current {
            Control::Run => {}
            Control::Stop => return TermEnd::Stop,
            Control::Abort => return TermEnd::Abort,
        }
        if control.changed().await.is_err() {
            return TermEnd::Stop;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use crate::descriptor::MemoryStore;
    use crate::election::SystemClock;
    use crate::failover::state::Phase;
    use crate::forwarder::Identity;

    #[derive(Clone)]
    struct Toggle(Arc<AtomicBool>);

    impl HubProbe for Toggle {
        fn pid_alive(&self, _pid: u32) -> bool {
            true
        }

        async fn is_live(&self, _descriptor: &HubDescriptor) -> bool {
            self.0.load(Ordering::Relaxed)
        }
    }

    fn config(base_port: u16) -> LogHubConfig {
        let mut config = LogHubConfig::default();
        config.election.base_port = base_port;
        config.election.port_range = 10;
        config.heartbeat.interval_ms = 20;
        config.heartbeat.missed_limit = 2;
        config.observability.prometheus = false;
        config
    }

    async fn wait_phase(rx: &mut watch::Receiver<NodeState>, phase: Phase) {
        time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.phase() == phase))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn client_degrades_and_becomes_hub() {
        let config = config(27600);
        let store = Arc::new(MemoryStore::new());
        store
            .publish(&HubDescriptor::new("127.0.0.1", 27690, 4242, None))
            .unwrap();

        let live = Arc::new(AtomicBool::new(true));
        let election = Election::new(store.clone(), Toggle(live.clone()), SystemClock, config.election.clone());
        let tracker = Arc::new(HealthTracker::new(config.heartbeat.missed_limit));
        let forwarder = Arc::new(Forwarder::spawn(
            &config.forwarder,
            &config.heartbeat,
            Identity::current("test"),
            None,
        ));
        let (control_tx, control_rx) = watch::channel(Control::Run);
        let coordinator = Coordinator::new(election, config, forwarder.clone(), tracker, control_rx);
        let mut states = coordinator.subscribe();
        let task = tokio::spawn(coordinator.run());

        wait_phase(&mut states, Phase::Client).await;
        assert_eq!(forwarder.target().map(|d| d.port), Some(27690));

        // The old hub goes silent; its descriptor must no longer be trusted.
        live.store(false, Ordering::Relaxed);
        wait_phase(&mut states, Phase::Hub).await;
        let published = store.read().unwrap().unwrap();
        assert_eq!(published.pid, std::process::id());

        control_tx.send_replace(Control::Stop);
        task.await.unwrap().unwrap();
        assert!(store.read().unwrap().is_none());
        assert!(store.read_lock().unwrap().is_none());
        assert_eq!(states.borrow().phase(), Phase::Stopped);
        forwarder.abort();
    }

    #[tokio::test]
    async fn abort_leaves_descriptor_behind() {
        let config = config(27620);
        let store = Arc::new(MemoryStore::new());
        let election = Election::new(
            store.clone(),
            Toggle(Arc::new(AtomicBool::new(false))),
            SystemClock,
            config.election.clone(),
        );
        let tracker = Arc::new(HealthTracker::new(config.heartbeat.missed_limit));
        let forwarder = Arc::new(Forwarder::spawn(
            &config.forwarder,
            &config.heartbeat,
            Identity::current("test"),
            None,
        ));
        let (control_tx, control_rx) = watch::channel(Control::Run);
        let coordinator = Coordinator::new(election, config, forwarder.clone(), tracker, control_rx);
        let mut states = coordinator.subscribe();
        let task = tokio::spawn(coordinator.run());

        wait_phase(&mut states, Phase::Hub).await;
        control_tx.send_replace(Control::Abort);
        task.await.unwrap().unwrap();

        assert!(store.read().unwrap().is_some());
        assert!(store.read_lock().unwrap().is_some());
        forwarder.abort();
    }
}
