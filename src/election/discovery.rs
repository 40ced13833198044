//! Hub election and discovery.
//!
//! # Responsibilities
//! - Join a live hub if one is published
//! - Otherwise compete for the lock, breaking it only when provably stale
//! - Bind the hub port for the winner

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::distributions::{Alphanumeric, DistString};

use crate::config::ElectionConfig;
use crate::descriptor::{is_loopback_host, DescriptorStore, HubDescriptor, LockAttempt, LockRecord, StoreError};
use crate::election::probe::HubProbe;
use crate::election::types::{Elected, ElectionError, HubLease};
use crate::net::bind_in_range;
use crate::observability::metrics;

/// Time source for election retries.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Election for one candidate process.
pub struct Election<S, P, C = SystemClock> {
    store: Arc<S>,
    probe: P,
    clock: C,
    config: ElectionConfig,
    remote: Option<String>,
    token: Option<String>,
    pid: u32,
}

impl<S, P, C> Election<S, P, C>
where
    S: DescriptorStore,
    P: HubProbe,
    C: Clock,
{
    pub fn new(store: Arc<S>, probe: P, clock: C, config: ElectionConfig) -> Self {
        Self {
            store,
            probe,
            clock,
            config,
            remote: None,
            token: None,
            pid: std::process::id(),
        }
    }

    /// Skip election and always join `remote`.
    pub fn with_remote(mut self, remote: Option<String>) -> Self {
        self.remote = remote;
        self
    }

    /// Token published by a non-loopback hub, or presented to a remote one.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub async fn acquire_role(&self) -> Result<Elected, ElectionError> {
        if let Some(remote) = &self.remote {
            let descriptor =
                HubDescriptor::from_remote(remote, self.token.clone()).map_err(ElectionError::InvalidRemote)?;
            tracing::info!(hub = %descriptor.authority(), "Using remote hub override");
            metrics::record_election("remote");
            return Ok(Elected::Client(descriptor));
        }

        let mut attempts = 0;
        loop {
            if let Some(descriptor) = self.live_descriptor().await {
                tracing::info!(hub = %descriptor.authority(), hub_pid = descriptor.pid, "Joining existing hub");
                metrics::record_election("client");
                return Ok(Elected::Client(descriptor));
            }

            let record = LockRecord::new(self.pid, self.clock.now());
            match self.store.try_lock(&record)? {
                LockAttempt::Acquired => {
                    let lease = self.claim(record).await?;
                    metrics::record_election("hub");
                    return Ok(Elected::Hub(lease));
                }
                LockAttempt::Held => {
                    attempts += 1;
                    if self.break_if_stale().await? {
                        tracing::info!(attempt = attempts, "Broke stale hub lock");
                    } else {
                        if attempts >= self.config.max_attempts {
                            metrics::record_election("error");
                            return Err(ElectionError::Contended { attempts });
                        }
                        let delay = fastrand::u64(self.config.retry_min_ms..=self.config.retry_max_ms);
                        tracing::debug!(attempt = attempts, delay_ms = delay, "Hub lock held, retrying");
                        self.clock.sleep(Duration::from_millis(delay)).await;
                    }
                    if attempts >= self.config.max_attempts.saturating_mul(2) {
                        metrics::record_election("error");
                        return Err(ElectionError::Contended { attempts });
                    }
                }
            }
        }
    }

    /// The published descriptor, if it validates and its hub answers.
    async fn live_descriptor(&self) -> Option<HubDescriptor> {
        let descriptor = match self.store.read() {
            Ok(Some(d)) => d,
            Ok(None) => return None,
            Err(StoreError::Corrupt(reason)) => {
                tracing::warn!(reason = %reason, "Ignoring corrupt hub descriptor");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read hub descriptor");
                return None;
            }
        };

        if let Err(e) = descriptor.validate() {
            tracing::warn!(error = %e, "Ignoring invalid hub descriptor");
            return None;
        }
        if !self.probe.is_live(&descriptor).await {
            tracing::debug!(hub = %descriptor.authority(), hub_pid = descriptor.pid, "Published hub is not live");
            return None;
        }
        Some(descriptor)
    }

    /// Break the held lock if it is stale. `true` means retry at once.
    async fn break_if_stale(&self) -> Result<bool, ElectionError> {
        let Some(state) = self.store.read_lock()? else {
            return Ok(true);
        };

        let stale_after = self.config.lock_stale_after();
        let stale = match &state.record {
            Some(record) if !self.probe.pid_alive(record.pid) => {
                tracing::info!(holder_pid = record.pid, "Hub lock holder is gone");
                true
            }
            Some(record) => {
                state.age > stale_after && {
                    let live = self.live_descriptor().await.is_some();
                    if !live {
                        tracing::info!(holder_pid = record.pid, age_ms = state.age.as_millis() as u64, "Hub lock is old and its hub does not answer");
                    }
                    !live
                }
            }
            None => state.age > stale_after,
        };

        if !stale {
            return Ok(false);
        }
        Ok(self.store.break_stale_lock(&state)?)
    }

    async fn claim(&self, lock: LockRecord) -> Result<HubLease, ElectionError> {
        let host = self.config.host.clone();
        let bound = match bind_in_range(&host, self.config.base_port, self.config.port_range).await {
            Ok(bound) => bound,
            Err(e) => {
                if let Err(release) = self.store.release_lock(&lock) {
                    tracing::warn!(error = %release, "Failed to release hub lock after bind failure");
                }
                metrics::record_election("error");
                return Err(ElectionError::PortsExhausted(e));
            }
        };

        let token = if is_loopback_host(&host) {
            None
        } else {
            Some(
                self.token
                    .clone()
                    .unwrap_or_else(|| Alphanumeric.sample_string(&mut rand::thread_rng(), 32)),
            )
        };

        tracing::info!(address = %bound.local_addr, "Won hub election");
        Ok(HubLease {
            port: bound.local_addr.port(),
            listener: bound.listener,
            lock,
            host,
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::MemoryStore;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Probe with scripted liveness.
    #[derive(Default)]
    struct FakeProbe {
        dead_pids: HashSet<u32>,
        live_ports: Mutex<HashSet<u16>>,
    }

    impl HubProbe for FakeProbe {
        fn pid_alive(&self, pid: u32) -> bool {
            !self.dead_pids.contains(&pid)
        }

        async fn is_live(&self, descriptor: &HubDescriptor) -> bool {
            self.pid_alive(descriptor.pid) && self.live_ports.lock().unwrap().contains(&descriptor.port)
        }
    }

    /// Clock that never sleeps.
    struct InstantClock;

    impl Clock for InstantClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }

        async fn sleep(&self, _duration: Duration) {
            tokio::task::yield_now().await;
        }
    }

    fn config(base_port: u16) -> ElectionConfig {
        ElectionConfig {
            base_port,
            port_range: 10,
            max_attempts: 3,
            lock_stale_ms: 1000,
            ..ElectionConfig::default()
        }
    }

    fn election(store: &Arc<MemoryStore>, probe: FakeProbe, base_port: u16) -> Election<MemoryStore, FakeProbe, InstantClock> {
        Election::new(Arc::clone(store), probe, InstantClock, config(base_port)).with_pid(1000)
    }

    #[tokio::test]
    async fn empty_store_elects_hub() {
        let store = Arc::new(MemoryStore::new());
        let elected = election(&store, FakeProbe::default(), 27500).acquire_role().await.unwrap();
        let Elected::Hub(lease) = elected else {
            panic!("expected hub");
        };
        assert!(lease.port >= 27500 && lease.port < 27510);
        assert!(lease.token.is_none());
        assert!(store.lock_owned_by(&lease.lock).unwrap());
    }

    #[tokio::test]
    async fn live_descriptor_makes_client() {
        let store = Arc::new(MemoryStore::new());
        let published = HubDescriptor::new("127.0.0.1", 17999, 2000, None);
        store.publish(&published).unwrap();
        let probe = FakeProbe::default();
        probe.live_ports.lock().unwrap().insert(17999);

        match election(&store, probe, 27520).acquire_role().await.unwrap() {
            Elected::Client(d) => assert_eq!(d, published),
            Elected::Hub(_) => panic!("expected client"),
        }
    }

    #[tokio::test]
    async fn corrupt_descriptor_is_treated_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.put_raw_descriptor("{\"host\":");
        assert!(matches!(
            election(&store, FakeProbe::default(), 27530).acquire_role().await.unwrap(),
            Elected::Hub(_)
        ));
    }

    #[tokio::test]
    async fn dead_holder_lock_is_broken() {
        let store = Arc::new(MemoryStore::new());
        let holder = LockRecord::new(4242, Utc::now());
        store.put_lock(serde_json::to_vec(&holder).unwrap(), Duration::ZERO);
        let probe = FakeProbe {
            dead_pids: HashSet::from([4242]),
            ..FakeProbe::default()
        };

        assert!(matches!(election(&store, probe, 27540).acquire_role().await.unwrap(), Elected::Hub(_)));
    }

    #[tokio::test]
    async fn old_lock_with_silent_hub_is_broken() {
        let store = Arc::new(MemoryStore::new());
        let holder = LockRecord::new(77, Utc::now());
        store.put_lock(serde_json::to_vec(&holder).unwrap(), Duration::from_secs(5));
        store.publish(&HubDescriptor::new("127.0.0.1", 17998, 77, None)).unwrap();

        assert!(matches!(
            election(&store, FakeProbe::default(), 27550).acquire_role().await.unwrap(),
            Elected::Hub(_)
        ));
    }

    #[tokio::test]
    async fn fresh_lock_of_live_holder_is_contended() {
        let store = Arc::new(MemoryStore::new());
        let holder = LockRecord::new(77, Utc::now());
        store.put_lock(serde_json::to_vec(&holder).unwrap(), Duration::ZERO);

        let err = election(&store, FakeProbe::default(), 27560).acquire_role().await.unwrap_err();
        assert!(matches!(err, ElectionError::Contended { attempts: 3 }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn unreadable_lock_breaks_only_when_old() {
        let store = Arc::new(MemoryStore::new());
        store.put_lock("", Duration::ZERO);
        assert!(election(&store, FakeProbe::default(), 27570).acquire_role().await.is_err());

        store.put_lock("", Duration::from_secs(2));
        assert!(matches!(
            election(&store, FakeProbe::default(), 27570).acquire_role().await.unwrap(),
            Elected::Hub(_)
        ));
    }

    #[tokio::test]
    async fn remote_override_skips_election() {
        let store = Arc::new(MemoryStore::new());
        let elected = election(&store, FakeProbe::default(), 27580)
            .with_remote(Some("127.0.0.1:9555".into()))
            .acquire_role()
            .await
            .unwrap();
        match elected {
            Elected::Client(d) => assert_eq!((d.port, d.pid), (9555, 0)),
            Elected::Hub(_) => panic!("expected client"),
        }
        assert!(store.read_lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn exhausted_ports_release_the_lock() {
        let blocker = bind_in_range("127.0.0.1", 27590, 1).await.unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut election = election(&store, FakeProbe::default(), 27590);
        election.config.port_range = 1;

        let err = election.acquire_role().await.unwrap_err();
        assert!(matches!(err, ElectionError::PortsExhausted(_)));
        assert!(store.read_lock().unwrap().is_none());
        drop(blocker);
    }
}
