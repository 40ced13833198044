//! Hub liveness tracking for clients.
//!
//! # Responsibilities
//! - Count consecutive failures from probes and the forwarder
//! - Probe the current hub every heartbeat interval
//! - Signal the coordinator once the failure limit is reached

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time;

use crate::descriptor::HubDescriptor;
use crate::election::HubProbe;

/// Consecutive-failure counter shared by the monitor and the forwarder.
#[derive(Debug)]
pub struct HealthTracker {
    failures: AtomicU32,
    limit: u32,
    notify: Notify,
}

impl HealthTracker {
    pub fn new(limit: u32) -> Self {
        Self {
            failures: AtomicU32::new(0),
            limit: limit.max(1),
            notify: Notify::new(),
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    /// Returns the consecutive failure count.
    pub fn record_failure(&self) -> u32 {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        if failures >= self.limit {
            self.notify.notify_waiters();
        }
        failures
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.record_success();
    }

    pub fn is_lost(&self) -> bool {
        self.failures() >= self.limit
    }

    /// Resolves once the failure limit is reached.
    pub async fn lost(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_lost() {
                return;
            }
            notified.await;
        }
    }
}

/// Periodic probe of the hub a client is attached to.
pub struct FailoverMonitor<'a, P> {
    probe: &'a P,
    tracker: Arc<HealthTracker>,
    interval: Duration,
}

impl<'a, P: HubProbe> FailoverMonitor<'a, P> {
    pub fn new(probe: &'a P, tracker: Arc<HealthTracker>, interval: Duration) -> Self {
        Self {
            probe,
            tracker,
            interval,
        }
    }

    /// Probe `hub` until the tracker reports it lost.
    pub async fn watch(&self, hub: &HubDescriptor) {
        tracing::debug!(hub = %hub.authority(), interval_ms = self.interval.as_millis() as u64, "Hub monitor starting");
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        loop {
            ticker.tick().await;
            if self.probe.is_live(hub).await {
                self.tracker.record_success();
            } else {
                let failures = self.tracker.record_failure();
                tracing::warn!(hub = %hub.authority(), failures, "Hub health probe failed");
            }
            if self.tracker.is_lost() {
                tracing::warn!(hub = %hub.authority(), "Hub considered lost");
                return;
            }
        }
    }
}
