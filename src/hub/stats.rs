//! Hub counters.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashSet;

#[derive(Debug, Default)]
pub struct HubStats {
    ingested: AtomicU64,
    rejected: AtomicU64,
    malformed: AtomicU64,
    total_connections: AtomicU64,
    services: DashSet<String>,
}

impl HubStats {
    pub fn record_ingested(&self, service: &str) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
        if !self.services.contains(service) {
            self.services.insert(service.to_string());
        }
        crate::observability::metrics::record_ingested();
    }

    pub fn record_rejected(&self, reason: &'static str) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        crate::observability::metrics::record_rejected(reason);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        crate::observability::metrics::record_rejected("malformed");
    }

    pub fn record_connection(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ingested(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Distinct producer services seen, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.services.iter().map(|s| s.key().clone()).collect();
        services.sort();
        services
    }
}

/// Events per second over the last complete second.
#[derive(Debug, Default, Clone, Copy)]
pub struct RateWindow {
    second: u64,
    count: u64,
    last: u64,
}

impl RateWindow {
    fn roll(&mut self, second: u64) {
        if second != self.second {
            self.last = if second == self.second + 1 { self.count } else { 0 };
            self.second = second;
            self.count = 0;
        }
    }

    /// `second` is whole seconds since the hub started.
    pub fn record(&mut self, second: u64) {
        self.roll(second);
        self.count += 1;
    }

    pub fn per_second(&self, second: u64) -> u64 {
        if second == self.second {
            self.last
        } else if second == self.second + 1 {
            self.count
        } else {
            0
        }
    }
}
