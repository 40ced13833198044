//! Metrics collection and exposition.
//!
//! # Metrics
//! - `loghub_events_ingested_total` (counter): events accepted by the hub
//! - `loghub_events_evicted_total` (counter): ring buffer evictions
//! - `loghub_events_rejected_total` (counter): by `reason` (oversized, malformed, invalid, unauthorized)
//! - `loghub_viewer_drops_total` (counter): events dropped on full viewer queues
//! - `loghub_buffer_occupancy` (gauge): events currently buffered
//! - `loghub_connections` (gauge): live connections by `kind`
//! - `loghub_forwarder_dropped_total` (counter): client queue overflow
//! - `loghub_forwarder_reconnects_total` (counter): failed forwarder sessions
//! - `loghub_elections_total` (counter): by `outcome` (hub, client, remote, error)
//! - `loghub_failovers_total` (counter): role lost, re-election started

use std::sync::OnceLock;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder once per process.
///
/// Returns `None` if another recorder was installed first.
pub fn install_prometheus() -> Option<&'static PrometheusHandle> {
    PROMETHEUS
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Prometheus recorder not installed");
                None
            }
        })
        .as_ref()
}

/// Render the exposition text, if a recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS.get().and_then(Option::as_ref).map(PrometheusHandle::render)
}

pub fn record_ingested() {
    counter!("loghub_events_ingested_total").increment(1);
}

pub fn record_evicted(count: u64) {
    if count > 0 {
        counter!("loghub_events_evicted_total").increment(count);
    }
}

pub fn record_rejected(reason: &'static str) {
    counter!("loghub_events_rejected_total", "reason" => reason).increment(1);
}

pub fn record_viewer_drop() {
    counter!("loghub_viewer_drops_total").increment(1);
}

pub fn set_buffer_occupancy(len: usize) {
    gauge!("loghub_buffer_occupancy").set(len as f64);
}

pub fn set_connections(kind: &'static str, count: usize) {
    gauge!("loghub_connections", "kind" => kind).set(count as f64);
}

pub fn record_forwarder_drop() {
    counter!("loghub_forwarder_dropped_total").increment(1);
}

pub fn record_forwarder_reconnect() {
    counter!("loghub_forwarder_reconnects_total").increment(1);
}

pub fn record_election(outcome: &'static str) {
    counter!("loghub_elections_total", "outcome" => outcome).increment(1);
}

pub fn record_failover() {
    counter!("loghub_failovers_total").increment(1);
}
