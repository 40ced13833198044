//! Configuration schema definitions.
//!
//! All sections default so a minimal (or missing) file works.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for a loghub node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LogHubConfig {
    /// Skip election and forwarding entirely.
    pub disabled: bool,

    /// Fixed hub address (`ws://host:port[/ws]` or `host:port`); bypasses election.
    pub remote: Option<String>,

    /// Shared secret for non-loopback hubs.
    pub token: Option<String>,

    pub election: ElectionConfig,
    pub hub: HubConfig,
    pub forwarder: ForwarderConfig,
    pub heartbeat: HeartbeatConfig,
    pub observability: ObservabilityConfig,
}

/// Descriptor location and election tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Directory holding `hub.json` and `hub.lock`.
    pub dir: PathBuf,

    /// Address the hub binds and publishes.
    pub host: String,

    pub base_port: u16,
    pub port_range: u16,

    /// Lock attempts before giving up with `Contended`.
    pub max_attempts: u32,

    pub retry_min_ms: u64,
    pub retry_max_ms: u64,

    /// Deadline for `GET /healthz` against a published hub.
    pub probe_timeout_ms: u64,

    /// Age after which a held lock is re-examined for staleness.
    pub lock_stale_ms: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("loghub"),
            host: "127.0.0.1".to_string(),
            base_port: 17361,
            port_range: 20,
            max_attempts: 50,
            retry_min_ms: 20,
            retry_max_ms: 200,
            probe_timeout_ms: 1000,
            lock_stale_ms: 10_000,
        }
    }
}

impl ElectionConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_millis(self.lock_stale_ms)
    }
}

/// Hub server limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    /// Ring buffer capacity in events.
    pub buffer_size: usize,

    /// Largest accepted serialized event.
    pub max_event_bytes: usize,

    /// Outbound queue depth per viewer.
    pub viewer_queue: usize,

    pub max_connections: usize,
    pub status_interval_ms: u64,
    pub history_default_limit: usize,
    pub history_max_limit: usize,

    /// Cap exports to the newest N matches. Unset exports the whole buffer.
    pub export_limit: Option<usize>,

    pub shutdown_timeout_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            buffer_size: 50_000,
            max_event_bytes: 64 * 1024,
            viewer_queue: 4096,
            max_connections: 512,
            status_interval_ms: 5000,
            history_default_limit: 1000,
            history_max_limit: 10_000,
            export_limit: None,
            shutdown_timeout_ms: 2000,
        }
    }
}

impl HubConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Client-side queue and reconnect settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwarderConfig {
    pub queue_capacity: usize,
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 20_000,
            connect_timeout_ms: 2000,
            send_timeout_ms: 2000,
            backoff_base_ms: 100,
            backoff_max_ms: 5000,
        }
    }
}

impl ForwarderConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Liveness settings shared by producers, the hub reaper and the monitor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,

    /// Consecutive misses before a peer is considered gone.
    pub missed_limit: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            missed_limit: 3,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Silence after which a connection is reaped.
    pub fn idle_timeout(&self) -> Duration {
        self.interval() * self.missed_limit.max(1)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Fallback filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Serve Prometheus text at `/metrics`.
    pub prometheus: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            prometheus: true,
        }
    }
}
