//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, min <= max)
//! - Check the remote override parses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: LogHubConfig → Result<(), Vec<ValidationError>>

use std::fmt;

use crate::config::schema::LogHubConfig;
use crate::descriptor::HubDescriptor;

/// A single rejected setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &LogHubConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut positive = |field: &'static str, value: u64| {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    };

    let e = &config.election;
    positive("election.port_range", u64::from(e.port_range));
    positive("election.max_attempts", u64::from(e.max_attempts));
    positive("election.probe_timeout_ms", e.probe_timeout_ms);
    positive("election.lock_stale_ms", e.lock_stale_ms);

    let h = &config.hub;
    positive("hub.buffer_size", h.buffer_size as u64);
    positive("hub.max_event_bytes", h.max_event_bytes as u64);
    positive("hub.viewer_queue", h.viewer_queue as u64);
    positive("hub.max_connections", h.max_connections as u64);
    positive("hub.status_interval_ms", h.status_interval_ms);
    positive("hub.history_default_limit", h.history_default_limit as u64);
    positive("hub.shutdown_timeout_ms", h.shutdown_timeout_ms);

    let f = &config.forwarder;
    positive("forwarder.queue_capacity", f.queue_capacity as u64);
    positive("forwarder.connect_timeout_ms", f.connect_timeout_ms);
    positive("forwarder.send_timeout_ms", f.send_timeout_ms);
    positive("forwarder.backoff_base_ms", f.backoff_base_ms);

    positive("heartbeat.interval_ms", config.heartbeat.interval_ms);
    positive("heartbeat.missed_limit", u64::from(config.heartbeat.missed_limit));

    if e.host.trim().is_empty() {
        errors.push(ValidationError::new("election.host", "must not be empty"));
    }
    if e.base_port < 1024 {
        errors.push(ValidationError::new("election.base_port", "must be at least 1024"));
    }
    if u32::from(e.base_port) + u32::from(e.port_range) > 65_536 {
        errors.push(ValidationError::new("election.port_range", "range extends past port 65535"));
    }
    if e.retry_min_ms > e.retry_max_ms {
        errors.push(ValidationError::new("election.retry_min_ms", "must not exceed retry_max_ms"));
    }
    if h.history_default_limit > h.history_max_limit {
        errors.push(ValidationError::new(
            "hub.history_default_limit",
            "must not exceed history_max_limit",
        ));
    }
    if h.export_limit == Some(0) {
        errors.push(ValidationError::new("hub.export_limit", "must be greater than zero when set"));
    }
    if f.backoff_base_ms > f.backoff_max_ms {
        errors.push(ValidationError::new("forwarder.backoff_base_ms", "must not exceed backoff_max_ms"));
    }
    if config.observability.log_level.trim().is_empty() {
        errors.push(ValidationError::new("observability.log_level", "must not be empty"));
    }
    if config.token.as_deref().is_some_and(|t| t.trim().is_empty()) {
        errors.push(ValidationError::new("token", "must not be empty when set"));
    }
    if let Some(remote) = &config.remote {
        if let Err(err) = HubDescriptor::from_remote(remote, config.token.clone()) {
            errors.push(ValidationError::new("remote", err.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
