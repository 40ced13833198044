//! Core event types.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::event::context::{ContextError, ContextMap, FieldValue};

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    #[serde(alias = "WARNING")]
    Warn,
    Error,
    #[serde(alias = "FATAL")]
    Critical,
}

impl Level {
    pub const ALL: [Level; 5] = [Level::Debug, Level::Info, Level::Warn, Level::Error, Level::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level: {0}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Case-insensitive, accepts the same aliases as deserialization.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" | "FATAL" => Ok(Level::Critical),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Where the hub received an event from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub host: String,
    pub pid: Option<u32>,
}

/// A structured log record.
///
/// The `source_*` and `received_at` fields belong to the hub: whatever a
/// producer sends in them is replaced when the hub stamps the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub service: String,
    pub message: String,
    #[serde(default)]
    pub logger: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub context: ContextMap,

    #[serde(default)]
    pub source_host: Option<String>,
    #[serde(default)]
    pub source_pid: Option<u32>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

impl LogEvent {
    /// Create an event timestamped now.
    pub fn new(level: Level, service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            service: service.into(),
            message: message.into(),
            logger: String::new(),
            trace_id: None,
            context: ContextMap::new(),
            source_host: None,
            source_pid: None,
            received_at: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = logger.into();
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Attach a context field. Fails once the context cap is reached.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self, ContextError> {
        self.context.insert(key, value)?;
        Ok(self)
    }

    /// Produce the hub's copy of this event.
    pub fn stamped(self, origin: &Origin, received_at: DateTime<Utc>) -> Self {
        Self {
            source_host: Some(origin.host.clone()),
            source_pid: origin.pid,
            received_at: Some(received_at),
            ..self
        }
    }

    /// Size of the JSON encoding in bytes.
    pub fn serialized_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    /// Look up a field by name for filtering.
    ///
    /// Reserved names address the event's own fields; anything else
    /// (optionally prefixed with `context.`) is a dotted context path.
    pub fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "timestamp" => Some(FieldValue::Str(Cow::Owned(self.timestamp.to_rfc3339()))),
            "level" => Some(FieldValue::Str(Cow::Borrowed(self.level.as_str()))),
            "service" => Some(borrowed(&self.service)),
            "message" | "msg" => Some(borrowed(&self.message)),
            "logger" => Some(borrowed(&self.logger)),
            "trace_id" => self.trace_id.as_deref().map(borrowed),
            "source_host" | "host" => self.source_host.as_deref().map(borrowed),
            "source_pid" | "pid" => self.source_pid.map(|p| FieldValue::Number(f64::from(p))),
            "received_at" => self
                .received_at
                .map(|t| FieldValue::Str(Cow::Owned(t.to_rfc3339()))),
            other => {
                let path = other.strip_prefix("context.").unwrap_or(other);
                self.context.get_path(path).map(FieldValue::from_json)
            }
        }
    }
}

fn borrowed(s: &str) -> FieldValue<'_> {
    FieldValue::Str(Cow::Borrowed(s))
}
