//! Compiled predicates evaluated against events.

use chrono::{DateTime, Utc};

use crate::event::{Level, LogEvent};
use crate::query::lexer::Cmp;

/// How a level term compares against the event's level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelTest {
    Eq,
    Cmp(Cmp),
}

/// Immutable parsed query. Needles are stored lowercased.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Case-insensitive substring of the message.
    Text(String),
    Level(LevelTest, Level),
    /// Case-insensitive service equality.
    Service(String),
    /// Case-insensitive substring of a field's text.
    Contains { field: String, needle: String },
    /// Exact equality with a field's text.
    Exact { field: String, value: String },
    /// Numeric comparison on a field.
    Compare { field: String, cmp: Cmp, value: f64 },
    /// Event timestamp inside `[start, end]`.
    TimeWithin {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn matches(&self, event: &LogEvent) -> bool {
        match self {
            Predicate::Text(needle) => contains_ci(&event.message, needle),
            Predicate::Level(LevelTest::Eq, level) => event.level == *level,
            Predicate::Level(LevelTest::Cmp(cmp), level) => cmp.holds(event.level, *level),
            Predicate::Service(service) => event.service.to_lowercase() == *service,
            Predicate::Contains { field, needle } => event
                .field(field)
                .is_some_and(|value| contains_ci(&value.as_text(), needle)),
            Predicate::Exact { field, value } => event.field(field).is_some_and(|v| v.as_text() == value.as_str()),
            Predicate::Compare { field, cmp, value } => event
                .field(field)
                .and_then(|v| v.as_number())
                .is_some_and(|n| cmp.holds(n, *value)),
            Predicate::TimeWithin { start, end } => {
                start.map_or(true, |s| event.timestamp >= s) && end.map_or(true, |e| event.timestamp <= e)
            }
            Predicate::And(parts) => parts.iter().all(|p| p.matches(event)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(event)),
            Predicate::Not(inner) => !inner.matches(event),
        }
    }
}

/// `needle` must already be lowercase.
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if haystack.is_ascii() && needle.is_ascii() {
        return haystack
            .as_bytes()
            .windows(needle.len())
            .any(|w| w.eq_ignore_ascii_case(needle.as_bytes()));
    }
    haystack.to_lowercase().contains(needle)
}
