//! Viewer filter configuration and its compiled form.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Level, LogEvent};
use crate::query::error::QueryError;
use crate::query::parser::parse_at;
use crate::query::predicate::{contains_ci, Predicate};

/// Preset look-back windows offered to viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
}

impl TimeRange {
    pub fn window(self) -> Duration {
        match self {
            TimeRange::FiveMinutes => Duration::minutes(5),
            TimeRange::FifteenMinutes => Duration::minutes(15),
            TimeRange::OneHour => Duration::hours(1),
            TimeRange::OneDay => Duration::hours(24),
        }
    }
}

/// Viewer-side filter settings, as sent over the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfiguration {
    pub name: String,
    pub time_range: Option<TimeRange>,
    pub levels: Vec<Level>,
    pub services: Vec<String>,
    pub text_search: String,
    /// Field name to exact value.
    pub field_filters: BTreeMap<String, String>,
    pub query: String,
    /// Message substrings that reject an event.
    pub exclude_patterns: Vec<String>,
}

impl FilterConfiguration {
    /// A filter that only carries a query expression.
    pub fn from_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn compile(&self) -> Result<CompiledFilter, QueryError> {
        self.compile_at(Utc::now())
    }

    pub fn compile_at(&self, now: DateTime<Utc>) -> Result<CompiledFilter, QueryError> {
        let query = match self.query.trim() {
            "" => None,
            expr => Some(parse_at(expr, now)?),
        };

        Ok(CompiledFilter {
            since: self.time_range.map(|range| now - range.window()),
            levels: self.levels.iter().copied().collect(),
            services: self.services.iter().map(|s| s.to_lowercase()).collect(),
            text: Some(self.text_search.trim().to_lowercase()).filter(|t| !t.is_empty()),
            fields: self.field_filters.clone().into_iter().collect(),
            query,
            excludes: self
                .exclude_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        })
    }
}

/// A filter resolved once; evaluation does no parsing or allocation
/// beyond field text conversion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    since: Option<DateTime<Utc>>,
    levels: HashSet<Level>,
    services: HashSet<String>,
    text: Option<String>,
    fields: Vec<(String, String)>,
    query: Option<Predicate>,
    excludes: Vec<String>,
}

impl CompiledFilter {
    /// Matches every event.
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn from_predicate(predicate: Predicate) -> Self {
        Self {
            query: Some(predicate),
            ..Self::default()
        }
    }

    pub fn is_everything(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, event: &LogEvent) -> bool {
        if self.since.is_some_and(|since| event.timestamp < since) {
            return false;
        }
        if !self.levels.is_empty() && !self.levels.contains(&event.level) {
            return false;
        }
        if !self.services.is_empty() && !self.services.contains(&event.service.to_lowercase()) {
            return false;
        }
        if let Some(text) = &self.text {
            if !contains_ci(&event.message, text) {
                return false;
            }
        }
        for (field, expected) in &self.fields {
            if !event.field(field).is_some_and(|v| v.as_text() == expected.as_str()) {
                return false;
            }
        }
        if self.excludes.iter().any(|pattern| contains_ci(&event.message, pattern)) {
            return false;
        }
        self.query.as_ref().map_or(true, |q| q.matches(event))
    }
}
