//! Size-capped contextual fields attached to a log event.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Maximum number of top-level context entries per event.
pub const MAX_CONTEXT_FIELDS: usize = 128;

/// Maximum length of a single context key, in bytes.
pub const MAX_CONTEXT_KEY_BYTES: usize = 256;

/// Errors raised when a context map would exceed its caps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context holds more than {} fields", MAX_CONTEXT_FIELDS)]
    TooManyFields,

    #[error("context key of {0} bytes exceeds {max} bytes", max = MAX_CONTEXT_KEY_BYTES)]
    KeyTooLong(usize),
}

/// Ordered key/value container for structured event fields.
///
/// Keys are kept sorted so serialized events are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ContextMap(BTreeMap<String, Value>);

impl ContextMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Option<Value>, ContextError> {
        let key = key.into();
        if key.len() > MAX_CONTEXT_KEY_BYTES {
            return Err(ContextError::KeyTooLong(key.len()));
        }
        if !self.0.contains_key(&key) && self.0.len() >= MAX_CONTEXT_FIELDS {
            return Err(ContextError::TooManyFields);
        }
        Ok(self.0.insert(key, value.into()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Resolve a dotted path such as `user.id`.
    ///
    /// A literal key containing dots wins over nested traversal.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(path) {
            return Some(value);
        }

        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for ContextMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = BTreeMap::<String, Value>::deserialize(deserializer)?;
        if map.len() > MAX_CONTEXT_FIELDS {
            return Err(serde::de::Error::custom(ContextError::TooManyFields));
        }
        if let Some(key) = map.keys().find(|k| k.len() > MAX_CONTEXT_KEY_BYTES) {
            return Err(serde::de::Error::custom(ContextError::KeyTooLong(key.len())));
        }
        Ok(Self(map))
    }
}

/// A resolved event field, borrowed where possible.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Str(Cow<'a, str>),
    Number(f64),
    Bool(bool),
    Json(&'a Value),
}

impl<'a> FieldValue<'a> {
    pub fn from_json(value: &'a Value) -> Self {
        match value {
            Value::String(s) => FieldValue::Str(Cow::Borrowed(s.as_str())),
            Value::Number(n) => n.as_f64().map(FieldValue::Number).unwrap_or(FieldValue::Json(value)),
            Value::Bool(b) => FieldValue::Bool(*b),
            other => FieldValue::Json(other),
        }
    }

    /// Text form used for substring and equality tests.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Str(s) => Cow::Borrowed(s.as_ref()),
            FieldValue::Number(n) => Cow::Owned(format_number(*n)),
            FieldValue::Bool(b) => Cow::Owned(b.to_string()),
            FieldValue::Json(Value::Null) => Cow::Borrowed("null"),
            FieldValue::Json(v) => Cow::Owned(v.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Integral floats print without a fractional part so `42` matches `42`.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
