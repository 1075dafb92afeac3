//! Query backend: the remote analytical engine the content cache reads from.
//!
//! The cache only ever asks two things of a backend: "are you usable?" and
//! "run this query". Connection lifecycle, credentials and retry policy live
//! behind the [`QueryBackend`] trait.
//!
//! Rows come back as [`Record`]s: column → [`FieldValue`] maps that keep the
//! query's column order and serialize as plain JSON objects.

use std::fmt;

use async_trait::async_trait;
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

pub mod auth;
pub mod bigquery;
#[cfg(test)]
mod mock_http;

pub use auth::TokenProvider;
pub use bigquery::BigQueryBackend;

/// Errors produced while executing a query against the remote engine.
///
/// The content cache treats every variant the same way ("fetch failed"); the
/// distinction only matters for logging.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("query backend is not available (missing credentials or connection)")]
    Unavailable,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("query execution failed (status={status}): {message}")]
    QueryFailed { status: u16, message: String },

    #[error("malformed query response: {0}")]
    Decode(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

/// A single typed cell value.
///
/// Serialized untagged, so a record encodes as `{"total_confirmed": 42, "country_region": "Spain"}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Returns the text payload, if this is a [`FieldValue::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is a [`FieldValue::Integer`].
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One result row: column name → value, in the order the engine returned
/// the columns.
///
/// # Examples
///
/// ```
/// use epicache::backend::{FieldValue, Record};
///
/// let record = Record::new()
///     .with("country_region", "Spain")
///     .with("total_confirmed", 42_i64);
///
/// assert_eq!(record.get("country_region").and_then(FieldValue::as_str), Some("Spain"));
/// assert_eq!(record.len(), 2);
/// assert_eq!(
///     serde_json::to_string(&record).unwrap(),
///     r#"{"country_region":"Spain","total_confirmed":42}"#
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets a column, replacing any previous value in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterates `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in &self.columns {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// A remote query engine.
///
/// Implementations must be `Send + Sync`: one backend instance is shared by
/// every in-flight request through the content cache.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Returns `true` once credentials and connection details are in place.
    fn available(&self) -> bool;

    /// Executes `query` and returns its rows in engine order.
    ///
    /// May block for as long as the remote engine takes; callers inherit
    /// whatever timeout the implementation applies.
    async fn execute(&self, query: &str) -> Result<Vec<Record>, BackendError>;
}
