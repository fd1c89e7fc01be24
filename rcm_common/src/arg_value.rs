//! Self-describing payload values for commands and events.
//!
//! Every argument or result crossing an interface boundary is an
//! [`ArgValue`]. The serialized form is tagged with the variant name, so
//! a receiver can detect a payload of the wrong shape instead of
//! misinterpreting raw bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A command argument, command result, or event payload.
///
/// The set of variants covers the scalar and aggregate shapes the demo
/// components exchange; `Record` nests arbitrarily for structured
/// payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    /// No payload (void command, bare event).
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    FloatVec(Vec<f64>),
    /// Nested key/value payload. BTreeMap keeps the serialized form
    /// deterministic.
    Record(BTreeMap<String, ArgValue>),
}

impl ArgValue {
    /// Variant name, for type-mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ArgValue::Empty => "empty",
            ArgValue::Bool(_) => "bool",
            ArgValue::Int(_) => "int",
            ArgValue::Float(_) => "float",
            ArgValue::Text(_) => "text",
            ArgValue::Bytes(_) => "bytes",
            ArgValue::FloatVec(_) => "float_vec",
            ArgValue::Record(_) => "record",
        }
    }

    /// True for the `Empty` variant.
    pub fn is_empty(&self) -> bool {
        matches!(self, ArgValue::Empty)
    }
}

impl Default for ArgValue {
    fn default() -> Self {
        ArgValue::Empty
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Text(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Text(v)
    }
}

impl From<Vec<f64>> for ArgValue {
    fn from(v: Vec<f64>) -> Self {
        ArgValue::FloatVec(v)
    }
}
