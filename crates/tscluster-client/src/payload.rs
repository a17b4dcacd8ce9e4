//! Tuple-shaped payload rows
//!
//! Several node endpoints answer with rows of the form
//! `[timestamp, {"name": value, ...}]`. These helpers decode them into typed
//! rows with explicit checks on each position.

use crate::error::{ClientError, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// One `[timestamp, {name: value}]` row
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRow {
    /// Seconds since the epoch
    pub timestamp: f64,
    pub values: BTreeMap<String, Value>,
}

impl ValueRow {
    /// Numeric value of `name`, if present and numeric
    pub fn number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }
}

/// Decode a JSON array of rows
pub fn decode_value_rows(bytes: &[u8]) -> Result<Vec<ValueRow>> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ClientError::Protocol(format!("invalid row payload: {}", e)))?;

    value
        .as_array()
        .ok_or_else(|| ClientError::Protocol("row payload is not an array".to_string()))?
        .iter()
        .map(decode_value_row)
        .collect()
}

/// Decode a single `[timestamp, {name: value}]` row
pub fn decode_value_row(row: &Value) -> Result<ValueRow> {
    let tuple = match row.as_array() {
        Some(tuple) if tuple.len() == 2 => tuple,
        _ => {
            return Err(ClientError::Protocol(format!(
                "expected a [timestamp, values] pair, got {}",
                row
            )))
        }
    };

    let timestamp = tuple[0].as_f64().ok_or_else(|| {
        ClientError::Protocol(format!("row timestamp is not a number: {}", tuple[0]))
    })?;

    let values = match &tuple[1] {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Null => BTreeMap::new(),
        other => {
            return Err(ClientError::Protocol(format!(
                "row values are not an object: {}",
                other
            )))
        }
    };

    Ok(ValueRow { timestamp, values })
}
