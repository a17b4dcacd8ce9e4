//! Gossip liveness snapshots
//!
//! Nodes publish what they know about each peer's gossip freshness. Numbers
//! arrive as decimal strings (`"0.392"`), so decoding is done field by field
//! rather than through a derived schema.

use crate::error::{ClientError, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Gossip age (seconds) at or above which a node is considered stale
pub const MAX_GOSSIP_AGE_SECS: f64 = 10.0;

/// One node's gossip entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GossipDetail {
    pub id: String,
    /// Time of the last gossip message, seconds since the epoch
    pub time: f64,
    /// Seconds since the last gossip message
    pub age: f64,
    pub current_topology: String,
    pub next_topology: String,
    pub topology_state: String,
    /// Latency to each peer in seconds, keyed by peer id
    pub latency: HashMap<String, f64>,
}

impl GossipDetail {
    /// Whether the node has gossiped recently enough to serve requests
    pub fn is_fresh(&self) -> bool {
        self.age < MAX_GOSSIP_AGE_SECS
    }
}

/// Decode a gossip document (a JSON array of entries)
pub fn decode_gossip(bytes: &[u8]) -> Result<Vec<GossipDetail>> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ClientError::Protocol(format!("invalid gossip document: {}", e)))?;

    let entries = value
        .as_array()
        .ok_or_else(|| ClientError::Protocol("gossip document is not an array".to_string()))?;

    entries.iter().map(decode_entry).collect()
}

fn decode_entry(entry: &Value) -> Result<GossipDetail> {
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ClientError::Protocol("gossip entry is missing its id".to_string()))?;

    let age = match entry.get("gossip_age") {
        Some(v) => decimal(v).ok_or_else(|| {
            ClientError::Protocol(format!("gossip entry {} has an invalid age", id))
        })?,
        None => f64::INFINITY,
    };

    let latency = entry
        .get("latency")
        .and_then(Value::as_object)
        .map(|peers| {
            peers
                .iter()
                .filter_map(|(peer, v)| decimal(v).map(|l| (peer.to_lowercase(), l)))
                .collect()
        })
        .unwrap_or_default();

    Ok(GossipDetail {
        id: id.to_lowercase(),
        time: entry.get("gossip_time").and_then(decimal).unwrap_or_default(),
        age,
        current_topology: text(entry, "topo_current"),
        next_topology: text(entry, "topo_next"),
        topology_state: text(entry, "topo_state"),
        latency,
    })
}

/// A number given either as a JSON number or a decimal string
fn decimal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(entry: &Value, key: &str) -> String {
    entry
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Gossip age reported for node `id`, if present
pub fn age_of(gossip: &[GossipDetail], id: &str) -> Option<f64> {
    gossip
        .iter()
        .find(|g| g.id.eq_ignore_ascii_case(id))
        .map(|g| g.age)
}
