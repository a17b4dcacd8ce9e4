//! Cluster nodes as seen by the client
//!
//! A `Node` is shared (`Arc<Node>`) between the pool, the watcher and
//! in-flight requests. What the client learns about it later (identity,
//! version, topology hash, even its address) is written in place.

use crate::error::{ClientError, Result};
use parking_lot::RwLock;
use serde_json::Value;

/// Snapshot of what is known about a node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    /// Cluster-assigned identifier (empty until learned)
    pub id: String,
    /// Base URL of the node's HTTP API
    pub address: String,
    /// Last topology hash the node reported
    pub current_topology: String,
    /// Topology the node is migrating to, if any
    pub next_topology: String,
    /// Semantic version of the node software
    pub semver: String,
}

/// A cluster member
#[derive(Debug)]
pub struct Node {
    info: RwLock<NodeInfo>,
}

impl Node {
    /// Create a node known only by its address
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_info(NodeInfo {
            address: address.into(),
            ..Default::default()
        })
    }

    /// Create a node with a known identifier
    pub fn with_id(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self::with_info(NodeInfo {
            id: id.into().to_lowercase(),
            address: address.into(),
            ..Default::default()
        })
    }

    pub fn with_info(info: NodeInfo) -> Self {
        Self {
            info: RwLock::new(info),
        }
    }

    pub fn id(&self) -> String {
        self.info.read().id.clone()
    }

    pub fn address(&self) -> String {
        self.info.read().address.clone()
    }

    pub fn current_topology(&self) -> String {
        self.info.read().current_topology.clone()
    }

    pub fn semver(&self) -> String {
        self.info.read().semver.clone()
    }

    pub fn snapshot(&self) -> NodeInfo {
        self.info.read().clone()
    }

    /// Whether `address` identifies this node
    pub fn has_address(&self, address: &str) -> bool {
        self.info.read().address == address
    }

    /// Whether `id` identifies this node (case-insensitive)
    pub fn has_id(&self, id: &str) -> bool {
        let info = self.info.read();
        !info.id.is_empty() && info.id.eq_ignore_ascii_case(id)
    }

    pub fn set_address(&self, address: impl Into<String>) {
        self.info.write().address = address.into();
    }

    pub fn set_id(&self, id: &str) {
        self.info.write().id = id.to_lowercase();
    }

    pub fn set_current_topology(&self, hash: &str) {
        self.info.write().current_topology = hash.to_string();
    }

    /// Merge a status document into this node
    pub fn apply_state(&self, state: &NodeState) {
        let mut info = self.info.write();
        info.id = state.identity.to_lowercase();
        if !state.semver.is_empty() {
            info.semver = state.semver.clone();
        }
        if !state.current_topology.is_empty() {
            info.current_topology = state.current_topology.clone();
        }
        info.next_topology = state.next_topology.clone();
    }

    /// Absolute URL for a request path on this node
    pub fn url(&self, path: &str) -> String {
        let info = self.info.read();
        if path.starts_with('/') {
            format!("{}{}", info.address, path)
        } else {
            format!("{}/{}", info.address, path)
        }
    }
}

/// Fields extracted from a node's status document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeState {
    pub identity: String,
    pub semver: String,
    pub current_topology: String,
    pub next_topology: String,
}

const IDENTITY_PATHS: &[&str] = &["/identity", "/id"];
const SEMVER_PATHS: &[&str] = &["/semver", "/version"];
const CURRENT_TOPOLOGY_PATHS: &[&str] = &["/topology/current", "/current"];
const NEXT_TOPOLOGY_PATHS: &[&str] = &["/topology/next", "/next"];

/// Placeholder servers use for "no topology"
const NO_TOPOLOGY: &str = "-";

impl NodeState {
    /// Decode a status document
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ClientError::Protocol(format!("invalid node state: {}", e)))?;
        Self::from_value(&value)
    }

    /// Extract the fields from an already-parsed status document
    pub fn from_value(value: &Value) -> Result<Self> {
        let identity = first_string(value, IDENTITY_PATHS);
        if identity.is_empty() {
            return Err(ClientError::Protocol(
                "node state is missing its identity".to_string(),
            ));
        }

        Ok(Self {
            identity,
            semver: first_string(value, SEMVER_PATHS),
            current_topology: topology_hash(first_string(value, CURRENT_TOPOLOGY_PATHS)),
            next_topology: topology_hash(first_string(value, NEXT_TOPOLOGY_PATHS)),
        })
    }
}

fn first_string(value: &Value, paths: &[&str]) -> String {
    paths
        .iter()
        .filter_map(|p| value.pointer(p))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

fn topology_hash(raw: String) -> String {
    if raw == NO_TOPOLOGY {
        String::new()
    } else {
        raw.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_url() {
        let node = Node::new("http://10.0.1.1:8112");
        assert_eq!(node.url("/state"), "http://10.0.1.1:8112/state");
        assert_eq!(node.url("gossip/json"), "http://10.0.1.1:8112/gossip/json");
    }

    #[test]
    fn test_node_identity() {
        let node = Node::with_id("ABC-123", "http://10.0.1.1:8112");
        assert_eq!(node.id(), "abc-123");
        assert!(node.has_id("abc-123"));
        assert!(node.has_id("ABC-123"));
        assert!(node.has_address("http://10.0.1.1:8112"));

        let unknown = Node::new("http://10.0.1.2:8112");
        assert!(!unknown.has_id(""));
    }

    #[test]
    fn test_state_nested_paths() {
        let json = br#"{
            "identity": "1F846F26-0CFD-4DF5-B4F1-E0930604E577",
            "semver": "1.2.3",
            "topology": {"current": "ABCDEF", "next": "-"},
            "features": {"histograms": true}
        }"#;

        let state = NodeState::from_json(json).unwrap();
        assert_eq!(state.identity, "1F846F26-0CFD-4DF5-B4F1-E0930604E577");
        assert_eq!(state.semver, "1.2.3");
        assert_eq!(state.current_topology, "abcdef");
        assert_eq!(state.next_topology, "");
    }

    #[test]
    fn test_state_fallback_paths() {
        let json = br#"{"id": "node-1", "version": "0.9.0", "current": "aa", "next": "bb"}"#;
        let state = NodeState::from_json(json).unwrap();
        assert_eq!(state.identity, "node-1");
        assert_eq!(state.semver, "0.9.0");
        assert_eq!(state.current_topology, "aa");
        assert_eq!(state.next_topology, "bb");
    }

    #[test]
    fn test_state_errors() {
        assert!(matches!(NodeState::from_json(b"{}"), Err(ClientError::Protocol(_))));
        assert!(matches!(NodeState::from_json(b"<xml/>"), Err(ClientError::Protocol(_))));
    }

    #[test]
    fn test_apply_state() {
        let node = Node::new("http://10.0.1.1:8112");
        node.apply_state(&NodeState {
            identity: "NODE-1".to_string(),
            semver: "1.0.0".to_string(),
            current_topology: "abc".to_string(),
            next_topology: String::new(),
        });

        let info = node.snapshot();
        assert_eq!(info.id, "node-1");
        assert_eq!(info.semver, "1.0.0");
        assert_eq!(info.current_topology, "abc");
    }
}
