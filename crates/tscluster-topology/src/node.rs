//! Topology node descriptors
//!
//! A `TopologyNode` is one entry of the cluster's topology document. Its
//! weight is the number of slots it contributes to the ring, and its side
//! (if any) pins those slots to one half of the hash space.

use crate::error::{Result, TopologyError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Failure-domain label of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Option<String>", into = "String")]
pub enum Side {
    /// No side declared
    #[default]
    None,
    /// Lower half of the hash space (top bit clear)
    A,
    /// Upper half of the hash space (top bit set)
    B,
}

impl Side {
    /// Byte written into the topology digest for sided topologies
    pub fn digest_byte(&self) -> u8 {
        match self {
            Side::None => 0,
            Side::A => 1,
            Side::B => 2,
        }
    }

    /// Whether a side was declared
    pub fn is_declared(&self) -> bool {
        *self != Side::None
    }

    /// Apply this side to a ring location by forcing its top bit
    pub fn pin(&self, location: &mut [u8; 32]) {
        match self {
            Side::None => {}
            Side::A => location[0] &= 0x7f,
            Side::B => location[0] |= 0x80,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::None => "",
            Side::A => "a",
            Side::B => "b",
        }
    }
}

impl FromStr for Side {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Ok(Side::None),
            "a" | "A" => Ok(Side::A),
            "b" | "B" => Ok(Side::B),
            other => Err(TopologyError::Parse(format!("invalid side '{}'", other))),
        }
    }
}

impl TryFrom<Option<String>> for Side {
    type Error = TopologyError;

    fn try_from(value: Option<String>) -> Result<Self> {
        match value {
            Some(s) => s.parse(),
            None => Ok(Side::None),
        }
    }
}

impl From<Side> for String {
    fn from(side: Side) -> Self {
        side.as_str().to_string()
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::None => write!(f, "none"),
            Side::A => write!(f, "a"),
            Side::B => write!(f, "b"),
        }
    }
}

/// A node as described by the topology document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyNode {
    /// Cluster-assigned node identifier
    pub id: String,
    /// Host name or IP address
    pub address: String,
    /// Replication port
    #[serde(default)]
    pub port: u16,
    /// HTTP API port
    #[serde(default, rename = "apiport", alias = "api_port")]
    pub api_port: u16,
    /// Number of ring slots owned by this node
    #[serde(default)]
    pub weight: u32,
    /// Failure domain
    #[serde(default)]
    pub side: Side,
}

impl TopologyNode {
    /// Create a new topology node
    pub fn new(id: impl Into<String>, address: impl Into<String>, api_port: u16, weight: u32) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            port: 0,
            api_port,
            weight,
            side: Side::None,
        }
    }

    /// Set the failure domain
    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    /// Set the replication port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Base URL of the node's HTTP API
    pub fn api_url(&self) -> String {
        format!("http://{}:{}", self.address, self.api_port)
    }
}
