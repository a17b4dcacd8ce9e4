//! Compiled topology ring
//!
//! `Topology::compile` turns a weighted node list into a sorted ring of hash
//! slots and verifies it against the declared topology hash. Ownership
//! queries walk the ring clockwise from the key's location.
//!
//! When any node declares a side, the ring is split into two logical halves
//! by the top bit of each location. Replica lookups alternate halves: after
//! each selected replica the search location's top bit is flipped, so
//! successive replicas land in opposite failure domains.

use crate::digest::{is_upper_half, key_location, slot_location, topology_digest, Location};
use crate::error::{Result, TopologyError};
use crate::node::TopologyNode;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Replication factor assumed when the topology document does not carry one
pub const DEFAULT_WRITE_COPIES: u8 = 2;

/// One slot on the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSlot {
    /// Position on the ring
    pub location: Location,
    /// Index of the owning node in `Topology::nodes`
    pub node: usize,
    /// Weight index that produced this slot
    pub replica: u16,
}

impl RingSlot {
    fn in_upper_half(&self) -> bool {
        is_upper_half(&self.location)
    }
}

/// A compiled, verified topology
#[derive(Debug, Clone)]
pub struct Topology {
    hash: String,
    write_copies: u8,
    sided: bool,
    nodes: Vec<TopologyNode>,
    ring: Vec<RingSlot>,
}

impl Topology {
    /// Compile a node list into a ring
    ///
    /// If `declared_hash` is given and non-empty it must match the computed
    /// digest; otherwise the computed digest becomes the topology hash.
    pub fn compile(
        mut nodes: Vec<TopologyNode>,
        declared_hash: Option<&str>,
        write_copies: u8,
    ) -> Result<Self> {
        for node in &mut nodes {
            node.id = node.id.to_lowercase();
            if node.weight > u16::MAX as u32 {
                return Err(TopologyError::InvalidNode {
                    id: node.id.clone(),
                    reason: format!("weight {} exceeds {}", node.weight, u16::MAX),
                });
            }
        }

        let sided = nodes.iter().any(|n| n.side.is_declared());
        let computed = topology_digest(&nodes, sided, write_copies);

        if let Some(declared) = declared_hash.filter(|h| !h.is_empty()) {
            if !declared.eq_ignore_ascii_case(&computed) {
                return Err(TopologyError::Integrity {
                    declared: declared.to_string(),
                    computed,
                });
            }
        }

        let total_weight: usize = nodes.iter().map(|n| n.weight as usize).sum();
        let mut ring = Vec::with_capacity(total_weight);
        for (idx, node) in nodes.iter().enumerate() {
            for replica in 0..node.weight as u16 {
                ring.push(RingSlot {
                    location: slot_location(&node.id, replica, node.side),
                    node: idx,
                    replica,
                });
            }
        }
        ring.sort_by(|a, b| {
            a.location
                .cmp(&b.location)
                .then(a.node.cmp(&b.node))
                .then(a.replica.cmp(&b.replica))
        });

        debug!(
            hash = %computed,
            nodes = nodes.len(),
            slots = ring.len(),
            sided,
            write_copies,
            "Compiled topology"
        );

        Ok(Self {
            hash: computed,
            write_copies,
            sided,
            nodes,
            ring,
        })
    }

    /// Topology hash (lower-case hex)
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Configured replication factor
    pub fn write_copies(&self) -> u8 {
        self.write_copies
    }

    /// Whether the ring is split into sides
    pub fn is_sided(&self) -> bool {
        self.sided
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[TopologyNode] {
        &self.nodes
    }

    /// Ring slots in ascending location order
    pub fn slots(&self) -> &[RingSlot] {
        &self.ring
    }

    /// Number of ring slots
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Get a node by (case-insensitive) id
    pub fn node(&self, id: &str) -> Option<&TopologyNode> {
        let id = id.to_lowercase();
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Index of the first slot at or after `location`, wrapping to 0
    fn search(&self, location: &Location) -> usize {
        let idx = self.ring.partition_point(|slot| slot.location < *location);
        if idx == self.ring.len() {
            0
        } else {
            idx
        }
    }

    /// Find up to `n` distinct nodes owning `key`
    pub fn find_n(&self, key: &str, n: usize) -> Result<Vec<&TopologyNode>> {
        if self.ring.is_empty() {
            return Err(TopologyError::EmptyTopology);
        }

        let len = self.ring.len();
        let mut location = key_location(key);
        let wanted = n.min(self.nodes.len());
        let mut selected: Vec<usize> = Vec::with_capacity(wanted);

        for _ in 0..wanted {
            let start = self.search(&location);
            let upper = is_upper_half(&location);

            let found = (0..2 * len)
                .map(|step| &self.ring[(start + step) % len])
                .find(|slot| {
                    !selected.contains(&slot.node) && (!self.sided || slot.in_upper_half() == upper)
                });

            match found {
                Some(slot) => selected.push(slot.node),
                None => break,
            }

            location[0] ^= 0x80;
        }

        Ok(selected.into_iter().map(|idx| &self.nodes[idx]).collect())
    }

    /// Find the nodes owning a metric
    pub fn find_metric(&self, owner_id: &str, metric: &str) -> Result<Vec<&TopologyNode>> {
        self.find_n(&metric_key(owner_id, metric), self.write_copies as usize)
    }

    /// Find the ids of the nodes owning a metric
    pub fn find_metric_node_ids(&self, owner_id: &str, metric: &str) -> Result<Vec<String>> {
        Ok(self
            .find_metric(owner_id, metric)?
            .into_iter()
            .map(|n| n.id.clone())
            .collect())
    }
}

/// Ring lookup key for a metric
pub fn metric_key(owner_id: &str, metric: &str) -> String {
    format!("{}-{}", owner_id.to_lowercase(), metric)
}

/// Topology document as served by cluster nodes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyDocument {
    /// Replication factor
    #[serde(default)]
    pub write_copies: u8,
    /// Legacy spelling of `write_copies`
    #[serde(default, rename = "writecopies", skip_serializing_if = "is_zero")]
    pub legacy_write_copies: u8,
    /// Cluster members in declaration order
    #[serde(default)]
    pub nodes: Vec<TopologyNode>,
}

fn is_zero(v: &u8) -> bool {
    *v == 0
}

impl TopologyDocument {
    /// Parse a JSON topology document
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Replication factor, honoring the legacy field and the default
    pub fn effective_write_copies(&self) -> u8 {
        match (self.write_copies, self.legacy_write_copies) {
            (0, 0) => DEFAULT_WRITE_COPIES,
            (0, legacy) => legacy,
            (copies, _) => copies,
        }
    }

    /// Compile the document into a ring
    pub fn compile(self, declared_hash: Option<&str>) -> Result<Topology> {
        let write_copies = self.effective_write_copies();
        Topology::compile(self.nodes, declared_hash, write_copies)
    }
}
