//! Node discovery
//!
//! Bootstraps the node pool from the configured seed servers and, when
//! discovery is enabled, merges in every node the topology document lists.
//! All requests here go to one specific node; failures are collected and
//! only fatal when no node could be reached at all.

use crate::client::Client;
use crate::config::normalize_address;
use crate::error::{ClientError, MultiError, Result};
use crate::gossip::{decode_gossip, GossipDetail};
use crate::node::{Node, NodeState};
use crate::transport::Request;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tscluster_topology::{TopologyDocument, TopologyNode};

/// Response header carrying the server's current topology hash
pub const TOPOLOGY_HEADER: &str = "x-topo-0";

pub const STATE_PATH: &str = "/state";
pub const GOSSIP_PATH: &str = "/gossip/json";

/// Path of the topology document for `hash`
pub fn topology_path(hash: &str) -> String {
    format!("/topology/json/{}", hash)
}

impl Client {
    /// Fetch and decode a node's status document
    pub async fn fetch_node_state(&self, cancel: &CancellationToken, node: &Arc<Node>) -> Result<NodeState> {
        let response = self
            .do_node_request(cancel, node, Request::get(STATE_PATH))
            .await?;
        NodeState::from_json(&response.body)
    }

    /// Fetch a node's view of cluster gossip
    pub async fn fetch_gossip(&self, cancel: &CancellationToken, node: &Arc<Node>) -> Result<Vec<GossipDetail>> {
        let response = self
            .do_node_request(cancel, node, Request::get(GOSSIP_PATH))
            .await?;
        decode_gossip(&response.body)
    }

    /// Fetch the topology document for `hash` from a node
    pub async fn fetch_topology_document(
        &self,
        cancel: &CancellationToken,
        node: &Arc<Node>,
        hash: &str,
    ) -> Result<TopologyDocument> {
        let response = self
            .do_node_request(cancel, node, Request::get(topology_path(hash)))
            .await?;
        Ok(TopologyDocument::from_json(&response.body)?)
    }

    /// Populate the pool from the seed servers
    ///
    /// Each seed is probed once; reachable seeds are activated and the rest
    /// are kept as inactive for the watcher. Fails only when no node ends up
    /// active.
    pub(crate) async fn bootstrap(&self, cancel: &CancellationToken) -> Result<()> {
        let mut errors = MultiError::new();

        for address in self.config.server_addresses()? {
            if self.pool.find_by_address(&address).is_some() {
                continue;
            }
            let node = Arc::new(Node::new(address));
            self.pool.add_nodes(&[Arc::clone(&node)]);

            match self.fetch_node_state(cancel, &node).await {
                Ok(state) => {
                    node.apply_state(&state);
                    self.pool.activate_nodes(&[Arc::clone(&node)]);
                    info!(node = %node.address(), id = %node.id(), "Seed node active");
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    warn!(node = %node.address(), error = %e, "Seed node unreachable");
                    errors.push(e);
                }
            }
        }

        if let Some(first) = self.pool.list_active_nodes().first() {
            let hash = first.current_topology();
            if !hash.is_empty() {
                self.set_current_topology(&hash);
            }
        }

        if self.config.discover && self.pool.active_len() > 0 {
            if let Err(e) = self.discover_nodes(cancel).await {
                if e.is_cancellation() {
                    return Err(e);
                }
                warn!(error = %e, "Discovery failed");
            }
        }

        if self.pool.active_len() == 0 {
            return Err(errors.into_error(ClientError::NoActiveNodes));
        }

        info!(
            active = self.pool.active_len(),
            inactive = self.pool.inactive_len(),
            "Client bootstrapped"
        );
        Ok(())
    }

    /// Merge the nodes listed in the current topology into the pool
    ///
    /// Known nodes (matched by id, then by API address) are updated in
    /// place; new ones are probed and added as active or inactive. The
    /// compiled topology is installed as a side effect. Returns the number
    /// of nodes added to the pool.
    pub async fn discover_nodes(&self, cancel: &CancellationToken) -> Result<usize> {
        let (source, document) = self.load_topology_document(cancel).await?;
        let hash = source.current_topology();

        let mut added = 0usize;
        let mut reachable = 0usize;
        let mut errors = MultiError::new();

        for member in &document.nodes {
            match self.merge_member(cancel, member).await {
                Ok(Merge::Known) => reachable += 1,
                Ok(Merge::Added) => {
                    reachable += 1;
                    added += 1;
                }
                Ok(Merge::AddedInactive(e)) => {
                    added += 1;
                    errors.push(e);
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => errors.push(e),
            }
        }

        match document.compile(Some(&hash)) {
            Ok(topology) => self.install_topology(Arc::new(topology)),
            Err(e) => {
                warn!(node = %source.address(), hash = %hash, error = %e, "Discovered topology is invalid");
                errors.push(e.into());
            }
        }

        info!(
            added,
            errors = errors.len(),
            active = self.pool.active_len(),
            "Discovery complete"
        );

        if reachable == 0 && !errors.is_empty() {
            return Err(ClientError::Multiple(errors));
        }
        Ok(added)
    }

    /// Topology document from the first active node able to serve one
    async fn load_topology_document(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(Arc<Node>, TopologyDocument)> {
        let mut errors = MultiError::new();

        for node in self.pool.list_active_nodes() {
            let mut hash = node.current_topology();
            if hash.is_empty() {
                match self.fetch_node_state(cancel, &node).await {
                    Ok(state) => {
                        node.apply_state(&state);
                        hash = node.current_topology();
                    }
                    Err(e) if e.is_cancellation() => return Err(e),
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                }
            }
            if hash.is_empty() {
                debug!(node = %node.address(), "Node has no topology");
                continue;
            }

            match self.fetch_topology_document(cancel, &node, &hash).await {
                Ok(document) => return Ok((node, document)),
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    debug!(node = %node.address(), error = %e, "Failed to fetch topology");
                    errors.push(e);
                }
            }
        }

        Err(errors.into_error(ClientError::NoActiveNodes))
    }

    async fn merge_member(&self, cancel: &CancellationToken, member: &TopologyNode) -> Result<Merge> {
        let address = normalize_address(&member.api_url())?;

        let known = self
            .pool
            .find_by_id(&member.id)
            .or_else(|| self.pool.find_by_address(&address));
        if let Some(node) = known {
            if node.id().is_empty() {
                node.set_id(&member.id);
            }
            if !node.has_address(&address) && self.pool.find_by_address(&address).is_none() {
                debug!(id = %member.id, old = %node.address(), new = %address, "Node address changed");
                node.set_address(address);
            }
            return Ok(Merge::Known);
        }

        let node = Arc::new(Node::with_id(member.id.clone(), address));
        self.pool.add_nodes(&[Arc::clone(&node)]);

        match self.fetch_node_state(cancel, &node).await {
            Ok(state) => {
                node.apply_state(&state);
                self.pool.activate_nodes(&[Arc::clone(&node)]);
                info!(node = %node.address(), id = %node.id(), "Discovered node");
                Ok(Merge::Added)
            }
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) => {
                warn!(node = %node.address(), id = %node.id(), error = %e, "Discovered node unreachable");
                Ok(Merge::AddedInactive(e))
            }
        }
    }
}

/// Outcome of merging one topology member into the pool
enum Merge {
    Known,
    Added,
    AddedInactive(ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_path() {
        assert_eq!(topology_path("abc123"), "/topology/json/abc123");
    }
}
