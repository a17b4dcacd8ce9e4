//! Node pool
//!
//! Keeps every known node in exactly one of two sets, active or inactive.
//! A node is identified by its address; all operations are idempotent with
//! respect to that identity. One reader/writer lock guards both sets.

use crate::node::Node;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::sync::Arc;

#[derive(Debug, Default)]
struct PoolSets {
    active: Vec<Arc<Node>>,
    inactive: Vec<Arc<Node>>,
}

/// Registry of active and inactive nodes
#[derive(Debug, Default)]
pub struct NodePool {
    sets: RwLock<PoolSets>,
}

/// Move the node with `address` from `from` to `to`, keeping the instance
/// already registered so in-place updates stay visible
fn move_node(from: &mut Vec<Arc<Node>>, to: &mut Vec<Arc<Node>>, node: &Arc<Node>) {
    let address = node.address();
    if to.iter().any(|n| n.has_address(&address)) {
        from.retain(|n| !n.has_address(&address));
        return;
    }

    let existing = from
        .iter()
        .position(|n| n.has_address(&address))
        .map(|idx| from.remove(idx));
    to.push(existing.unwrap_or_else(|| Arc::clone(node)));
}

impl NodePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register nodes as inactive unless their address is already known
    pub fn add_nodes(&self, nodes: &[Arc<Node>]) {
        let mut sets = self.sets.write();
        for node in nodes {
            let address = node.address();
            let known = sets
                .active
                .iter()
                .chain(sets.inactive.iter())
                .any(|n| n.has_address(&address));
            if !known {
                sets.inactive.push(Arc::clone(node));
            }
        }
    }

    /// Move nodes to the active set
    pub fn activate_nodes(&self, nodes: &[Arc<Node>]) {
        let mut sets = self.sets.write();
        let PoolSets { active, inactive } = &mut *sets;
        for node in nodes {
            move_node(inactive, active, node);
        }
    }

    /// Move nodes to the inactive set
    pub fn deactivate_nodes(&self, nodes: &[Arc<Node>]) {
        let mut sets = self.sets.write();
        let PoolSets { active, inactive } = &mut *sets;
        for node in nodes {
            move_node(active, inactive, node);
        }
    }

    pub fn list_active_nodes(&self) -> Vec<Arc<Node>> {
        self.sets.read().active.clone()
    }

    pub fn list_inactive_nodes(&self) -> Vec<Arc<Node>> {
        self.sets.read().inactive.clone()
    }

    pub fn active_len(&self) -> usize {
        self.sets.read().active.len()
    }

    pub fn inactive_len(&self) -> usize {
        self.sets.read().inactive.len()
    }

    /// Whether the node with `address` is currently active
    pub fn is_active(&self, address: &str) -> bool {
        self.sets.read().active.iter().any(|n| n.has_address(address))
    }

    /// Get an active node, honoring preferences
    ///
    /// `preferences` is an ordered list of fallback id lists. The first
    /// active node matching an id (scanning lists, then ids, in order) wins.
    /// Without a match a uniformly random active node is returned.
    pub fn get_active_node(&self, preferences: &[Vec<String>]) -> Option<Arc<Node>> {
        let sets = self.sets.read();

        let preferred = preferences
            .iter()
            .flatten()
            .find_map(|id| sets.active.iter().find(|n| n.has_id(id)));
        if let Some(node) = preferred {
            return Some(Arc::clone(node));
        }

        sets.active.choose(&mut rand::thread_rng()).cloned()
    }

    /// Random active node whose address is not in `exclude`
    pub fn random_active_excluding(&self, exclude: &[String]) -> Option<Arc<Node>> {
        let sets = self.sets.read();
        let candidates: Vec<&Arc<Node>> = sets
            .active
            .iter()
            .filter(|n| !exclude.iter().any(|a| n.has_address(a)))
            .collect();
        candidates.choose(&mut rand::thread_rng()).map(|n| Arc::clone(n))
    }

    /// Find a known node by address
    pub fn find_by_address(&self, address: &str) -> Option<Arc<Node>> {
        let sets = self.sets.read();
        sets.active
            .iter()
            .chain(sets.inactive.iter())
            .find(|n| n.has_address(address))
            .cloned()
    }

    /// Find a known node by id
    pub fn find_by_id(&self, id: &str) -> Option<Arc<Node>> {
        let sets = self.sets.read();
        sets.active
            .iter()
            .chain(sets.inactive.iter())
            .find(|n| n.has_id(id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn node(i: usize) -> Arc<Node> {
        Arc::new(Node::with_id(format!("node-{}", i), format!("http://10.0.1.{}:8112", i)))
    }

    fn addresses(nodes: &[Arc<Node>]) -> HashSet<String> {
        nodes.iter().map(|n| n.address()).collect()
    }

    #[test]
    fn test_add_is_idempotent() {
        let pool = NodePool::new();
        let n1 = node(1);

        pool.add_nodes(&[n1.clone(), n1.clone()]);
        pool.add_nodes(&[Arc::new(Node::new(n1.address()))]);
        assert_eq!(pool.inactive_len(), 1);
        assert_eq!(pool.active_len(), 0);

        pool.activate_nodes(&[n1.clone()]);
        pool.add_nodes(&[n1]);
        assert_eq!(pool.inactive_len(), 0);
        assert_eq!(pool.active_len(), 1);
    }

    #[test]
    fn test_activate_then_deactivate() {
        let pool = NodePool::new();
        let n1 = node(1);

        pool.add_nodes(&[n1.clone()]);
        pool.activate_nodes(&[n1.clone()]);
        assert!(pool.is_active(&n1.address()));

        pool.deactivate_nodes(&[n1.clone()]);
        assert!(!pool.is_active(&n1.address()));
        assert_eq!(pool.inactive_len(), 1);
        assert_eq!(pool.active_len(), 0);
    }

    #[test]
    fn test_activate_keeps_registered_instance() {
        let pool = NodePool::new();
        let original = node(1);
        pool.add_nodes(&[original.clone()]);

        let duplicate = Arc::new(Node::new(original.address()));
        pool.activate_nodes(&[duplicate]);

        let active = pool.list_active_nodes();
        assert_eq!(active.len(), 1);
        assert!(Arc::ptr_eq(&active[0], &original));
    }

    #[test]
    fn test_activate_unknown_node() {
        let pool = NodePool::new();
        pool.activate_nodes(&[node(7)]);
        assert_eq!(pool.active_len(), 1);
    }

    #[test]
    fn test_sets_stay_disjoint() {
        let pool = NodePool::new();
        let nodes: Vec<_> = (0..6).map(node).collect();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..2000 {
            let n = nodes[rng.gen_range(0..nodes.len())].clone();
            match rng.gen_range(0..3) {
                0 => pool.add_nodes(&[n]),
                1 => pool.activate_nodes(&[n]),
                _ => pool.deactivate_nodes(&[n]),
            }

            let active = pool.list_active_nodes();
            let inactive = pool.list_inactive_nodes();
            let active_set = addresses(&active);
            let inactive_set = addresses(&inactive);

            assert!(active_set.is_disjoint(&inactive_set));
            assert_eq!(active_set.len(), active.len());
            assert_eq!(inactive_set.len(), inactive.len());
        }
    }

    #[test]
    fn test_get_active_node_preferences() {
        let pool = NodePool::new();
        let nodes: Vec<_> = (1..=3).map(node).collect();
        pool.activate_nodes(&nodes);
        pool.deactivate_nodes(&[nodes[0].clone()]);

        let preferences = vec![
            vec!["node-9".to_string(), "node-1".to_string()],
            vec!["NODE-3".to_string(), "node-2".to_string()],
        ];
        let chosen = pool.get_active_node(&preferences).unwrap();
        assert_eq!(chosen.id(), "node-3");

        let preferences = vec![vec!["node-2".to_string()], vec!["node-3".to_string()]];
        assert_eq!(pool.get_active_node(&preferences).unwrap().id(), "node-2");
    }

    #[test]
    fn test_get_active_node_random() {
        let pool = NodePool::new();
        assert!(pool.get_active_node(&[]).is_none());

        let nodes: Vec<_> = (1..=3).map(node).collect();
        pool.activate_nodes(&nodes);

        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(pool.get_active_node(&[]).unwrap().id());
        }
        assert_eq!(seen.len(), 3);

        let unmatched = vec![vec!["node-42".to_string()]];
        assert!(pool.get_active_node(&unmatched).is_some());
    }

    #[test]
    fn test_random_active_excluding() {
        let pool = NodePool::new();
        let nodes: Vec<_> = (1..=3).map(node).collect();
        pool.activate_nodes(&nodes);

        let exclude = vec![nodes[0].address(), nodes[1].address()];
        for _ in 0..20 {
            let chosen = pool.random_active_excluding(&exclude).unwrap();
            assert_eq!(chosen.address(), nodes[2].address());
        }

        let all: Vec<_> = nodes.iter().map(|n| n.address()).collect();
        assert!(pool.random_active_excluding(&all).is_none());
    }

    #[test]
    fn test_find() {
        let pool = NodePool::new();
        let n1 = node(1);
        pool.add_nodes(&[n1.clone()]);

        assert!(pool.find_by_id("NODE-1").is_some());
        assert!(pool.find_by_address(&n1.address()).is_some());
        assert!(pool.find_by_id("node-2").is_none());
    }
}
