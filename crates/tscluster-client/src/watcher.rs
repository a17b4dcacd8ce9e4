//! Health watcher
//!
//! Periodically re-checks every known node and moves it between the active
//! and inactive sets. A node is healthy when it answers its gossip endpoint
//! and reports its own gossip age below `MAX_GOSSIP_AGE_SECS`.

use crate::client::Client;
use crate::error::Result;
use crate::gossip::{age_of, MAX_GOSSIP_AGE_SECS};
use crate::node::Node;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl Client {
    /// Spawn the periodic health check loop
    ///
    /// Returns `None` when the watch interval is zero. The loop runs until
    /// `cancel` is cancelled.
    pub fn watch_and_update(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let period = self.config.watch_interval;
        if period.is_zero() {
            debug!("Health watcher disabled");
            return None;
        }

        let client = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = period.as_millis() as u64, "Health watcher started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => client.check_nodes(&cancel).await,
                }
            }

            info!("Health watcher stopped");
        }))
    }

    /// Run one round of health checks
    ///
    /// A cancelled round stops where it is and leaves the pool untouched
    /// for the node being checked.
    pub async fn check_nodes(&self, cancel: &CancellationToken) {
        if self.config.discover {
            match self.discover_nodes(cancel).await {
                Ok(added) if added > 0 => info!(added, "Discovered new nodes"),
                Ok(_) => {}
                Err(e) if e.is_cancellation() => return,
                Err(e) => warn!(error = %e, "Discovery failed"),
            }
        }

        for node in self.pool.list_inactive_nodes() {
            let Ok(healthy) = self.is_node_active(cancel, &node).await else {
                return;
            };
            if healthy {
                self.pool.activate_nodes(&[Arc::clone(&node)]);
                info!(node = %node.address(), id = %node.id(), "Node promoted to active");
            }
            self.notify_watch(&node, healthy);
        }

        for node in self.pool.list_active_nodes() {
            let Ok(healthy) = self.is_node_active(cancel, &node).await else {
                return;
            };
            if !healthy {
                self.pool.deactivate_nodes(&[Arc::clone(&node)]);
                warn!(node = %node.address(), id = %node.id(), "Node demoted to inactive");
            }
            self.notify_watch(&node, healthy);
        }
    }

    /// Whether a node is reachable and gossiping recently
    ///
    /// Only cancellation is reported as an error; any other failure means
    /// the node is unhealthy.
    pub async fn is_node_active(&self, cancel: &CancellationToken, node: &Arc<Node>) -> Result<bool> {
        if node.id().is_empty() {
            match self.fetch_node_state(cancel, node).await {
                Ok(state) => node.apply_state(&state),
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    debug!(node = %node.address(), error = %e, "State check failed");
                    return Ok(false);
                }
            }
        }

        let gossip = match self.fetch_gossip(cancel, node).await {
            Ok(gossip) => gossip,
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) => {
                debug!(node = %node.address(), error = %e, "Gossip check failed");
                return Ok(false);
            }
        };

        Ok(match age_of(&gossip, &node.id()) {
            Some(age) if age < MAX_GOSSIP_AGE_SECS => true,
            Some(age) => {
                debug!(node = %node.address(), age, "Node gossip is stale");
                false
            }
            None => {
                debug!(node = %node.address(), "Node missing from its own gossip");
                false
            }
        })
    }
}
