//! tscluster Client - Fault-tolerant client for a clustered time series store
//!
//! This crate provides the networked half of the cluster client:
//! - Seed bootstrap and topology-driven node discovery
//! - An active/inactive node pool kept current by a gossip health watcher
//! - A request dispatcher with whole-request retries, connection failover,
//!   cancellation and deadlines
//! - Ring-aware routing of metric requests to their owning nodes

pub mod client;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod gossip;
pub mod node;
pub mod payload;
pub mod pool;
pub mod transport;
pub mod watcher;

pub use client::{Client, RequestHook, RetryPolicy, WatchHook};
pub use config::ClientConfig;
pub use discovery::TOPOLOGY_HEADER;
pub use dispatch::TIMEOUT_HINT_HEADER;
pub use error::{ClientError, MultiError, Result};
pub use gossip::GossipDetail;
pub use node::{Node, NodeInfo, NodeState};
pub use payload::ValueRow;
pub use pool::NodePool;
pub use transport::{HttpTransport, Request, Response, Transport};
pub use tokio_util::sync::CancellationToken;
