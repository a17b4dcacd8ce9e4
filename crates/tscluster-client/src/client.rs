//! Cluster client
//!
//! `Client` owns all client-wide mutable state: the node pool, the
//! transport, the cached topology and the request/watch hooks. It is shared
//! as `Arc<Client>` between callers and the health watcher.
//!
//! The compiled topology is cached copy-on-invalidate: readers keep using
//! the `Arc<Topology>` they loaded while a response carrying a new topology
//! hash clears the cache, and the next ownership query compiles a fresh one.

use crate::config::ClientConfig;
use crate::discovery::TOPOLOGY_HEADER;
use crate::error::{ClientError, MultiError, Result};
use crate::node::Node;
use crate::pool::NodePool;
use crate::transport::{HttpTransport, Request, Response, Transport};
use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tscluster_topology::{Topology, TopologyNode};

/// Hook run on every outgoing request; an `Err` aborts the request
pub type RequestHook = Arc<dyn Fn(&mut Request) -> std::result::Result<(), String> + Send + Sync>;

/// Hook run after every health check with the node and its verdict
pub type WatchHook = Arc<dyn Fn(&Node, bool) + Send + Sync>;

/// Base delay between whole-request retries
pub const BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Upper bound on a single backoff delay
pub const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Retry budgets derived from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Whole-request retries after the first attempt
    pub retries: u64,
    /// Extra nodes tried after a connection failure; `None` means all
    pub connect_retries: Option<usize>,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            retries: config.effective_retries(),
            connect_retries: config.connect_retry_budget(),
            backoff_base: BACKOFF_BASE,
            backoff_max: BACKOFF_MAX,
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`
    pub fn backoff(&self, attempt: u64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20) as u32;
        self.backoff_base
            .saturating_mul(2u32.pow(exponent))
            .min(self.backoff_max)
    }
}

/// Client for a clustered time series store
pub struct Client {
    pub(crate) config: ClientConfig,
    pub(crate) policy: RetryPolicy,
    pub(crate) pool: NodePool,
    pub(crate) transport: Arc<dyn Transport>,
    current_topology: RwLock<String>,
    compiled: ArcSwapOption<Topology>,
    // Held while one caller fetches and compiles the topology
    reload: tokio::sync::Mutex<()>,
    request_hook: RwLock<Option<RequestHook>>,
    watch_hook: RwLock<Option<WatchHook>>,
}

impl Client {
    /// Connect to the cluster over HTTP
    ///
    /// Fails if no seed node can be activated.
    pub async fn connect(config: ClientConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::connect_with_transport(config, transport).await
    }

    /// Connect to the cluster through a custom transport
    pub async fn connect_with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Self>> {
        let client = Arc::new(Self::with_transport(config, transport)?);
        client.bootstrap(&CancellationToken::new()).await?;
        Ok(client)
    }

    /// Build a client without contacting any node; the pool starts empty
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            policy: RetryPolicy::from_config(&config),
            config,
            pool: NodePool::new(),
            transport,
            current_topology: RwLock::new(String::new()),
            compiled: ArcSwapOption::empty(),
            reload: tokio::sync::Mutex::new(()),
            request_hook: RwLock::new(None),
            watch_hook: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn set_request_hook(&self, hook: Option<RequestHook>) {
        *self.request_hook.write() = hook;
    }

    pub fn set_watch_hook(&self, hook: Option<WatchHook>) {
        *self.watch_hook.write() = hook;
    }

    pub(crate) fn request_hook(&self) -> Option<RequestHook> {
        self.request_hook.read().clone()
    }

    pub(crate) fn notify_watch(&self, node: &Node, active: bool) {
        let hook = self.watch_hook.read().clone();
        if let Some(hook) = hook {
            hook(node, active);
        }
    }

    /// Topology hash the client currently believes in
    pub fn current_topology(&self) -> String {
        self.current_topology.read().clone()
    }

    /// Adopt `hash` as the current topology, dropping a stale compiled ring
    ///
    /// Returns whether the hash changed.
    pub fn set_current_topology(&self, hash: &str) -> bool {
        let hash = hash.to_lowercase();
        let mut current = self.current_topology.write();
        if *current == hash {
            return false;
        }
        info!(old = %current, new = %hash, "Topology changed, invalidating compiled ring");
        *current = hash;
        self.compiled.store(None);
        true
    }

    /// Compiled topology, if one is cached
    pub fn cached_topology(&self) -> Option<Arc<Topology>> {
        self.compiled.load_full()
    }

    /// Drop the cached compiled topology
    pub fn invalidate_topology(&self) {
        self.compiled.store(None);
    }

    /// Cache a compiled topology if it matches the current hash
    ///
    /// A client without a topology hash adopts the topology's.
    pub(crate) fn install_topology(&self, topology: Arc<Topology>) {
        let mut current = self.current_topology.write();
        if current.is_empty() {
            *current = topology.hash().to_string();
        }
        if *current == topology.hash() {
            debug!(hash = %topology.hash(), "Installed compiled topology");
            self.compiled.store(Some(topology));
        }
    }

    /// Record the topology hash a node reported in a response
    pub(crate) fn observe_topology(&self, node: &Node, headers: &HeaderMap) {
        let Some(hash) = headers
            .get(TOPOLOGY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|h| !h.is_empty())
        else {
            return;
        };

        if !node.current_topology().eq_ignore_ascii_case(hash) {
            node.set_current_topology(&hash.to_lowercase());
        }
        self.set_current_topology(hash);
    }

    /// Current compiled topology, fetching and compiling it when needed
    ///
    /// Only one caller reloads at a time; concurrent callers wait for it and
    /// then share the installed topology.
    pub async fn topology(&self, cancel: &CancellationToken) -> Result<Arc<Topology>> {
        if let Some(topology) = self.cached_topology() {
            return Ok(topology);
        }

        let _reload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            guard = self.reload.lock() => guard,
        };
        if let Some(topology) = self.cached_topology() {
            return Ok(topology);
        }

        let wanted = self.current_topology();
        let mut candidates = self.pool.list_active_nodes();
        // Nodes already on the wanted topology first
        candidates.sort_by_key(|n| n.current_topology() != wanted);

        let mut errors = MultiError::new();
        for node in candidates {
            let hash = if wanted.is_empty() {
                node.current_topology()
            } else {
                wanted.clone()
            };
            if hash.is_empty() {
                continue;
            }

            let compiled = match self.fetch_topology_document(cancel, &node, &hash).await {
                Ok(document) => document.compile(Some(&hash)).map_err(ClientError::from),
                Err(e) => Err(e),
            };

            match compiled {
                Ok(topology) => {
                    let topology = Arc::new(topology);
                    self.install_topology(Arc::clone(&topology));
                    return Ok(topology);
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    debug!(node = %node.address(), error = %e, "Failed to load topology");
                    errors.push(e);
                }
            }
        }

        Err(errors.into_error(ClientError::NoActiveNodes))
    }

    /// Nodes owning a metric, primary first
    pub async fn locate(
        &self,
        cancel: &CancellationToken,
        owner_id: &str,
        metric: &str,
    ) -> Result<Vec<TopologyNode>> {
        let topology = self.topology(cancel).await?;
        Ok(topology
            .find_metric(owner_id, metric)?
            .into_iter()
            .cloned()
            .collect())
    }

    /// Active node that should serve requests for a metric
    pub async fn preferred_node(
        &self,
        cancel: &CancellationToken,
        owner_id: &str,
        metric: &str,
    ) -> Result<Option<Arc<Node>>> {
        let topology = self.topology(cancel).await?;
        let owners = topology.find_metric_node_ids(owner_id, metric)?;
        Ok(self.pool.get_active_node(&[owners]))
    }

    /// Execute a request against the nodes owning a metric
    ///
    /// When the topology cannot be loaded the request is still sent, to any
    /// active node.
    pub async fn do_metric_request(
        &self,
        cancel: &CancellationToken,
        owner_id: &str,
        metric: &str,
        mut request: Request,
    ) -> Result<Response> {
        if request.preferred.is_none() {
            match self.preferred_node(cancel, owner_id, metric).await {
                Ok(node) => request.preferred = node,
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => debug!(error = %e, "No topology for node preference"),
            }
        }
        self.do_request(cancel, request).await
    }
}
