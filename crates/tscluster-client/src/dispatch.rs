//! Request dispatcher
//!
//! Executes one logical RPC under two independent retry tiers:
//! - whole-request retries (`retries`) for timeouts, 5xx and other transient
//!   failures, with exponential backoff between attempts;
//! - connect retries (`connect_retries`) inside one attempt, moving on to
//!   other active nodes after a connection-level failure.
//!
//! 4xx responses and errors the server flags as unparsable or user errors are
//! returned immediately. Cancellation and deadlines abort both the network
//! exchange and the backoff sleep.

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::node::Node;
use crate::transport::{Request, Response};
use reqwest::header::{HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Header advising the server how long the client will wait
pub const TIMEOUT_HINT_HEADER: &str = "x-snowth-timeout";

/// Fraction of the client timeout advertised to the server
const TIMEOUT_HINT_RATIO: f64 = 0.9;

/// Resolves at `deadline`, or never without one
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Sleep for `delay` unless cancelled or past the deadline first
async fn pause(cancel: &CancellationToken, deadline: Option<Instant>, delay: Duration) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        _ = until(deadline) => Err(ClientError::DeadlineExceeded),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

fn matches_prefix(filter: Option<&str>, path: &str) -> bool {
    filter.map_or(false, |prefix| path.starts_with(prefix))
}

impl Client {
    /// Execute a request with retry and failover
    ///
    /// Returns the first successful (2xx) response. When every attempt fails,
    /// the most recent node's error is returned with the attempt count.
    pub async fn do_request(&self, cancel: &CancellationToken, mut request: Request) -> Result<Response> {
        self.prepare(&mut request)?;

        let mut node_attempts = 0usize;
        let mut last_error = None;

        for attempt in 0..=self.policy.retries {
            if attempt > 0 {
                let delay = self.policy.backoff(attempt);
                debug!(path = %request.path, attempt, delay_ms = delay.as_millis() as u64, "Retrying request");
                pause(cancel, request.deadline, delay).await?;
            }

            match self.attempt(cancel, &request, attempt, &mut node_attempts).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(path = %request.path, attempt, error = %e, "Request attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(ClientError::Exhausted {
            attempts: node_attempts,
            last: Box::new(last_error.unwrap_or(ClientError::NoActiveNodes)),
        })
    }

    /// Send a request to one specific node, without retry or failover
    pub async fn do_node_request(
        &self,
        cancel: &CancellationToken,
        node: &Arc<Node>,
        mut request: Request,
    ) -> Result<Response> {
        self.prepare(&mut request)?;
        self.send_once(cancel, node, &request).await
    }

    /// Apply the timeout hint and the request hook
    fn prepare(&self, request: &mut Request) -> Result<()> {
        if !request.headers.contains_key(TIMEOUT_HINT_HEADER) {
            let budget = match request.remaining() {
                Some(remaining) => remaining.min(self.config.timeout),
                None => self.config.timeout,
            };
            let hint = budget.mul_f64(TIMEOUT_HINT_RATIO);
            if let Ok(value) = HeaderValue::from_str(&format!("{:.3}", hint.as_secs_f64())) {
                request
                    .headers
                    .insert(HeaderName::from_static(TIMEOUT_HINT_HEADER), value);
            }
        }

        if let Some(hook) = self.request_hook() {
            hook(request).map_err(ClientError::Hook)?;
        }
        Ok(())
    }

    /// Node for top-level attempt number `attempt`
    ///
    /// The preferred node is used first; later attempts only return to it
    /// while it is still active.
    fn select_node(&self, request: &Request, attempt: u64) -> Option<Arc<Node>> {
        match &request.preferred {
            Some(node) if attempt == 0 || self.pool.is_active(&node.address()) => Some(Arc::clone(node)),
            Some(node) => self
                .pool
                .get_active_node(&[])
                .or_else(|| Some(Arc::clone(node))),
            None => self.pool.get_active_node(&[]),
        }
    }

    /// One top-level attempt, failing over on connection errors
    async fn attempt(
        &self,
        cancel: &CancellationToken,
        request: &Request,
        attempt: u64,
        node_attempts: &mut usize,
    ) -> Result<Response> {
        let mut node = self.select_node(request, attempt).ok_or(ClientError::NoActiveNodes)?;
        let mut budget = self.policy.connect_retries;
        let mut tried: Vec<String> = Vec::new();

        loop {
            tried.push(node.address());
            *node_attempts += 1;

            let error = match self.send_once(cancel, &node, request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connection() => e,
                Err(e) => return Err(e),
            };

            match budget.as_mut() {
                Some(0) => return Err(error),
                Some(remaining) => *remaining -= 1,
                None => {}
            }

            match self.pool.random_active_excluding(&tried) {
                Some(next) => {
                    debug!(failed = %node.address(), next = %next.address(), error = %error, "Connection failed, trying another node");
                    node = next;
                }
                None => return Err(error),
            }
        }
    }

    /// Send once, racing the exchange against cancellation and the deadline
    pub(crate) async fn send_once(
        &self,
        cancel: &CancellationToken,
        node: &Arc<Node>,
        request: &Request,
    ) -> Result<Response> {
        let dump = matches_prefix(self.config.dump_requests.as_deref(), &request.path);
        let trace = matches_prefix(self.config.trace_requests.as_deref(), &request.path);
        if dump {
            debug!(
                method = %request.method,
                url = %node.url(&request.path),
                headers = ?request.headers,
                body = %String::from_utf8_lossy(&request.body),
                "Request dump"
            );
        }

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            _ = until(request.deadline) => return Err(ClientError::DeadlineExceeded),
            result = self.transport.send(node, request) => result,
        };

        if trace {
            debug!(
                method = %request.method,
                node = %node.address(),
                path = %request.path,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = result.is_ok(),
                "Request trace"
            );
        }

        let response = result?;
        self.observe_topology(node, &response.headers);

        if dump {
            debug!(
                status = response.status,
                headers = ?response.headers,
                body = %String::from_utf8_lossy(&response.body),
                "Response dump"
            );
        }

        if !response.is_success() {
            return Err(ClientError::Server {
                node: response.node.clone(),
                status: response.status,
                message: response.text().trim().to_string(),
            });
        }
        Ok(response)
    }
}
