//! In-memory cluster used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tscluster_client::{ClientError, Node, Request, Response, Result, Transport};

pub type Handler = Arc<dyn Fn(&str, &Request) -> Result<Response> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Call {
    pub node: String,
    pub path: String,
    pub headers: HeaderMap,
}

/// Transport answering from a handler closure and recording every call
pub struct MockTransport {
    handler: Handler,
    delay: Option<Duration>,
    calls: Mutex<Vec<Call>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&str, &Request) -> Result<Response> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Arc::new(handler),
            delay: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn slow<F>(delay: Duration, handler: F) -> Arc<Self>
    where
        F: Fn(&str, &Request) -> Result<Response> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Arc::new(handler),
            delay: Some(delay),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Take the calls recorded so far, leaving the log empty
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock())
    }

    pub fn calls_to(&self, path: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.path == path).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, node: &Node, request: &Request) -> Result<Response> {
        let address = node.address();
        self.calls.lock().push(Call {
            node: address.clone(),
            path: request.path.clone(),
            headers: request.headers.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(&address, request)
    }
}

pub fn address(i: usize) -> String {
    format!("http://10.0.0.{}:8112", i)
}

pub fn respond(node: &str, status: u16, body: impl Into<Bytes>) -> Result<Response> {
    Ok(Response {
        status,
        headers: HeaderMap::new(),
        body: body.into(),
        node: node.to_string(),
    })
}

pub fn ok(node: &str, body: impl Into<Bytes>) -> Result<Response> {
    respond(node, 200, body)
}

pub fn with_topology(response: Result<Response>, hash: &str) -> Result<Response> {
    response.map(|mut r| {
        if let Ok(value) = HeaderValue::from_str(hash) {
            r.headers.insert(tscluster_client::TOPOLOGY_HEADER, value);
        }
        r
    })
}

pub fn refused(node: &str) -> Result<Response> {
    Err(ClientError::Connection {
        node: node.to_string(),
        message: "connection refused".to_string(),
    })
}

pub fn state_json(id: &str, topology: &str) -> String {
    format!(
        r#"{{"identity": "{}", "semver": "1.0.0", "topology": {{"current": "{}", "next": "-"}}}}"#,
        id,
        if topology.is_empty() { "-" } else { topology }
    )
}

pub fn gossip_json(id: &str, age: f64) -> String {
    format!(
        r#"[{{"id": "{}", "gossip_time": "1700000000.000", "gossip_age": "{:.3}", "topo_current": "-", "topo_next": "-", "topo_state": "n/a", "latency": {{}}}}]"#,
        id, age
    )
}
