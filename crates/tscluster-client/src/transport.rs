//! Request/response types and the node transport
//!
//! `Transport` is the single seam between the dispatcher and the network:
//! it sends one request to one node and reports what happened, without any
//! retry or node selection of its own. Non-2xx statuses are returned as
//! responses; only failures to complete the exchange are errors.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::node::Node;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One logical RPC against the cluster
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Path relative to the node's base URL, e.g. `/state`
    pub path: String,
    pub body: Bytes,
    pub headers: HeaderMap,
    /// Node to try first
    pub preferred: Option<Arc<Node>>,
    /// Absolute deadline for the whole call, retries included
    pub deadline: Option<Instant>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: Bytes::new(),
            headers: HeaderMap::new(),
            preferred: None,
            deadline: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn prefer(mut self, node: Arc<Node>) -> Self {
        self.preferred = Some(node);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Time left before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// A node's answer to a request
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Address of the node that answered
    pub node: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as (lossy) UTF-8 text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Sends a single request to a single node
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, node: &Node, request: &Request) -> Result<Response>;
}

/// HTTP transport backed by `reqwest`
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport using the configured dial and request timeouts
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.dial_timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, node: &Node, request: &Request) -> Result<Response> {
        let address = node.address();
        let mut builder = self
            .client
            .request(request.method.clone(), node.url(&request.path))
            .headers(request.headers.clone());

        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }
        if let Some(remaining) = request.remaining() {
            builder = builder.timeout(remaining.min(self.timeout));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(&address, e))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| classify(&address, e))?;

        Ok(Response {
            status,
            headers,
            body,
            node: address,
        })
    }
}

/// Map a `reqwest` failure onto the client's error taxonomy
///
/// Dial failures (including dial timeouts) are connection errors; a timeout
/// after the connection was established is not.
fn classify(address: &str, error: reqwest::Error) -> ClientError {
    if error.is_connect() {
        ClientError::Connection {
            node: address.to_string(),
            message: error.to_string(),
        }
    } else if error.is_timeout() {
        ClientError::Timeout {
            node: address.to_string(),
        }
    } else {
        ClientError::Transport {
            node: address.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = Request::post("/write/raw", "payload")
            .with_header(HeaderName::from_static("x-test"), HeaderValue::from_static("1"));

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body, Bytes::from("payload"));
        assert_eq!(request.headers.get("x-test").unwrap(), "1");
        assert!(request.deadline.is_none());
        assert!(request.remaining().is_none());
    }

    #[tokio::test]
    async fn test_request_remaining() {
        let request = Request::get("/state").with_timeout(Duration::from_secs(5));
        let remaining = request.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(5));
        assert!(remaining > Duration::from_secs(4));
    }

    #[test]
    fn test_response_helpers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-topo-0", HeaderValue::from_static("abc"));
        let response = Response {
            status: 204,
            headers,
            body: Bytes::from_static(b"ok"),
            node: "http://10.0.1.1:8112".to_string(),
        };

        assert!(response.is_success());
        assert_eq!(response.text(), "ok");
        assert_eq!(response.header("X-Topo-0"), Some("abc"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let config = ClientConfig::new([address.clone()]);
        let transport = HttpTransport::new(&config).unwrap();
        let node = Node::new(address);

        let err = transport.send(&node, &Request::get("/state")).await.unwrap_err();
        assert!(err.is_connection(), "unexpected error: {}", err);
    }
}
