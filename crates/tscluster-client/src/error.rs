//! Client error types

use std::fmt;
use thiserror::Error;
use tscluster_topology::TopologyError;

/// Error text markers for requests the server will never accept
pub const NON_RETRYABLE_MARKERS: &[&str] = &["unable to parse", "unparsable", "user error"];

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection to {node} failed: {message}")]
    Connection { node: String, message: String },

    #[error("Request to {node} timed out")]
    Timeout { node: String },

    #[error("Transport error on {node}: {message}")]
    Transport { node: String, message: String },

    #[error("Server {node} returned {status}: {message}")]
    Server {
        node: String,
        status: u16,
        message: String,
    },

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    #[error("No active nodes available")]
    NoActiveNodes,

    #[error("Request rejected by hook: {0}")]
    Hook(String),

    #[error("{0}")]
    Multiple(MultiError),

    #[error("Request failed after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: usize,
        last: Box<ClientError>,
    },
}

impl ClientError {
    /// Connection-level failure that warrants trying another node
    pub fn is_connection(&self) -> bool {
        matches!(self, ClientError::Connection { .. })
    }

    /// Caller cancelled or ran out of time
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ClientError::Cancelled | ClientError::DeadlineExceeded)
    }

    /// HTTP status reported by the server, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            ClientError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Whether a whole-request retry may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connection { .. }
            | ClientError::Timeout { .. }
            | ClientError::Transport { .. }
            | ClientError::NoActiveNodes => true,
            ClientError::Server {
                status, message, ..
            } => !(400..500).contains(status) && !is_non_retryable_message(message),
            _ => false,
        }
    }
}

/// Whether the server's error text marks a request that will never succeed
pub fn is_non_retryable_message(message: &str) -> bool {
    let message = message.to_lowercase();
    NON_RETRYABLE_MARKERS.iter().any(|m| message.contains(m))
}

/// Several independent failures reported as one
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<ClientError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ClientError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ClientError] {
        &self.errors
    }

    /// Collapse into a single error: `fallback` when empty, the error itself
    /// when there is only one
    pub fn into_error(mut self, fallback: ClientError) -> ClientError {
        match self.errors.len() {
            0 => fallback,
            1 => self.errors.remove(0),
            _ => ClientError::Multiple(self),
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred:", self.errors.len())?;
        for error in &self.errors {
            write!(f, " [{}]", error)?;
        }
        Ok(())
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
