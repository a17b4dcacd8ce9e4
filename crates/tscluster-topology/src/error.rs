//! Topology error types

use thiserror::Error;

/// Topology errors
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Topology integrity check failed: declared {declared}, computed {computed}")]
    Integrity { declared: String, computed: String },

    #[error("Empty topology")]
    EmptyTopology,

    #[error("Invalid node '{id}': {reason}")]
    InvalidNode { id: String, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type for topology operations
pub type Result<T> = std::result::Result<T, TopologyError>;

impl From<serde_json::Error> for TopologyError {
    fn from(e: serde_json::Error) -> Self {
        TopologyError::Parse(e.to_string())
    }
}
