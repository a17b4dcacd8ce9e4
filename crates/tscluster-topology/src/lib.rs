//! tscluster Topology - Consistent-hashing ring for cluster ownership
//!
//! This crate provides the pure, I/O-free half of the cluster client:
//! - Topology documents and node descriptors
//! - Ring compilation with a self-verifying topology digest
//! - Ownership lookups (`find_n`, `find_metric`) with side-aware replica placement

pub mod digest;
pub mod error;
pub mod node;
pub mod ring;

pub use digest::Location;
pub use error::{Result, TopologyError};
pub use node::{Side, TopologyNode};
pub use ring::{metric_key, RingSlot, Topology, TopologyDocument, DEFAULT_WRITE_COPIES};
