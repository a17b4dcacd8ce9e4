//! Ring locations and the topology digest
//!
//! Every location on the ring is a raw SHA-256 digest compared as a
//! big-endian 256-bit integer. The topology digest is an order-dependent hash
//! of all node descriptors; servers publish it as the topology hash, so the
//! byte layout here must not change.

use crate::node::{Side, TopologyNode};
use sha2::{Digest, Sha256};

/// A 256-bit position on the ring
pub type Location = [u8; 32];

/// Width node ids are padded or truncated to before hashing
pub const ID_WIDTH: usize = 36;

/// Replication factor that omits the legacy trailer from the digest
pub const DIGEST_NATIVE_WRITE_COPIES: u8 = 2;

/// Trailer written before the write-copies byte when the replication factor
/// is not the native one. Kept for compatibility with published hashes.
pub const LEGACY_PADDING: [u8; 38] = [0u8; 38];

/// Node id as a fixed-width, zero-padded byte block
pub fn padded_id(id: &str) -> [u8; ID_WIDTH] {
    let mut out = [0u8; ID_WIDTH];
    let bytes = id.as_bytes();
    let len = bytes.len().min(ID_WIDTH);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

/// Location of a lookup key
pub fn key_location(key: &str) -> Location {
    Sha256::digest(key.as_bytes()).into()
}

/// Location of the `replica`-th slot of a node
pub fn slot_location(id: &str, replica: u16, side: Side) -> Location {
    let mut hasher = Sha256::new();
    hasher.update(padded_id(id));
    hasher.update(replica.to_be_bytes());
    let mut location: Location = hasher.finalize().into();
    side.pin(&mut location);
    location
}

/// Whether a location falls in the upper half of the ring
pub fn is_upper_half(location: &Location) -> bool {
    location[0] & 0x80 != 0
}

/// Compute the topology digest as lower-case hex
///
/// Node ids must already be normalized and weights must fit in a `u16`.
pub fn topology_digest(nodes: &[TopologyNode], sided: bool, write_copies: u8) -> String {
    let mut hasher = Sha256::new();
    for node in nodes {
        hasher.update(padded_id(&node.id));
        hasher.update([0u8, 0u8]);
        hasher.update((node.weight as u16).to_be_bytes());
        if sided {
            hasher.update([node.side.digest_byte()]);
        }
    }
    if write_copies != DIGEST_NATIVE_WRITE_COPIES {
        hasher.update(LEGACY_PADDING);
        hasher.update([write_copies]);
    }
    hex::encode(hasher.finalize())
}
