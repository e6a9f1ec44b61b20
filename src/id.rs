//! Identifier space: 256-bit identifiers, hashing and the XOR distance metric.
//!
//! Identifiers are stored big-endian as `[u8; 32]`, so byte-wise lexicographic
//! order is the same as numeric order of the full 256-bit integer. Nothing in
//! this module ever narrows an identifier or a distance to a machine word.

use std::cmp::Ordering;

use iroh_blake3::Hasher;

use crate::error::IdError;

// ============================================================================
// Type Aliases
// ============================================================================

/// Width of an identifier in bytes.
pub const ID_LEN: usize = 32;

/// Width of an identifier in bits.
pub const ID_BITS: usize = ID_LEN * 8;

/// A 256-bit identifier for peers in the overlay.
///
/// Peer ids are derived by hashing some stable input (a name, a public key)
/// with BLAKE3 so they are spread evenly over the identifier space.
pub type NodeId = [u8; ID_LEN];

/// A 256-bit key addressing a stored record.
///
/// Keys and peer ids share one identifier space, which is what lets the
/// distance metric rank peers against a key.
pub type Key = [u8; ID_LEN];

/// XOR of two identifiers, interpreted as an unsigned 256-bit integer.
pub type Distance = [u8; ID_LEN];

// ============================================================================
// Hashing Functions
// ============================================================================

/// Compute a 32-byte BLAKE3 digest of the input data.
fn blake3_digest(data: &[u8]) -> [u8; ID_LEN] {
    let mut hasher = Hasher::new();
    hasher.update(data);
    let digest = hasher.finalize();

    let mut out = [0u8; ID_LEN];
    out.copy_from_slice(digest.as_bytes());
    out
}

/// Derive a stable [`NodeId`] by hashing arbitrary input with BLAKE3.
///
/// ```
/// use xor_dht::derive_node_id;
///
/// let id = derive_node_id(b"peer-7");
/// assert_eq!(id, derive_node_id(b"peer-7"));
/// ```
pub fn derive_node_id(data: &[u8]) -> NodeId {
    blake3_digest(data)
}

/// Compute the content hash of some bytes.
///
/// This is the `Hash(bytes) -> Digest` primitive the key checks are defined
/// against:
///
/// ```
/// use xor_dht::hash_content;
///
/// let key = hash_content(b"hello world");
/// assert_eq!(key, hash_content(b"hello world"));
/// assert_ne!(key, hash_content(b"goodbye world"));
/// ```
pub fn hash_content(data: &[u8]) -> Key {
    blake3_digest(data)
}

// ============================================================================
// Textual Encoding
// ============================================================================

/// Render an identifier as 64 lowercase hex characters.
pub fn node_id_to_hex(id: &NodeId) -> String {
    hex::encode(id)
}

/// Parse an identifier from its hex form.
///
/// Shorter inputs are treated as the low-order digits of the 256-bit value,
/// so `"0f"` parses to the identifier whose numeric value is 15. Inputs
/// longer than 64 digits are rejected rather than truncated.
pub fn node_id_from_hex(input: &str) -> Result<NodeId, IdError> {
    let trimmed = input.trim();
    if trimmed.len() > ID_LEN * 2 {
        return Err(IdError::TooLong(trimmed.len()));
    }
    let padded = format!("{:0>width$}", trimmed, width = ID_LEN * 2);
    let bytes = hex::decode(&padded).map_err(|err| IdError::InvalidHex(err.to_string()))?;

    let mut id = [0u8; ID_LEN];
    id.copy_from_slice(&bytes);
    Ok(id)
}

/// Build an identifier whose numeric value is `value`.
///
/// Handy for hand-written topologies where small ids keep distances readable.
pub fn node_id_from_u64(value: u64) -> NodeId {
    let mut id = [0u8; ID_LEN];
    id[ID_LEN - 8..].copy_from_slice(&value.to_be_bytes());
    id
}

/// Short hex prefix used in log fields.
pub(crate) fn short_hex(id: &NodeId) -> String {
    let leading = id.iter().take_while(|byte| **byte == 0).count();
    if leading >= ID_LEN - 4 {
        // Small hand-picked ids read better from the low end.
        hex::encode(&id[ID_LEN - 4..])
    } else {
        hex::encode(&id[..4])
    }
}

// ============================================================================
// Distance Metrics
// ============================================================================

/// Compute the XOR distance between two identifiers.
///
/// # Properties
/// - `xor_distance(a, a) == [0; 32]`
/// - `xor_distance(a, b) == xor_distance(b, a)`
pub fn xor_distance(a: &NodeId, b: &NodeId) -> Distance {
    let mut out = [0u8; ID_LEN];
    for i in 0..ID_LEN {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Compare two XOR distances as unsigned 256-bit integers.
pub fn distance_cmp(a: &Distance, b: &Distance) -> Ordering {
    for i in 0..ID_LEN {
        if a[i] < b[i] {
            return Ordering::Less;
        } else if a[i] > b[i] {
            return Ordering::Greater;
        }
    }
    Ordering::Equal
}

/// Rank two identifiers by closeness to `target`.
///
/// Primary key is the distance to `target`; ties fall back to the identifiers
/// themselves so every peer produces the same order for the same inputs.
pub fn closeness_cmp(target: &NodeId, a: &NodeId, b: &NodeId) -> Ordering {
    let da = xor_distance(a, target);
    let db = xor_distance(b, target);
    distance_cmp(&da, &db).then_with(|| a.cmp(b))
}

/// Find the bucket index for an identifier relative to `self_id`.
///
/// The index is the position of the first differing bit (0..=255), so 0 is
/// the furthest half of the space and 255 the closest.
pub fn bucket_index(self_id: &NodeId, other: &NodeId) -> usize {
    let dist = xor_distance(self_id, other);
    for (byte_idx, byte) in dist.iter().enumerate() {
        if *byte != 0 {
            let leading = byte.leading_zeros() as usize;
            return byte_idx * 8 + leading;
        }
    }
    // identical ids
    ID_BITS - 1
}
