//! RPC message definitions.
//!
//! These are the requests and responses peers exchange. They derive serde so
//! a transport can carry them, but no wire encoding is fixed here; inside an
//! [`crate::Overlay`] they travel as plain values over channels.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::id::{Key, NodeId};
use crate::replication::StoreOutcome;
use crate::routing::Contact;

/// Ping request to check if a peer is responsive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PingRequest {
    /// The sender's contact information.
    pub from: Contact,
}

/// Find the peers closest to a target id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FindNodeRequest {
    /// The sender's contact information.
    pub from: Contact,
    /// The target id to find neighbours for.
    pub target: NodeId,
}

/// Store a key-value pair at a peer and let it flood onward.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreRequest {
    /// The key to store.
    pub key: Key,
    /// The value to store.
    pub value: Vec<u8>,
}

/// Look a key up at a peer, letting it search onward on a miss.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetRequest {
    /// The key to look up.
    pub key: Key,
}

/// Answer to a STORE request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreResponse {
    /// The peer holds the record.
    Stored,
    /// The peer had already been visited by this store.
    Exhausted,
    /// The key failed the peer's integrity check.
    Rejected,
}

impl From<Result<StoreOutcome, StoreError>> for StoreResponse {
    fn from(result: Result<StoreOutcome, StoreError>) -> Self {
        match result {
            Ok(StoreOutcome::Stored) => StoreResponse::Stored,
            Ok(StoreOutcome::Exhausted) => StoreResponse::Exhausted,
            Err(StoreError::KeyIntegrityViolation { .. }) => StoreResponse::Rejected,
        }
    }
}

/// Answer to a GET request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    /// The value if this peer or one it asked holds it.
    pub value: Option<Vec<u8>>,
}
