//! Error types.
//!
//! Transport plumbing reports failures through [`anyhow::Result`]; the enums
//! here are the typed outcomes callers are expected to match on.

use crate::id::{node_id_to_hex, Key, NodeId};

/// Rejection of a STORE request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The key failed the configured content-addressing check. Not retryable.
    #[error("key {} failed the integrity check", node_id_to_hex(.key))]
    KeyIntegrityViolation {
        /// The offending key.
        key: Key,
    },
}

/// Failure to reach a peer through the in-process overlay.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The peer did not answer within the request timeout.
    #[error("request to peer {} timed out", node_id_to_hex(.peer))]
    Timeout {
        /// Peer that was addressed.
        peer: NodeId,
    },
    /// No live peer is registered under this id.
    #[error("peer {} is not reachable", node_id_to_hex(.peer))]
    PeerUnavailable {
        /// Peer that was addressed.
        peer: NodeId,
    },
    /// The peer's mailbox closed before a reply arrived.
    #[error("peer {} dropped the request", node_id_to_hex(.peer))]
    Closed {
        /// Peer that was addressed.
        peer: NodeId,
    },
}

/// Failure of a client call made through a [`crate::PeerHandle`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Invalid textual identifier.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// More than 64 hex digits were supplied.
    #[error("identifier has {0} hex digits, at most 64 are allowed")]
    TooLong(usize),
    /// The input is not hexadecimal.
    #[error("identifier is not valid hex: {0}")]
    InvalidHex(String),
}

/// Invalid node configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A numeric setting that must be positive was zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("failed to parse configuration: {0}")]
    /// Malformed JSON or unknown fields.
    Parse(#[from] serde_json::Error),
}
