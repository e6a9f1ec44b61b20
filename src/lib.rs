//! # xor-dht
//!
//! An in-memory distributed key/value overlay built on the XOR distance
//! metric. Each peer holds a bounded routing table of other peers; a store
//! floods the record towards the peers nearest to its key, and a retrieve
//! walks the same nearest-peer graph until somebody answers.
//!
//! The crate is split into a handful of modules:
//!
//! - [`id`]: identifiers, BLAKE3 hashing and the XOR distance ordering.
//! - [`routing`]: the bucketed [`RoutingTable`] and [`Contact`].
//! - [`selector`]: [`select_nearest`], the "who do I ask next" rule.
//! - [`replication`]: the per-operation [`VisitedSet`] and store/retrieve
//!   fan-out.
//! - [`node`]: [`DhtNode`] / [`Peer`] and the [`DhtNetwork`] transport seam.
//! - [`overlay`]: an arena of peer actors talking over channels, the
//!   in-process stand-in for a real network.
//! - [`protocol`]: FIND_NODE / STORE / GET / PING message types.
//! - [`config`]: [`DhtConfig`] and the [`KeyCheck`] policy.
//!
//! ## Getting started
//!
//! ```no_run
//! use xor_dht::{node_id_from_u64, Contact, DhtConfig, KeyCheck, Overlay};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let overlay = Overlay::new();
//! let config = DhtConfig::default().with_key_check(KeyCheck::ValueDigest);
//!
//! let a = overlay
//!     .spawn_peer(Contact::new(node_id_from_u64(1), "a"), config.clone())
//!     .await?;
//! let b = overlay
//!     .spawn_peer(Contact::new(node_id_from_u64(2), "b"), config)
//!     .await?;
//! overlay.link_both(&a.id(), &b.id()).await?;
//!
//! let value = b"hello".to_vec();
//! let key = xor_dht::hash_content(&value);
//! a.store(key, value).await?;
//! assert!(b.retrieve(key).await?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod error;
pub mod id;
pub mod node;
pub mod overlay;
pub mod protocol;
pub mod replication;
pub mod routing;
pub mod selector;
mod store;

pub use actor::PeerHandle;
pub use config::{DhtConfig, KeyCheck};
pub use error::{ConfigError, IdError, NetworkError, OverlayError, StoreError};
pub use id::{
    closeness_cmp, derive_node_id, distance_cmp, hash_content, node_id_from_hex, node_id_from_u64,
    node_id_to_hex, xor_distance, Distance, Key, NodeId,
};
pub use node::{DhtNetwork, DhtNode, Peer, TelemetrySnapshot};
pub use overlay::{Overlay, OverlayNetwork};
pub use replication::{StoreOutcome, StoreReport, VisitedSet};
pub use routing::{Contact, InsertOutcome, RoutingTable};
pub use selector::select_nearest;
