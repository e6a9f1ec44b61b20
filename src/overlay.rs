//! In-process overlay: an arena of peer actors addressed by identifier.
//!
//! Peers never hold each other directly. A routing table stores
//! [`Contact`]s, and [`OverlayNetwork`] resolves a contact to the live actor
//! through the shared arena at call time. A peer that has been removed simply
//! stops resolving, which the traversal treats like any unreachable node.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::actor::{PeerActor, PeerHandle};
use crate::config::DhtConfig;
use crate::error::{ConfigError, NetworkError};
use crate::id::{short_hex, Key, NodeId};
use crate::node::{DhtNetwork, Peer};
use crate::protocol::StoreResponse;
use crate::replication::VisitedSet;
use crate::routing::{Contact, InsertOutcome};

type Arena = Arc<RwLock<HashMap<NodeId, PeerHandle>>>;

/// A set of running peers that can reach each other.
///
/// Cloning an `Overlay` yields another view of the same arena.
#[derive(Clone, Default)]
pub struct Overlay {
    arena: Arena,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a peer with the given contact and settings.
    ///
    /// A peer already registered under the same id is shut down and replaced.
    pub async fn spawn_peer(
        &self,
        contact: Contact,
        config: DhtConfig,
    ) -> Result<PeerHandle, ConfigError> {
        config.validate()?;

        let network = OverlayNetwork {
            arena: self.arena.clone(),
            self_contact: contact.clone(),
            request_timeout: config.request_timeout(),
        };
        let id = contact.id;
        let peer = Peer::new(contact, network, config.clone());
        let handle = PeerActor::spawn(peer, config.mailbox_capacity, config.request_timeout());

        let previous = {
            let mut arena = self.arena.write().await;
            arena.insert(id, handle.clone())
        };
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
        debug!(peer = %short_hex(&id), "peer joined overlay");
        Ok(handle)
    }

    /// Handle to the peer registered under `id`.
    pub async fn peer(&self, id: &NodeId) -> Option<PeerHandle> {
        let arena = self.arena.read().await;
        arena.get(id).cloned()
    }

    /// Teach `from` about `to`. The link is one way.
    pub async fn link(&self, from: &NodeId, to: &NodeId) -> Result<InsertOutcome, NetworkError> {
        let (from_handle, to_contact) = {
            let arena = self.arena.read().await;
            let from_handle = arena
                .get(from)
                .cloned()
                .ok_or(NetworkError::PeerUnavailable { peer: *from })?;
            let to_contact = arena
                .get(to)
                .map(PeerHandle::contact)
                .ok_or(NetworkError::PeerUnavailable { peer: *to })?;
            (from_handle, to_contact)
        };
        from_handle.observe(to_contact).await
    }

    /// Link two peers in both directions.
    pub async fn link_both(&self, a: &NodeId, b: &NodeId) -> Result<(), NetworkError> {
        self.link(a, b).await?;
        self.link(b, a).await?;
        Ok(())
    }

    /// Stop a peer and drop it from the arena. Contacts pointing at it stay
    /// in other routing tables and will fail to resolve.
    pub async fn remove_peer(&self, id: &NodeId) -> bool {
        let removed = {
            let mut arena = self.arena.write().await;
            arena.remove(id)
        };
        match removed {
            Some(handle) => {
                handle.shutdown().await;
                debug!(peer = %short_hex(id), "peer left overlay");
                true
            }
            None => false,
        }
    }

    /// Ids of all registered peers, in ascending order.
    pub async fn peer_ids(&self) -> Vec<NodeId> {
        let arena = self.arena.read().await;
        let mut ids: Vec<NodeId> = arena.keys().copied().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.arena.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop every peer and empty the arena.
    pub async fn shutdown(&self) {
        let handles: Vec<PeerHandle> = {
            let mut arena = self.arena.write().await;
            arena.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.shutdown().await;
        }
    }
}

/// [`DhtNetwork`] that dispatches to peer actors in an [`Overlay`].
#[derive(Clone)]
pub struct OverlayNetwork {
    arena: Arena,
    self_contact: Contact,
    request_timeout: Duration,
}

impl OverlayNetwork {
    async fn resolve(&self, to: &Contact) -> Result<PeerHandle, NetworkError> {
        let arena = self.arena.read().await;
        arena
            .get(&to.id)
            .cloned()
            .map(|handle| handle.with_timeout(self.request_timeout))
            .ok_or(NetworkError::PeerUnavailable { peer: to.id })
    }
}

#[async_trait]
impl DhtNetwork for OverlayNetwork {
    async fn find_node(&self, to: &Contact, target: NodeId) -> Result<Vec<Contact>> {
        let handle = self.resolve(to).await?;
        Ok(handle.find_node(self.self_contact.clone(), target).await?)
    }

    async fn store(
        &self,
        to: &Contact,
        key: Key,
        value: Vec<u8>,
        visited: VisitedSet,
    ) -> Result<StoreResponse> {
        let handle = self.resolve(to).await?;
        Ok(handle.forward_store(key, value, visited).await?)
    }

    async fn retrieve(
        &self,
        to: &Contact,
        key: Key,
        visited: VisitedSet,
    ) -> Result<Option<Vec<u8>>> {
        let handle = self.resolve(to).await?;
        Ok(handle.forward_retrieve(key, visited).await?)
    }

    async fn ping(&self, to: &Contact) -> Result<()> {
        let handle = self.resolve(to).await?;
        Ok(handle.ping(self.self_contact.clone()).await?)
    }
}
