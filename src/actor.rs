//! One task per peer.
//!
//! Every peer in an [`crate::Overlay`] runs as a [`PeerActor`] that drains a
//! bounded inbox of [`PeerRequest`]s. Each request is handled on its own task,
//! so a peer waiting on downstream replies keeps serving its inbox; this is
//! what lets a traversal come back around a cycle to a busy peer and get its
//! "already visited" answer instead of deadlocking.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::{NetworkError, OverlayError, StoreError};
use crate::id::{short_hex, Key, NodeId};
use crate::node::{DhtNetwork, Peer, TelemetrySnapshot};
use crate::protocol::{
    FindNodeRequest, GetRequest, GetResponse, PingRequest, StoreRequest, StoreResponse,
};
use crate::replication::{StoreOutcome, VisitedSet};
use crate::routing::{Contact, InsertOutcome};

/// Messages a peer actor understands.
#[derive(Debug)]
pub(crate) enum PeerRequest {
    FindNode {
        request: FindNodeRequest,
        reply: oneshot::Sender<Vec<Contact>>,
    },
    Store {
        request: StoreRequest,
        visited: VisitedSet,
        reply: oneshot::Sender<Result<StoreOutcome, StoreError>>,
    },
    Get {
        request: GetRequest,
        visited: VisitedSet,
        reply: oneshot::Sender<GetResponse>,
    },
    Ping {
        request: PingRequest,
        reply: oneshot::Sender<()>,
    },
    Observe {
        contact: Contact,
        reply: oneshot::Sender<InsertOutcome>,
    },
    Telemetry {
        reply: oneshot::Sender<TelemetrySnapshot>,
    },
    Shutdown,
}

/// Drives one [`Peer`] from its inbox.
pub(crate) struct PeerActor<N: DhtNetwork> {
    peer: Peer<N>,
    inbox: mpsc::Receiver<PeerRequest>,
}

impl<N: DhtNetwork> PeerActor<N> {
    /// Spawn the actor on the current runtime and return a handle to it.
    pub(crate) fn spawn(peer: Peer<N>, mailbox_capacity: usize, timeout: Duration) -> PeerHandle {
        let (sender, inbox) = mpsc::channel(mailbox_capacity.max(1));
        let handle = PeerHandle {
            id: peer.node_id(),
            contact: peer.contact(),
            sender,
            timeout,
        };
        let actor = PeerActor { peer, inbox };
        tokio::spawn(actor.run());
        handle
    }

    async fn run(mut self) {
        let id = self.peer.node_id();
        trace!(peer = %short_hex(&id), "actor started");

        while let Some(message) = self.inbox.recv().await {
            if let PeerRequest::Shutdown = message {
                break;
            }
            let peer = self.peer.clone();
            tokio::spawn(async move { dispatch(peer, message).await });
        }

        debug!(peer = %short_hex(&id), "actor stopped");
    }
}

async fn dispatch<N: DhtNetwork>(peer: Peer<N>, message: PeerRequest) {
    // A dropped receiver means the caller gave up; the reply is discarded.
    match message {
        PeerRequest::FindNode { request, reply } => {
            let nodes = peer
                .handle_find_node_request(&request.from, request.target)
                .await;
            let _ = reply.send(nodes);
        }
        PeerRequest::Store {
            request,
            visited,
            reply,
        } => {
            let result = peer
                .handle_store_request(request.key, request.value, visited)
                .await;
            let _ = reply.send(result);
        }
        PeerRequest::Get {
            request,
            visited,
            reply,
        } => {
            let value = peer.handle_retrieve_request(request.key, visited).await;
            let _ = reply.send(GetResponse { value });
        }
        PeerRequest::Ping { request, reply } => {
            trace!(
                peer = %short_hex(&peer.node_id()),
                from = %short_hex(&request.from.id),
                "ping"
            );
            let _ = reply.send(());
        }
        PeerRequest::Observe { contact, reply } => {
            let _ = reply.send(peer.observe_contact(contact).await);
        }
        PeerRequest::Telemetry { reply } => {
            let _ = reply.send(peer.telemetry_snapshot().await);
        }
        PeerRequest::Shutdown => {}
    }
}

/// Cloneable address of a running peer actor.
///
/// Every call is a request/response round trip bounded by the handle's
/// timeout.
#[derive(Clone, Debug)]
pub struct PeerHandle {
    id: NodeId,
    contact: Contact,
    sender: mpsc::Sender<PeerRequest>,
    timeout: Duration,
}

impl PeerHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn contact(&self) -> Contact {
        self.contact.clone()
    }

    /// Same actor, different round-trip timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `false` once the actor has stopped.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> PeerRequest,
    ) -> Result<T, NetworkError> {
        let peer = self.id;
        let (reply, response) = oneshot::channel();
        let round_trip = async {
            self.sender
                .send(build(reply))
                .await
                .map_err(|_| NetworkError::PeerUnavailable { peer })?;
            response.await.map_err(|_| NetworkError::Closed { peer })
        };

        match tokio::time::timeout(self.timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout { peer }),
        }
    }

    /// FIND_NODE on behalf of `from`.
    pub async fn find_node(
        &self,
        from: Contact,
        target: NodeId,
    ) -> Result<Vec<Contact>, NetworkError> {
        self.request(|reply| PeerRequest::FindNode {
            request: FindNodeRequest { from, target },
            reply,
        })
        .await
    }

    /// One hop of a store that is already under way.
    pub async fn forward_store(
        &self,
        key: Key,
        value: Vec<u8>,
        visited: VisitedSet,
    ) -> Result<StoreResponse, NetworkError> {
        let result = self
            .request(|reply| PeerRequest::Store {
                request: StoreRequest { key, value },
                visited,
                reply,
            })
            .await?;
        Ok(StoreResponse::from(result))
    }

    /// One hop of a retrieve that is already under way.
    pub async fn forward_retrieve(
        &self,
        key: Key,
        visited: VisitedSet,
    ) -> Result<Option<Vec<u8>>, NetworkError> {
        let response = self
            .request(|reply| PeerRequest::Get {
                request: GetRequest { key },
                visited,
                reply,
            })
            .await?;
        Ok(response.value)
    }

    /// Start a new store at this peer.
    pub async fn store(&self, key: Key, value: Vec<u8>) -> Result<StoreOutcome, OverlayError> {
        let result = self
            .request(|reply| PeerRequest::Store {
                request: StoreRequest { key, value },
                visited: VisitedSet::new(),
                reply,
            })
            .await?;
        Ok(result?)
    }

    /// Start a new retrieve at this peer.
    pub async fn retrieve(&self, key: Key) -> Result<Option<Vec<u8>>, NetworkError> {
        self.forward_retrieve(key, VisitedSet::new()).await
    }

    pub async fn ping(&self, from: Contact) -> Result<(), NetworkError> {
        self.request(|reply| PeerRequest::Ping {
            request: PingRequest { from },
            reply,
        })
        .await
    }

    /// Add `contact` to this peer's routing table.
    pub async fn observe(&self, contact: Contact) -> Result<InsertOutcome, NetworkError> {
        self.request(|reply| PeerRequest::Observe { contact, reply })
            .await
    }

    pub async fn telemetry(&self) -> Result<TelemetrySnapshot, NetworkError> {
        self.request(|reply| PeerRequest::Telemetry { reply }).await
    }

    /// Ask the actor to stop after the requests already queued.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(PeerRequest::Shutdown).await;
    }
}
