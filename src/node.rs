//! Peers: routing state, local records and the store/retrieve traversal.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::config::DhtConfig;
use crate::error::StoreError;
use crate::id::{bucket_index, distance_cmp, hash_content, short_hex, xor_distance, Key, NodeId};
use crate::protocol::StoreResponse;
use crate::replication::{first_hit, replicate, StoreOutcome, StoreReport, VisitedSet};
use crate::routing::{Contact, InsertOutcome, RoutingTable};
use crate::selector::{closest, select_nearest, sort_by_closeness};
use crate::store::LocalStore;

// ============================================================================
// Network Trait
// ============================================================================

/// Transport abstraction for talking to other peers.
///
/// The traversal logic only ever reaches another peer through this trait, so
/// swapping the in-process [`crate::OverlayNetwork`] for a real transport
/// leaves [`DhtNode`] untouched. Implementations report transport failures as
/// `Err`; the peer's own answer travels inside `Ok`.
#[async_trait]
pub trait DhtNetwork: Send + Sync + 'static {
    /// Send a FIND_NODE RPC asking `to` for the peers it knows closest to `target`.
    async fn find_node(&self, to: &Contact, target: NodeId) -> Result<Vec<Contact>>;

    /// Send a STORE RPC. `to` stores the record and floods it onward,
    /// consulting and extending `visited`.
    async fn store(
        &self,
        to: &Contact,
        key: Key,
        value: Vec<u8>,
        visited: VisitedSet,
    ) -> Result<StoreResponse>;

    /// Send a GET RPC. `to` answers from its records or searches onward.
    async fn retrieve(&self, to: &Contact, key: Key, visited: VisitedSet)
        -> Result<Option<Vec<u8>>>;

    /// Ping a contact to check it is still responsive.
    async fn ping(&self, to: &Contact) -> Result<()>;
}

// ============================================================================
// Telemetry
// ============================================================================

/// Snapshot of a peer's state for diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Number of records held locally.
    pub stored_keys: usize,
    /// Payload bytes held locally.
    pub stored_bytes: usize,
    /// Routing table entries, self included.
    pub known_peers: usize,
    /// Buckets currently open in the routing table.
    pub buckets: usize,
    /// Peers contacted per hop.
    pub fanout: usize,
}

// ============================================================================
// DHT Node
// ============================================================================

/// One peer of the overlay.
///
/// A `DhtNode` owns its routing table and its records and reaches other peers
/// only through its [`DhtNetwork`]. The node is generic over the network so
/// tests can wire peers together directly while the overlay routes through
/// actors.
///
/// # Key Methods
///
/// * [`handle_store_request`](Self::handle_store_request) - one hop of the flooding store
/// * [`handle_retrieve_request`](Self::handle_retrieve_request) - one hop of a lookup
/// * [`handle_find_node_request`](Self::handle_find_node_request) - answer FIND_NODE
/// * [`iterative_find_node`](Self::iterative_find_node) - alpha-parallel node lookup
///
/// Lock order is store before routing whenever both are held.
pub struct DhtNode<N: DhtNetwork> {
    /// This peer's identifier.
    pub id: NodeId,
    /// Contact info for this peer.
    pub self_contact: Contact,
    config: DhtConfig,
    routing: Arc<Mutex<RoutingTable>>,
    store: Arc<Mutex<LocalStore>>,
    network: Arc<N>,
}

impl<N: DhtNetwork> DhtNode<N> {
    /// Create a peer whose routing table initially holds only itself.
    pub fn new(self_contact: Contact, network: N, config: DhtConfig) -> Self {
        let routing = RoutingTable::new(
            self_contact.clone(),
            config.bucket_size,
            config.max_buckets,
        );
        Self {
            id: self_contact.id,
            self_contact,
            config,
            routing: Arc::new(Mutex::new(routing)),
            store: Arc::new(Mutex::new(LocalStore::new())),
            network: Arc::new(network),
        }
    }

    pub fn config(&self) -> &DhtConfig {
        &self.config
    }

    /// Add a contact to the routing table.
    pub async fn observe_contact(&self, contact: Contact) -> InsertOutcome {
        if contact.id == self.id {
            return InsertOutcome::AlreadyKnown;
        }
        let prefix = bucket_index(&self.id, &contact.id);
        let mut rt = self.routing.lock().await;
        let outcome = rt.insert(contact);
        match outcome {
            InsertOutcome::Inserted => {
                trace!(peer = %short_hex(&self.id), shared_prefix = prefix, "contact added");
            }
            InsertOutcome::Full => {
                trace!(peer = %short_hex(&self.id), "routing table full, contact dropped");
            }
            InsertOutcome::AlreadyKnown => {}
        }
        outcome
    }

    /// Drop a contact from the routing table.
    pub async fn forget_contact(&self, id: &NodeId) -> bool {
        let mut rt = self.routing.lock().await;
        rt.remove(id)
    }

    /// Returns `true` if a peer or a stored record with this identifier is
    /// known locally.
    pub async fn contains(&self, key: &Key) -> bool {
        let store = self.store.lock().await;
        if store.contains(key) {
            return true;
        }
        let rt = self.routing.lock().await;
        rt.contains_peer(key)
    }

    /// Look a record up in local storage only.
    pub async fn get_local(&self, key: &Key) -> Option<Vec<u8>> {
        let store = self.store.lock().await;
        store.get(key)
    }

    /// Known contacts, self included.
    pub async fn known_peers(&self) -> Vec<Contact> {
        let rt = self.routing.lock().await;
        rt.all_known_peers()
    }

    /// Peers to forward a request for `target` to.
    async fn nearest(&self, target: &NodeId) -> Vec<Contact> {
        let rt = self.routing.lock().await;
        select_nearest(&rt, target, self.config.fanout)
    }

    /// Insert `(key, value)` unless a record for the key is already held.
    ///
    /// The check and the insert happen under one store lock so concurrent
    /// identical stores produce exactly one record. A key that happens to
    /// name a known peer is still written, so it can be read back.
    async fn store_local(&self, key: Key, value: Vec<u8>) -> bool {
        let mut store = self.store.lock().await;
        store.insert(key, value)
    }

    /// Handle an incoming FIND_NODE RPC request.
    ///
    /// Records the caller and answers with the closest contacts we know,
    /// up to one bucket's worth.
    pub async fn handle_find_node_request(&self, from: &Contact, target: NodeId) -> Vec<Contact> {
        self.observe_contact(from.clone()).await;
        let rt = self.routing.lock().await;
        closest(&rt, &target, self.config.bucket_size)
    }

    /// Handle one hop of a store.
    ///
    /// 1. Reject keys that fail the configured [`crate::KeyCheck`].
    /// 2. Stop with [`StoreOutcome::Exhausted`] if this peer was already visited.
    /// 3. Stop with [`StoreOutcome::Stored`] if the key is already known here.
    /// 4. Otherwise write locally and flood to the nearest peers.
    ///
    /// Downstream failures never change the result once the local write is done.
    pub async fn handle_store_request(
        &self,
        key: Key,
        value: Vec<u8>,
        visited: VisitedSet,
    ) -> Result<StoreOutcome, StoreError> {
        self.store_hop(key, value, &visited)
            .await
            .map(|(outcome, _)| outcome)
    }

    async fn store_hop(
        &self,
        key: Key,
        value: Vec<u8>,
        visited: &VisitedSet,
    ) -> Result<(StoreOutcome, StoreReport), StoreError> {
        if !self.config.key_check.accepts(&key, &value) {
            debug!(
                peer = %short_hex(&self.id),
                key = %short_hex(&key),
                check = ?self.config.key_check,
                "store rejected"
            );
            return Err(StoreError::KeyIntegrityViolation { key });
        }

        if !visited.mark(&self.id) {
            trace!(peer = %short_hex(&self.id), key = %short_hex(&key), "already visited");
            return Ok((StoreOutcome::Exhausted, StoreReport::default()));
        }

        if !self.store_local(key, value.clone()).await {
            trace!(peer = %short_hex(&self.id), key = %short_hex(&key), "key already known");
            return Ok((StoreOutcome::Stored, StoreReport::default()));
        }

        let targets = self.nearest(&key).await;
        let report = replicate(
            self.network.as_ref(),
            &targets,
            key,
            &value,
            visited,
            self.config.replication_timeout(),
        )
        .await;

        debug!(
            peer = %short_hex(&self.id),
            key = %short_hex(&key),
            forwarded = targets.len(),
            stored = report.stored,
            failed = report.failed,
            "stored locally"
        );
        Ok((StoreOutcome::Stored, report))
    }

    /// Handle one hop of a retrieve.
    ///
    /// Returns `None` on a revisit or when no peer reachable through the
    /// nearest-peer graph holds the key. An empty stored value comes back as
    /// `Some(vec![])`.
    pub async fn handle_retrieve_request(&self, key: Key, visited: VisitedSet) -> Option<Vec<u8>> {
        if !visited.mark(&self.id) {
            trace!(peer = %short_hex(&self.id), key = %short_hex(&key), "already visited");
            return None;
        }

        if let Some(value) = self.get_local(&key).await {
            trace!(peer = %short_hex(&self.id), key = %short_hex(&key), "local hit");
            return Some(value);
        }

        let targets = self.nearest(&key).await;
        first_hit(
            self.network.as_ref(),
            &targets,
            key,
            &visited,
            self.config.request_timeout(),
        )
        .await
    }

    /// Store `(key, value)` starting at this peer.
    pub async fn store(&self, key: Key, value: Vec<u8>) -> Result<StoreOutcome, StoreError> {
        self.handle_store_request(key, value, VisitedSet::new())
            .await
    }

    /// Like [`store`](Self::store) but also reports what happened to the first
    /// hop's downstream branches.
    pub async fn store_with_report(
        &self,
        key: Key,
        value: Vec<u8>,
    ) -> Result<(StoreOutcome, StoreReport), StoreError> {
        self.store_hop(key, value, &VisitedSet::new()).await
    }

    /// Store a value under its content hash, returning the key.
    pub async fn put(&self, value: Vec<u8>) -> Result<Key, StoreError> {
        let key = hash_content(&value);
        self.store(key, value).await?;
        Ok(key)
    }

    /// Retrieve the value for `key` starting at this peer.
    pub async fn retrieve(&self, key: Key) -> Option<Vec<u8>> {
        self.handle_retrieve_request(key, VisitedSet::new()).await
    }

    /// Ping a contact, dropping it from the routing table if it does not answer.
    pub async fn probe(&self, contact: &Contact) -> bool {
        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, self.network.ping(contact)).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                debug!(peer = %short_hex(&contact.id), "ping failed: {err:?}");
                self.forget_contact(&contact.id).await;
                false
            }
            Err(_) => {
                debug!(peer = %short_hex(&contact.id), "ping timed out");
                self.forget_contact(&contact.id).await;
                false
            }
        }
    }

    /// Perform an iterative FIND_NODE lookup for `target`.
    ///
    /// 1. Seed the shortlist with the closest contacts we know
    /// 2. Query up to `fanout` unqueried contacts in parallel
    /// 3. Merge the answers, re-sort, keep one bucket's worth
    /// 4. Repeat until a round brings nothing closer
    ///
    /// Contacts learned along the way are added to the routing table. The
    /// local peer never appears in the result.
    pub async fn iterative_find_node(&self, target: NodeId) -> Result<Vec<Contact>> {
        let k = self.config.bucket_size;
        let alpha = self.config.fanout;
        let timeout = self.config.request_timeout();

        let mut queried: HashSet<NodeId> = HashSet::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        seen.insert(self.id);

        let mut shortlist: Vec<Contact> = {
            let rt = self.routing.lock().await;
            closest(&rt, &target, k + 1)
        };
        shortlist.retain(|c| c.id != self.id);
        shortlist.truncate(k);
        for c in &shortlist {
            seen.insert(c.id);
        }

        let mut best_distance = shortlist
            .first()
            .map(|c| xor_distance(&c.id, &target))
            .unwrap_or([0xff; 32]);

        loop {
            let candidates: Vec<Contact> = shortlist
                .iter()
                .filter(|c| !queried.contains(&c.id))
                .take(alpha)
                .cloned()
                .collect();

            if candidates.is_empty() {
                break;
            }
            for c in &candidates {
                queried.insert(c.id);
            }

            let network = self.network.as_ref();
            let responses = join_all(candidates.iter().map(|contact| async move {
                let response =
                    tokio::time::timeout(timeout, network.find_node(contact, target)).await;
                (contact, response)
            }))
            .await;

            for (contact, response) in responses {
                match response {
                    Ok(Ok(nodes)) => {
                        for n in nodes {
                            if seen.insert(n.id) {
                                shortlist.push(n.clone());
                            }
                            self.observe_contact(n).await;
                        }
                    }
                    Ok(Err(err)) => {
                        debug!(peer = %short_hex(&contact.id), "find_node failed: {err:?}");
                    }
                    Err(_) => {
                        debug!(peer = %short_hex(&contact.id), "find_node timed out");
                    }
                }
            }

            sort_by_closeness(&mut shortlist, &target);
            shortlist.truncate(k);

            let mut any_closer = false;
            if let Some(first) = shortlist.first() {
                let new_best = xor_distance(&first.id, &target);
                if distance_cmp(&new_best, &best_distance).is_lt() {
                    best_distance = new_best;
                    any_closer = true;
                }
            }

            if !any_closer {
                break;
            }
        }

        Ok(shortlist)
    }

    /// Get a snapshot of current node state for telemetry.
    pub async fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        let (stored_keys, stored_bytes) = {
            let store = self.store.lock().await;
            (store.len(), store.bytes())
        };
        let rt = self.routing.lock().await;
        TelemetrySnapshot {
            stored_keys,
            stored_bytes,
            known_peers: rt.len(),
            buckets: rt.bucket_count(),
            fanout: self.config.fanout,
        }
    }
}

// ============================================================================
// Peer (Public API)
// ============================================================================

/// Cloneable handle to a [`DhtNode`].
///
/// This is the contract a peer exposes to the rest of the overlay and to
/// applications: store, retrieve, FIND_NODE, plus the handlers a transport
/// calls when a request arrives.
///
/// # Example
///
/// ```ignore
/// let peer = Peer::new(contact, network, DhtConfig::default());
/// peer.observe_contact(neighbour).await;
/// peer.store(key, value).await?;
/// let value = peer.retrieve(key).await;
/// ```
pub struct Peer<N: DhtNetwork> {
    inner: Arc<DhtNode<N>>,
}

impl<N: DhtNetwork> Clone for Peer<N> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<N: DhtNetwork> Peer<N> {
    pub fn new(self_contact: Contact, network: N, config: DhtConfig) -> Self {
        Self {
            inner: Arc::new(DhtNode::new(self_contact, network, config)),
        }
    }

    /// Get this peer's contact information.
    pub fn contact(&self) -> Contact {
        self.inner.self_contact.clone()
    }

    /// Get this peer's identifier.
    pub fn node_id(&self) -> NodeId {
        self.inner.id
    }

    /// Access the underlying node.
    pub fn node(&self) -> &DhtNode<N> {
        &self.inner
    }

    pub async fn observe_contact(&self, contact: Contact) -> InsertOutcome {
        self.inner.observe_contact(contact).await
    }

    pub async fn contains(&self, key: &Key) -> bool {
        self.inner.contains(key).await
    }

    pub async fn store(&self, key: Key, value: Vec<u8>) -> Result<StoreOutcome, StoreError> {
        self.inner.store(key, value).await
    }

    pub async fn store_with_report(
        &self,
        key: Key,
        value: Vec<u8>,
    ) -> Result<(StoreOutcome, StoreReport), StoreError> {
        self.inner.store_with_report(key, value).await
    }

    pub async fn put(&self, value: Vec<u8>) -> Result<Key, StoreError> {
        self.inner.put(value).await
    }

    pub async fn retrieve(&self, key: Key) -> Option<Vec<u8>> {
        self.inner.retrieve(key).await
    }

    pub async fn iterative_find_node(&self, target: NodeId) -> Result<Vec<Contact>> {
        self.inner.iterative_find_node(target).await
    }

    pub async fn handle_find_node_request(&self, from: &Contact, target: NodeId) -> Vec<Contact> {
        self.inner.handle_find_node_request(from, target).await
    }

    pub async fn handle_store_request(
        &self,
        key: Key,
        value: Vec<u8>,
        visited: VisitedSet,
    ) -> Result<StoreOutcome, StoreError> {
        self.inner.handle_store_request(key, value, visited).await
    }

    pub async fn handle_retrieve_request(&self, key: Key, visited: VisitedSet) -> Option<Vec<u8>> {
        self.inner.handle_retrieve_request(key, visited).await
    }

    pub async fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.inner.telemetry_snapshot().await
    }
}
