#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Duration};

use xor_dht::protocol::StoreResponse;
use xor_dht::{
    node_id_from_u64, Contact, DhtConfig, DhtNetwork, Key, KeyCheck, NodeId, Peer, VisitedSet,
};

/// Direct in-memory transport: calls the target peer's handlers in place.
#[derive(Clone)]
pub struct TestNetwork {
    registry: Arc<NetworkRegistry>,
    self_contact: Contact,
    latencies: Arc<Mutex<HashMap<NodeId, Duration>>>,
    failures: Arc<Mutex<HashSet<NodeId>>>,
    stores: Arc<Mutex<Vec<(Contact, Key, usize)>>>,
    retrieves: Arc<Mutex<Vec<NodeId>>>,
}

impl TestNetwork {
    pub fn new(registry: Arc<NetworkRegistry>, self_contact: Contact) -> Self {
        Self {
            registry,
            self_contact,
            latencies: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashSet::new())),
            stores: Arc::new(Mutex::new(Vec::new())),
            retrieves: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn set_latency(&self, node: NodeId, latency: Duration) {
        let mut latencies = self.latencies.lock().await;
        latencies.insert(node, latency);
    }

    pub async fn set_failure(&self, node: NodeId, fail: bool) {
        let mut failures = self.failures.lock().await;
        if fail {
            failures.insert(node);
        } else {
            failures.remove(&node);
        }
    }

    pub async fn store_calls(&self) -> Vec<(Contact, Key, usize)> {
        let stores = self.stores.lock().await;
        stores.clone()
    }

    pub async fn retrieve_calls(&self) -> Vec<NodeId> {
        let calls = self.retrieves.lock().await;
        calls.clone()
    }
}

#[derive(Default)]
pub struct NetworkRegistry {
    peers: RwLock<HashMap<NodeId, Peer<TestNetwork>>>,
}

impl NetworkRegistry {
    pub async fn register(&self, peer: &Peer<TestNetwork>) {
        let mut peers = self.peers.write().await;
        peers.insert(peer.node_id(), peer.clone());
    }

    pub async fn get(&self, id: &NodeId) -> Option<Peer<TestNetwork>> {
        let peers = self.peers.read().await;
        peers.get(id).cloned()
    }
}

#[async_trait::async_trait]
impl DhtNetwork for TestNetwork {
    async fn find_node(&self, to: &Contact, target: NodeId) -> Result<Vec<Contact>> {
        if self.should_fail(&to.id).await {
            return Err(anyhow!("injected network failure"));
        }
        self.maybe_sleep(&to.id).await;
        match self.registry.get(&to.id).await {
            Some(peer) => Ok(peer
                .handle_find_node_request(&self.self_contact, target)
                .await),
            None => Err(anyhow!("peer not reachable")),
        }
    }

    async fn store(
        &self,
        to: &Contact,
        key: Key,
        value: Vec<u8>,
        visited: VisitedSet,
    ) -> Result<StoreResponse> {
        if self.should_fail(&to.id).await {
            return Err(anyhow!("injected network failure"));
        }
        self.maybe_sleep(&to.id).await;
        {
            let mut stores = self.stores.lock().await;
            stores.push((to.clone(), key, value.len()));
        }
        match self.registry.get(&to.id).await {
            Some(peer) => Ok(peer
                .handle_store_request(key, value, visited)
                .await
                .into()),
            None => Err(anyhow!("peer not reachable")),
        }
    }

    async fn retrieve(
        &self,
        to: &Contact,
        key: Key,
        visited: VisitedSet,
    ) -> Result<Option<Vec<u8>>> {
        if self.should_fail(&to.id).await {
            return Err(anyhow!("injected network failure"));
        }
        self.maybe_sleep(&to.id).await;
        {
            let mut calls = self.retrieves.lock().await;
            calls.push(to.id);
        }
        match self.registry.get(&to.id).await {
            Some(peer) => Ok(peer.handle_retrieve_request(key, visited).await),
            None => Err(anyhow!("peer not reachable")),
        }
    }

    async fn ping(&self, to: &Contact) -> Result<()> {
        if self.should_fail(&to.id).await {
            return Err(anyhow!("injected network failure"));
        }
        self.maybe_sleep(&to.id).await;
        if self.registry.get(&to.id).await.is_some() {
            Ok(())
        } else {
            Err(anyhow!("peer not reachable"))
        }
    }
}

impl TestNetwork {
    async fn should_fail(&self, node: &NodeId) -> bool {
        let failures = self.failures.lock().await;
        failures.contains(node)
    }

    async fn maybe_sleep(&self, node: &NodeId) {
        let latency = {
            let latencies = self.latencies.lock().await;
            latencies.get(node).copied()
        };
        if let Some(delay) = latency {
            sleep(delay).await;
        }
    }
}

pub struct TestNode {
    pub peer: Peer<TestNetwork>,
    pub network: TestNetwork,
}

impl TestNode {
    pub async fn new(registry: Arc<NetworkRegistry>, index: u64, config: DhtConfig) -> Self {
        let contact = make_contact(index);
        let network = TestNetwork::new(registry.clone(), contact.clone());
        let peer = Peer::new(contact, network.clone(), config);
        registry.register(&peer).await;
        Self { peer, network }
    }

    pub fn contact(&self) -> Contact {
        self.peer.contact()
    }

    pub fn id(&self) -> NodeId {
        self.peer.node_id()
    }
}

/// Settings for hand-built topologies: every key accepted, short timeouts.
pub fn open_config() -> DhtConfig {
    DhtConfig::default()
        .with_key_check(KeyCheck::Disabled)
        .with_request_timeout(Duration::from_millis(500))
}

pub fn make_node_id(index: u64) -> NodeId {
    node_id_from_u64(index)
}

pub fn make_contact(index: u64) -> Contact {
    Contact::new(make_node_id(index), format!("node-{index}"))
}

/// Make `a` and `b` aware of each other.
pub async fn connect(a: &TestNode, b: &TestNode) {
    a.peer.observe_contact(b.contact()).await;
    b.peer.observe_contact(a.contact()).await;
}
