//! Routing table: a peer's bounded view of the overlay.

use crate::id::NodeId;

/// A non-owning reference to another peer: its id plus an address.
///
/// The same peer shows up in many routing tables at once and the overlay may
/// contain cycles, so tables hold contacts and never the peers themselves.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Contact {
    /// The peer's identifier.
    pub id: NodeId,
    /// Transport address. Inside an [`crate::Overlay`] this is only a label.
    pub addr: String,
}

impl Contact {
    pub fn new(id: NodeId, addr: impl Into<String>) -> Self {
        Self {
            id,
            addr: addr.into(),
        }
    }
}

/// Outcome of inserting a contact into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Contact was appended.
    Inserted,
    /// A contact with this id is already present; nothing changed.
    AlreadyKnown,
    /// Every bucket is at capacity.
    Full,
}

/// A capacity-bounded run of contacts, kept in insertion order.
#[derive(Debug, Default, Clone)]
struct Bucket {
    contacts: Vec<Contact>,
}

impl Bucket {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            contacts: Vec::with_capacity(capacity),
        }
    }

    fn is_full(&self, capacity: usize) -> bool {
        self.contacts.len() >= capacity
    }

    fn contains(&self, id: &NodeId) -> bool {
        self.contacts.iter().any(|c| &c.id == id)
    }

    /// Remove a contact, returning true if it was present.
    fn remove(&mut self, id: &NodeId) -> bool {
        if let Some(pos) = self.contacts.iter().position(|c| &c.id == id) {
            self.contacts.remove(pos);
            true
        } else {
            false
        }
    }
}

/// An ordered sequence of buckets.
///
/// The local peer's own contact is always the first entry of the first
/// bucket; lookups use it as the reference point for "closer than me".
/// Buckets are filled in order as contacts arrive and are never split.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    bucket_size: usize,
    max_buckets: usize,
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    /// Create a table seeded with the local peer's contact.
    pub fn new(self_contact: Contact, bucket_size: usize, max_buckets: usize) -> Self {
        let mut table = Self::empty(bucket_size, max_buckets);
        let mut first = Bucket::with_capacity(table.bucket_size);
        first.contacts.push(self_contact);
        table.buckets.push(first);
        table
    }

    /// Create a table with no entries at all, not even self.
    ///
    /// Lookups against such a table select nobody.
    pub fn empty(bucket_size: usize, max_buckets: usize) -> Self {
        Self {
            bucket_size: bucket_size.max(1),
            max_buckets: max_buckets.max(1),
            buckets: Vec::new(),
        }
    }

    /// The designated local peer: first entry of the first non-empty bucket.
    pub fn self_contact(&self) -> Option<&Contact> {
        self.buckets.iter().find_map(|b| b.contacts.first())
    }

    /// Returns `true` if a peer with this id is in the table (self included).
    pub fn contains_peer(&self, id: &NodeId) -> bool {
        self.buckets.iter().any(|b| b.contains(id))
    }

    /// Every known contact, bucket by bucket. Order carries no meaning.
    pub fn all_known_peers(&self) -> Vec<Contact> {
        self.buckets
            .iter()
            .flat_map(|b| b.contacts.iter().cloned())
            .collect()
    }

    /// Append a contact to the last bucket, opening a new one when it is full.
    pub fn insert(&mut self, contact: Contact) -> InsertOutcome {
        if self.contains_peer(&contact.id) {
            return InsertOutcome::AlreadyKnown;
        }

        let needs_bucket = self
            .buckets
            .last()
            .map_or(true, |b| b.is_full(self.bucket_size));
        if needs_bucket {
            if self.buckets.len() >= self.max_buckets {
                return InsertOutcome::Full;
            }
            self.buckets.push(Bucket::with_capacity(self.bucket_size));
        }

        match self.buckets.last_mut() {
            Some(bucket) => {
                bucket.contacts.push(contact);
                InsertOutcome::Inserted
            }
            None => InsertOutcome::Full,
        }
    }

    /// Remove a contact. The local peer's own entry cannot be removed.
    pub fn remove(&mut self, id: &NodeId) -> bool {
        if self.self_contact().map(|c| &c.id) == Some(id) {
            return false;
        }
        let removed = self.buckets.iter_mut().any(|b| b.remove(id));
        if removed {
            self.buckets.retain(|b| !b.contacts.is_empty());
        }
        removed
    }

    /// Number of contacts, self included.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.contacts.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
