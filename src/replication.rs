//! Traversal bookkeeping for store and retrieve.
//!
//! A store floods the record to the nearest peers of every hop; a retrieve
//! walks the same nearest-peer graph until some peer answers with the value.
//! Both share a [`VisitedSet`] across every branch of one operation, which is
//! what makes them terminate on a cyclic overlay.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, trace, warn};

use crate::id::{short_hex, Key, NodeId};
use crate::node::DhtNetwork;
use crate::protocol::StoreResponse;
use crate::routing::Contact;

/// Peers already contacted by one store or retrieve.
///
/// Clones share the same set. [`mark`](Self::mark) is an atomic
/// check-and-insert, so two concurrent branches can never both proceed past
/// the same peer.
#[derive(Clone, Debug, Default)]
pub struct VisitedSet {
    inner: Arc<Mutex<HashSet<NodeId>>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<NodeId>> {
        // The set stays consistent even if a holder panicked mid-insert.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Mark `id` as visited. Returns `true` if this call was the first to do so.
    pub fn mark(&self, id: &NodeId) -> bool {
        self.lock().insert(*id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.lock().contains(id)
    }

    /// Number of peers visited so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Successful result of a store at one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The record is held locally, either freshly written or already present.
    Stored,
    /// The peer was already visited by this operation; nothing was done.
    Exhausted,
}

/// What happened to the downstream branches of one store hop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreReport {
    /// Branches that ended with the record stored.
    pub stored: usize,
    /// Branches that hit an already visited peer.
    pub exhausted: usize,
    /// Branches that rejected the key.
    pub rejected: usize,
    /// Branches lost to transport errors or timeouts.
    pub failed: usize,
}

impl StoreReport {
    fn record(&mut self, response: StoreResponse) {
        match response {
            StoreResponse::Stored => self.stored += 1,
            StoreResponse::Exhausted => self.exhausted += 1,
            StoreResponse::Rejected => self.rejected += 1,
        }
    }

    /// Total number of branches attempted.
    pub fn attempted(&self) -> usize {
        self.stored + self.exhausted + self.rejected + self.failed
    }
}

/// Forward a store to every target concurrently and wait for all of them.
///
/// Each branch is bounded by `timeout`. Failures are logged and counted but
/// never propagated; replication past the local write is advisory.
pub(crate) async fn replicate<N: DhtNetwork>(
    network: &N,
    targets: &[Contact],
    key: Key,
    value: &[u8],
    visited: &VisitedSet,
    timeout: Duration,
) -> StoreReport {
    let branches = targets.iter().map(|contact| {
        let visited = visited.clone();
        let value = value.to_vec();
        async move {
            let result =
                tokio::time::timeout(timeout, network.store(contact, key, value, visited)).await;
            (contact, result)
        }
    });

    let mut report = StoreReport::default();
    for (contact, result) in join_all(branches).await {
        match result {
            Ok(Ok(response)) => {
                trace!(peer = %short_hex(&contact.id), ?response, "store branch finished");
                report.record(response);
            }
            Ok(Err(err)) => {
                debug!(peer = %short_hex(&contact.id), "store branch failed: {err:?}");
                report.failed += 1;
            }
            Err(_) => {
                warn!(
                    peer = %short_hex(&contact.id),
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "store branch timed out"
                );
                report.failed += 1;
            }
        }
    }
    report
}

/// Ask every target concurrently and return the first value any of them finds.
///
/// Remaining branches are dropped as soon as one answers with a value. A
/// branch that errors or outlives `timeout` counts as "not found".
pub(crate) async fn first_hit<N: DhtNetwork>(
    network: &N,
    targets: &[Contact],
    key: Key,
    visited: &VisitedSet,
    timeout: Duration,
) -> Option<Vec<u8>> {
    let mut pending: FuturesUnordered<_> = targets
        .iter()
        .map(|contact| {
            let visited = visited.clone();
            async move {
                let result =
                    tokio::time::timeout(timeout, network.retrieve(contact, key, visited)).await;
                (contact, result)
            }
        })
        .collect();

    while let Some((contact, result)) = pending.next().await {
        match result {
            Ok(Ok(Some(value))) => {
                trace!(peer = %short_hex(&contact.id), "retrieve branch hit");
                return Some(value);
            }
            Ok(Ok(None)) => {}
            Ok(Err(err)) => {
                debug!(peer = %short_hex(&contact.id), "retrieve branch failed: {err:?}");
            }
            Err(_) => {
                debug!(
                    peer = %short_hex(&contact.id),
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "retrieve branch timed out"
                );
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_first_writer_wins() {
        let visited = VisitedSet::new();
        let id = [9u8; 32];

        assert!(visited.mark(&id));
        assert!(!visited.mark(&id));
        assert!(visited.contains(&id));
        assert_eq!(visited.len(), 1);
    }

    #[test]
    fn clones_share_state() {
        let visited = VisitedSet::new();
        let other = visited.clone();
        assert!(other.mark(&[1u8; 32]));
        assert!(!visited.mark(&[1u8; 32]));
    }

    #[test]
    fn concurrent_marks_admit_exactly_one() {
        let visited = VisitedSet::new();
        let id = [4u8; 32];
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let visited = visited.clone();
                std::thread::spawn(move || visited.mark(&id))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("thread finished"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn report_counts_responses() {
        let mut report = StoreReport::default();
        report.record(StoreResponse::Stored);
        report.record(StoreResponse::Exhausted);
        report.record(StoreResponse::Rejected);
        report.failed += 1;
        assert_eq!(report.attempted(), 4);
    }
}
