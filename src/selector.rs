//! Nearest-peer selection: who to contact next for a target.

use crate::id::{closeness_cmp, distance_cmp, xor_distance, NodeId};
use crate::routing::{Contact, RoutingTable};

/// Sort contacts by closeness to `target`, ties broken by id.
pub fn sort_by_closeness(contacts: &mut [Contact], target: &NodeId) {
    contacts.sort_by(|a, b| closeness_cmp(target, &a.id, &b.id));
}

/// The `k` contacts closest to `target`, with no "closer than me" filter.
///
/// This is what a peer hands back to a FIND_NODE query.
pub fn closest(table: &RoutingTable, target: &NodeId, k: usize) -> Vec<Contact> {
    let mut all = table.all_known_peers();
    sort_by_closeness(&mut all, target);
    all.truncate(k);
    all
}

/// Pick up to `fanout` peers to forward a request for `target` to.
///
/// Candidates are ranked by distance to `target` and only those at least as
/// close as the local peer survive, so every hop moves the traversal no
/// farther from the target. Returns an empty list when the table has no
/// self entry.
pub fn select_nearest(table: &RoutingTable, target: &NodeId, fanout: usize) -> Vec<Contact> {
    let Some(own) = table.self_contact() else {
        return Vec::new();
    };
    let self_distance = xor_distance(&own.id, target);

    let mut candidates = table.all_known_peers();
    sort_by_closeness(&mut candidates, target);

    candidates
        .into_iter()
        .filter(|c| distance_cmp(&xor_distance(&c.id, target), &self_distance).is_le())
        .take(fanout)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{derive_node_id, node_id_from_u64};

    fn contact(n: u64) -> Contact {
        Contact::new(node_id_from_u64(n), format!("node-{n}"))
    }

    fn table(self_id: u64, others: &[u64]) -> RoutingTable {
        let mut table = RoutingTable::new(contact(self_id), 16, 10);
        for n in others {
            table.insert(contact(*n));
        }
        table
    }

    #[test]
    fn picks_closer_peers_in_distance_order() {
        // A=0x0F knows B=0x05 and C=0x0A; target 0x00.
        let a = table(0x0F, &[0x0A, 0x05]);
        let target = node_id_from_u64(0x00);

        let picked = select_nearest(&a, &target, 2);
        let ids: Vec<_> = picked.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![node_id_from_u64(0x05), node_id_from_u64(0x0A)]);
    }

    #[test]
    fn never_returns_farther_peers_or_more_than_fanout() {
        let t = table(0x10, &[0x11, 0x30, 0x15, 0x01, 0x80, 0x16, 0x12, 0x17]);
        let target = node_id_from_u64(0x14);
        let self_distance = xor_distance(&node_id_from_u64(0x10), &target);

        for fanout in 0..6 {
            let picked = select_nearest(&t, &target, fanout);
            assert!(picked.len() <= fanout);
            for c in &picked {
                assert!(distance_cmp(&xor_distance(&c.id, &target), &self_distance).is_le());
            }
        }

        // 0x30 and 0x80 are farther than self and must never show up.
        let all = select_nearest(&t, &target, 100);
        assert!(all.iter().all(|c| c.id != node_id_from_u64(0x30)));
        assert!(all.iter().all(|c| c.id != node_id_from_u64(0x80)));
    }

    #[test]
    fn self_fills_the_last_slot_when_nobody_is_closer() {
        let t = table(0x01, &[0x40, 0x80]);
        let picked = select_nearest(&t, &node_id_from_u64(0x00), 2);
        assert_eq!(picked, vec![contact(0x01)]);
    }

    #[test]
    fn is_deterministic_regardless_of_insertion_order() {
        let ids: Vec<u64> = (1..40).map(|n| n * 7919 % 1024).collect();
        let mut reversed = ids.clone();
        reversed.reverse();

        let forward = table(0x3FF, &ids);
        let backward = table(0x3FF, &reversed);
        let target = node_id_from_u64(0x155);

        let first = select_nearest(&forward, &target, 4);
        assert_eq!(first, select_nearest(&forward, &target, 4));
        assert_eq!(first, select_nearest(&backward, &target, 4));
    }

    #[test]
    fn empty_table_selects_nobody() {
        let t = RoutingTable::empty(16, 10);
        assert!(select_nearest(&t, &derive_node_id(b"x"), 2).is_empty());
    }

    #[test]
    fn closest_ignores_self_distance_filter() {
        let t = table(0x00, &[0x10, 0x20, 0x08]);
        let target = node_id_from_u64(0x18);
        let ids: Vec<_> = closest(&t, &target, 3).iter().map(|c| c.id).collect();
        assert_eq!(
            ids,
            vec![
                node_id_from_u64(0x10),
                node_id_from_u64(0x08),
                node_id_from_u64(0x00)
            ]
        );
    }
}
