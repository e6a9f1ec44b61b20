use xor_dht::{
    derive_node_id, distance_cmp, node_id_from_u64, select_nearest, xor_distance, Contact,
    InsertOutcome, NodeId, RoutingTable,
};

fn make_node_id(byte: u8) -> NodeId {
    let mut id = [0u8; 32];
    id[0] = byte;
    id
}

fn make_contact(byte: u8) -> Contact {
    Contact::new(make_node_id(byte), format!("node-{byte}"))
}

fn small_contact(n: u64) -> Contact {
    Contact::new(node_id_from_u64(n), format!("node-{n}"))
}

#[test]
fn concrete_scenario_prefers_b_then_c() {
    // A=0x0F knows B=0x05 and C=0x0A; target key 0x00.
    let a = small_contact(0x0F);
    let b = small_contact(0x05);
    let c = small_contact(0x0A);
    let target = node_id_from_u64(0x00);

    assert_eq!(xor_distance(&a.id, &target), node_id_from_u64(0x0F));
    assert_eq!(xor_distance(&b.id, &target), node_id_from_u64(0x05));
    assert_eq!(xor_distance(&c.id, &target), node_id_from_u64(0x0A));

    let mut table = RoutingTable::new(a, 16, 10);
    table.insert(c.clone());
    table.insert(b.clone());

    assert_eq!(select_nearest(&table, &target, 2), vec![b, c]);
}

#[test]
fn selection_orders_by_distance_in_the_high_bytes() {
    let mut table = RoutingTable::new(make_contact(0xFF), 4, 4);
    for contact in [make_contact(0x10), make_contact(0x20), make_contact(0x08)] {
        assert_eq!(table.insert(contact), InsertOutcome::Inserted);
    }

    let target = make_node_id(0x18);
    let picked = select_nearest(&table, &target, 3);
    let ids: Vec<u8> = picked.iter().map(|c| c.id[0]).collect();
    assert_eq!(ids, vec![0x10, 0x08, 0x20]);
}

#[test]
fn table_respects_bucket_and_table_capacity() {
    let mut table = RoutingTable::new(make_contact(0x00), 2, 2);

    let outcomes: Vec<InsertOutcome> = [0x80, 0xC0, 0xA0, 0x90]
        .into_iter()
        .map(|byte| table.insert(make_contact(byte)))
        .collect();

    assert_eq!(
        outcomes,
        vec![
            InsertOutcome::Inserted,
            InsertOutcome::Inserted,
            InsertOutcome::Inserted,
            InsertOutcome::Full
        ]
    );
    assert_eq!(table.len(), 4);
    assert_eq!(table.bucket_count(), 2);
    assert!(!table.contains_peer(&make_node_id(0x90)));
}

#[test]
fn selection_never_exceeds_fanout_or_self_distance() {
    let own = derive_node_id(b"self");
    let mut table = RoutingTable::new(Contact::new(own, "self"), 16, 10);
    for i in 0..120u32 {
        table.insert(Contact::new(
            derive_node_id(&i.to_be_bytes()),
            format!("node-{i}"),
        ));
    }

    for t in 0..50u32 {
        let target = derive_node_id(format!("target-{t}").as_bytes());
        let own_distance = xor_distance(&own, &target);
        for fanout in [1, 2, 3, 8] {
            let picked = select_nearest(&table, &target, fanout);
            assert!(picked.len() <= fanout);
            assert!(picked
                .iter()
                .all(|c| distance_cmp(&xor_distance(&c.id, &target), &own_distance).is_le()));
            assert!(picked
                .windows(2)
                .all(|w| distance_cmp(
                    &xor_distance(&w[0].id, &target),
                    &xor_distance(&w[1].id, &target)
                )
                .is_lt()));
            assert_eq!(picked, select_nearest(&table, &target, fanout));
        }
    }
}
