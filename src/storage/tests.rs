//! Storage Module Tests
//!
//! Validates key placement on the ring and local store semantics.
//!
//! ## Test Scopes
//! - **Ring**: deterministic ordering, replica selection (including the wrap-around and exact
//!   position hits), neighbor lookup.
//! - **LocalStore**: CRUD success and failure cases.

#[cfg(test)]
mod tests {
    use crate::error::StoreError;
    use crate::membership::types::{Address, MemberEntry, MembershipTable};
    use crate::storage::memory::LocalStore;
    use crate::storage::ring::{REPLICATION_FACTOR, RING_SIZE, Ring, hash_position};
    use std::collections::HashSet;

    fn addrs(ids: std::ops::RangeInclusive<u32>) -> Vec<Address> {
        ids.map(|id| Address::new(id, 0)).collect()
    }

    // ============================================================
    // RING TESTS
    // ============================================================

    #[test]
    fn test_hash_position_is_deterministic_and_bounded() {
        assert_eq!(hash_position("book_100"), hash_position("book_100"));
        for i in 0..1000 {
            assert!(hash_position(&format!("key_{}", i)) < RING_SIZE);
        }
    }

    #[test]
    fn test_ring_is_sorted_and_independent_of_input_order() {
        let forward = Ring::build(addrs(1..=8));
        let mut reversed_input = addrs(1..=8);
        reversed_input.reverse();
        let reversed = Ring::build(reversed_input);

        assert_eq!(forward, reversed);
        assert_eq!(forward.len(), 8);
        assert!(
            forward
                .nodes()
                .windows(2)
                .all(|pair| pair[0].position <= pair[1].position),
            "Ring must be sorted by position"
        );
    }

    #[test]
    fn test_ring_ignores_duplicate_addresses() {
        let mut input = addrs(1..=4);
        input.extend(addrs(1..=2));
        let ring = Ring::build(input);
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_ring_from_table_includes_self() {
        let mut table = MembershipTable::new(MemberEntry::new(Address::new(1, 0), 1, 0));
        table.admit(Address::new(2, 0), 1, 0);
        table.admit(Address::new(3, 0), 1, 0);

        let ring = Ring::from_table(&table);
        assert_eq!(ring.len(), 3);
        assert!(ring.contains(&Address::new(1, 0)));
    }

    #[test]
    fn test_find_replicas_needs_three_nodes() {
        assert!(Ring::default().find_replicas("k").is_empty());
        assert!(Ring::build(addrs(1..=2)).find_replicas("k").is_empty());
        assert_eq!(
            Ring::build(addrs(1..=3)).find_replicas("k").len(),
            REPLICATION_FACTOR
        );
    }

    #[test]
    fn test_find_replicas_returns_distinct_consecutive_nodes() {
        let ring = Ring::build(addrs(1..=7));
        let n = ring.len();

        for i in 0..500 {
            let key = format!("key_{}", i);
            let replicas = ring.find_replicas(&key);
            assert_eq!(replicas.len(), REPLICATION_FACTOR);

            let distinct: HashSet<Address> = replicas.iter().map(|r| r.address).collect();
            assert_eq!(distinct.len(), REPLICATION_FACTOR, "Replicas must be distinct for {}", key);

            let start = ring.index_of(&replicas[0].address).unwrap();
            for (offset, replica) in replicas.iter().enumerate() {
                assert_eq!(replica.address, ring.nodes()[(start + offset) % n].address);
            }
        }
    }

    #[test]
    fn test_find_replicas_starts_at_successor_with_wrap_around() {
        let ring = Ring::build(addrs(1..=5));
        let nodes = ring.nodes();

        for i in 0..500 {
            let key = format!("key_{}", i);
            let pos = hash_position(&key);
            let expected = nodes
                .iter()
                .find(|node| pos <= node.position)
                .unwrap_or(&nodes[0]);

            assert_eq!(
                ring.find_replicas(&key)[0].address,
                expected.address,
                "Wrong coordinator for {} at {}",
                key,
                pos
            );
        }
    }

    #[test]
    fn test_key_hashing_exactly_onto_a_node_belongs_to_that_node() {
        let ring = Ring::build(addrs(1..=5));

        for node in ring.nodes() {
            // A key spelled like the address hashes to the node's own position.
            let key = node.address.to_string();
            assert_eq!(hash_position(&key), node.position);
            assert_eq!(ring.find_replicas(&key)[0].address, node.address);
        }
    }

    #[test]
    fn test_neighbors_wrap_around() {
        let ring = Ring::build(addrs(1..=5));
        let nodes = ring.nodes();
        let first = nodes[0].address;
        let last = nodes[4].address;

        let successors: Vec<Address> = ring.successors(&last, 2).iter().map(|n| n.address).collect();
        assert_eq!(successors, vec![nodes[0].address, nodes[1].address]);

        let predecessors: Vec<Address> =
            ring.predecessors(&first, 2).iter().map(|n| n.address).collect();
        assert_eq!(predecessors, vec![nodes[4].address, nodes[3].address]);
    }

    #[test]
    fn test_neighbors_empty_for_small_ring_or_unknown_node() {
        let small = Ring::build(addrs(1..=2));
        assert!(small.successors(&Address::new(1, 0), 1).is_empty());

        let three = Ring::build(addrs(1..=3));
        assert_eq!(three.successors(&Address::new(1, 0), 2).len(), 2);
        assert!(three.successors(&Address::new(1, 0), 3).is_empty());
        assert!(three.predecessors(&Address::new(9, 0), 2).is_empty());
    }

    // ============================================================
    // LOCAL STORE TESTS
    // ============================================================

    #[test]
    fn test_create_then_read() {
        let mut store = LocalStore::new();
        assert!(store.is_empty());

        store.create("k", "v").unwrap();
        assert_eq!(store.read("k"), Some("v"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_create_existing_key_fails_and_keeps_value() {
        let mut store = LocalStore::new();
        store.create("k", "v1").unwrap();

        assert_eq!(
            store.create("k", "v2"),
            Err(StoreError::KeyExists("k".into()))
        );
        assert_eq!(store.read("k"), Some("v1"));
    }

    #[test]
    fn test_update_and_delete_require_existing_key() {
        let mut store = LocalStore::new();

        assert_eq!(
            store.update("missing", "v"),
            Err(StoreError::KeyNotFound("missing".into()))
        );
        assert_eq!(
            store.delete("missing"),
            Err(StoreError::KeyNotFound("missing".into()))
        );
        assert!(store.read("missing").is_none());

        store.create("k", "v1").unwrap();
        store.update("k", "v2").unwrap();
        assert_eq!(store.read("k"), Some("v2"));

        store.delete("k").unwrap();
        assert!(!store.contains("k"));
        assert!(store.delete("k").is_err());
    }

    #[test]
    fn test_keys_are_sorted() {
        let mut store = LocalStore::new();
        for key in ["c", "a", "b"] {
            store.create(key, "v").unwrap();
        }
        assert_eq!(store.keys(), vec!["a", "b", "c"]);
    }
}
