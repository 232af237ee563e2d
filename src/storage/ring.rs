//! Consistent-Hashing Ring
//!
//! Node addresses and keys are hashed into the same `RING_SIZE` keyspace. A
//! key belongs to the first node at or after its position (wrapping around)
//! and is replicated on the next two nodes clockwise.

use crate::membership::types::{Address, MembershipTable};

use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const RING_SIZE: u64 = 1 << 32;
pub const REPLICATION_FACTOR: usize = 3;

/// Position of an arbitrary string on the ring.
pub fn hash_position(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() % RING_SIZE
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RingNode {
    pub address: Address,
    pub position: u64,
}

impl RingNode {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            position: hash_position(&address.to_string()),
        }
    }
}

/// Immutable snapshot of node positions, sorted ascending.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Ring {
    nodes: Vec<RingNode>,
}

impl Ring {
    /// Hashes every address and sorts by position. Equal positions are
    /// ordered by address so the result stays deterministic.
    pub fn build(addresses: impl IntoIterator<Item = Address>) -> Self {
        let mut nodes: Vec<RingNode> = addresses.into_iter().map(RingNode::new).collect();
        nodes.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.address.cmp(&b.address))
        });
        nodes.dedup_by_key(|node| node.address);

        for pair in nodes.windows(2) {
            if pair[0].position == pair[1].position {
                tracing::warn!(
                    "Ring position collision at {} between {} and {}",
                    pair[0].position,
                    pair[0].address,
                    pair[1].address
                );
            }
        }

        Self { nodes }
    }

    pub fn from_table(table: &MembershipTable) -> Self {
        Self::build(table.addresses())
    }

    pub fn nodes(&self) -> &[RingNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, addr: &Address) -> Option<usize> {
        self.nodes.iter().position(|node| node.address == *addr)
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.index_of(addr).is_some()
    }

    /// The three nodes responsible for `key`, coordinator first.
    ///
    /// Empty while the ring has fewer than `REPLICATION_FACTOR` members.
    pub fn find_replicas(&self, key: &str) -> Vec<RingNode> {
        let n = self.nodes.len();
        if n < REPLICATION_FACTOR {
            return Vec::new();
        }

        let pos = hash_position(key);
        let first = self.nodes[0].position;
        let last = self.nodes[n - 1].position;

        let start = if pos <= first || pos > last {
            0
        } else {
            self.nodes
                .iter()
                .position(|node| pos <= node.position)
                .unwrap_or(0)
        };

        (0..REPLICATION_FACTOR)
            .map(|offset| self.nodes[(start + offset) % n])
            .collect()
    }

    /// The `count` nodes immediately after `addr`, nearest first.
    pub fn successors(&self, addr: &Address, count: usize) -> Vec<RingNode> {
        self.neighbors(addr, count, |i, step, n| (i + step) % n)
    }

    /// The `count` nodes immediately before `addr`, nearest first.
    pub fn predecessors(&self, addr: &Address, count: usize) -> Vec<RingNode> {
        self.neighbors(addr, count, |i, step, n| (i + n - step) % n)
    }

    /// Neighbors only exist once the ring can hold a full replica set;
    /// smaller rings would wrap onto the node itself.
    fn neighbors(
        &self,
        addr: &Address,
        count: usize,
        walk: impl Fn(usize, usize, usize) -> usize,
    ) -> Vec<RingNode> {
        let n = self.nodes.len();
        if n < REPLICATION_FACTOR || count >= n {
            return Vec::new();
        }
        match self.index_of(addr) {
            Some(i) => (1..=count).map(|step| self.nodes[walk(i, step, n)]).collect(),
            None => Vec::new(),
        }
    }
}
