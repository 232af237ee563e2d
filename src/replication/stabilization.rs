//! Stabilization
//!
//! After every ring rebuild a node compares its two predecessors (whose keys
//! it replicates) and its two successors (which replicate its keys) against
//! the previous round. Each neighbor that newly appeared is sent the keys it
//! should now hold.
//!
//! Neighbor diffs miss one case: when a coordinator disappears, its keys move
//! to a third node that is nobody's new neighbor. Each key's replica set is
//! therefore also compared between the previous and the current ring, and
//! the first surviving replica hands the key to the nodes that joined it.
//!
//! Replicas this node should no longer hold are kept: nothing is purged.

use crate::membership::types::Address;
use crate::storage::memory::LocalStore;
use crate::storage::ring::{Ring, RingNode};

use std::collections::BTreeSet;

/// Neighbors tracked on each side of the local node.
pub const NEIGHBORS: usize = 2;

/// One key that has to be copied to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairPush {
    pub target: Address,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Default)]
pub struct StabilizationEngine {
    /// Successors from the previous round: they hold this node's keys.
    has_my_replicas: Vec<RingNode>,
    /// Predecessors from the previous round: this node holds their keys.
    had_replicas_of: Vec<RingNode>,
    previous: Ring,
}

impl StabilizationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_my_replicas(&self) -> &[RingNode] {
        &self.has_my_replicas
    }

    pub fn had_replicas_of(&self) -> &[RingNode] {
        &self.had_replicas_of
    }

    /// Updates the neighbor sets for `ring` and returns the pushes needed to
    /// restore placement.
    ///
    /// - a new predecessor receives every local key whose replica set
    ///   includes it;
    /// - a new successor receives every key this node coordinates;
    /// - a node that entered a key's replica set receives it from the first
    ///   replica that was already in the set.
    pub fn stabilize(&mut self, local: Address, ring: &Ring, store: &LocalStore) -> Vec<RepairPush> {
        if *ring == self.previous {
            return Vec::new();
        }
        let previous = std::mem::replace(&mut self.previous, ring.clone());

        let predecessors = ring.predecessors(&local, NEIGHBORS);
        let successors = ring.successors(&local, NEIGHBORS);

        let new_predecessors = appeared(&predecessors, &self.had_replicas_of);
        let new_successors = appeared(&successors, &self.has_my_replicas);

        self.had_replicas_of = predecessors;
        self.has_my_replicas = successors;

        tracing::debug!(
            "[{}] ring changed to {} nodes: new predecessors {:?}, new successors {:?}",
            local,
            ring.len(),
            new_predecessors,
            new_successors
        );

        let mut pushes = Vec::new();
        for (key, value) in store.iter() {
            let replicas: Vec<Address> = ring
                .find_replicas(key)
                .iter()
                .map(|node| node.address)
                .collect();
            let Some(coordinator) = replicas.first() else {
                continue;
            };

            let mut targets: BTreeSet<Address> = new_predecessors
                .iter()
                .filter(|addr| replicas.contains(addr))
                .copied()
                .collect();

            if *coordinator == local {
                targets.extend(
                    new_successors
                        .iter()
                        .filter(|addr| replicas.contains(addr))
                        .copied(),
                );
            }

            let before: Vec<Address> = previous
                .find_replicas(key)
                .iter()
                .map(|node| node.address)
                .collect();
            let senior = replicas.iter().find(|addr| before.contains(addr));
            if senior == Some(&local) {
                targets.extend(replicas.iter().filter(|addr| !before.contains(addr)).copied());
            }

            targets.remove(&local);

            for target in targets {
                pushes.push(RepairPush {
                    target,
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }

        pushes.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.target.cmp(&b.target)));
        pushes
    }
}

fn appeared(current: &[RingNode], previous: &[RingNode]) -> Vec<Address> {
    current
        .iter()
        .filter(|node| !previous.iter().any(|p| p.address == node.address))
        .map(|node| node.address)
        .collect()
}
