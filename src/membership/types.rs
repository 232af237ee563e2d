use crate::network::Tick;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Network identity of a node: a numeric identifier plus a port.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct Address {
    pub id: u32,
    pub port: u16,
}

impl Address {
    pub fn new(id: u32, port: u16) -> Self {
        Self { id, port }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.port)
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, port) = s
            .split_once(':')
            .ok_or_else(|| format!("address {s:?} is not of the form <id>:<port>"))?;
        let id = id.parse().map_err(|e| format!("bad node id in {s:?}: {e}"))?;
        let port = port.parse().map_err(|e| format!("bad port in {s:?}: {e}"))?;
        Ok(Self { id, port })
    }
}

/// Lifecycle of the local node in the group.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    /// JOIN_REQUEST sent, waiting for the introducer's reply.
    Joining,
    Active,
}

/// How a peer looks from the local failure detector.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum MemberHealth {
    Alive,
    /// Silent for `suspect_after` ticks: excluded from gossip, still in the ring.
    Suspect,
}

/// One row of a membership table.
///
/// On the wire the timestamp is carried but never trusted: receivers stamp
/// entries with their own clock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberEntry {
    pub id: u32,
    pub port: u16,
    pub heartbeat: u64,
    pub timestamp: Tick,
}

impl MemberEntry {
    pub fn new(addr: Address, heartbeat: u64, timestamp: Tick) -> Self {
        Self {
            id: addr.id,
            port: addr.port,
            heartbeat,
            timestamp,
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.id, self.port)
    }

    /// Ticks since this entry last showed progress.
    pub fn age(&self, now: Tick) -> Tick {
        now.saturating_sub(self.timestamp)
    }

    pub fn health(&self, now: Tick, suspect_after: Tick) -> MemberHealth {
        if self.age(now) >= suspect_after {
            MemberHealth::Suspect
        } else {
            MemberHealth::Alive
        }
    }
}

/// A node's view of the cluster: its own entry plus every known peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipTable {
    self_entry: MemberEntry,
    peers: BTreeMap<Address, MemberEntry>,
}

impl MembershipTable {
    pub fn new(self_entry: MemberEntry) -> Self {
        Self {
            self_entry,
            peers: BTreeMap::new(),
        }
    }

    pub fn self_entry(&self) -> &MemberEntry {
        &self.self_entry
    }

    pub fn self_entry_mut(&mut self) -> &mut MemberEntry {
        &mut self.self_entry
    }

    pub fn local_address(&self) -> Address {
        self.self_entry.address()
    }

    pub fn get(&self, addr: &Address) -> Option<&MemberEntry> {
        if *addr == self.local_address() {
            Some(&self.self_entry)
        } else {
            self.peers.get(addr)
        }
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.get(addr).is_some()
    }

    pub fn peers(&self) -> impl Iterator<Item = &MemberEntry> {
        self.peers.values()
    }

    /// Self entry first, then peers in address order.
    pub fn entries(&self) -> Vec<MemberEntry> {
        std::iter::once(self.self_entry)
            .chain(self.peers.values().copied())
            .collect()
    }

    pub fn addresses(&self) -> Vec<Address> {
        std::iter::once(self.local_address())
            .chain(self.peers.keys().copied())
            .collect()
    }

    /// Number of entries, self included.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.peers.len() + 1
    }

    /// Inserts a peer seen directly (e.g. a join request). Returns `true` when
    /// the peer was not known before.
    pub fn admit(&mut self, addr: Address, heartbeat: u64, now: Tick) -> bool {
        if addr == self.local_address() {
            return false;
        }
        match self.peers.get_mut(&addr) {
            Some(existing) => {
                if heartbeat > existing.heartbeat {
                    existing.heartbeat = heartbeat;
                }
                existing.timestamp = now;
                false
            }
            None => {
                self.peers.insert(addr, MemberEntry::new(addr, heartbeat, now));
                true
            }
        }
    }

    /// Anti-entropy merge of a gossiped table.
    ///
    /// Per identity the higher heartbeat wins; an entry that grows or
    /// appears is stamped with `now`. The local entry is never overwritten.
    /// Returns the addresses that were not known before.
    pub fn merge(&mut self, incoming: &[MemberEntry], now: Tick) -> Vec<Address> {
        let local = self.local_address();
        let mut added = Vec::new();

        for entry in incoming {
            let addr = entry.address();
            if addr == local {
                continue;
            }

            match self.peers.get_mut(&addr) {
                Some(existing) => {
                    if entry.heartbeat > existing.heartbeat {
                        existing.heartbeat = entry.heartbeat;
                        existing.timestamp = now;
                    }
                }
                None => {
                    self.peers
                        .insert(addr, MemberEntry::new(addr, entry.heartbeat, now));
                    added.push(addr);
                }
            }
        }

        added
    }

    /// Drops every peer silent for at least `remove_after` ticks and returns
    /// the removed addresses.
    pub fn remove_stale(&mut self, now: Tick, remove_after: Tick) -> Vec<Address> {
        let stale: Vec<Address> = self
            .peers
            .values()
            .filter(|entry| entry.age(now) >= remove_after)
            .map(MemberEntry::address)
            .collect();

        for addr in &stale {
            self.peers.remove(addr);
        }
        stale
    }

    /// Peers that are not suspected, in address order.
    pub fn live_peers(&self, now: Tick, suspect_after: Tick) -> Vec<MemberEntry> {
        self.peers
            .values()
            .filter(|entry| entry.health(now, suspect_after) == MemberHealth::Alive)
            .copied()
            .collect()
    }
}
