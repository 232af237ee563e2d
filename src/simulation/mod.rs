//! Simulation Driver
//!
//! Plays the part of the outside world: owns the logical clock and the
//! emulated network, boots nodes on a join schedule, injects failures and
//! issues client operations.
//!
//! Node `i` (0-based) gets address `i+1:0` and bootstraps at tick
//! `1 + i * join_interval`; node 0 is the introducer.

pub mod handlers;

#[cfg(test)]
mod tests;

use crate::audit::AuditLog;
use crate::config::ClusterConfig;
use crate::error::ConfigError;
use crate::membership::types::{Address, Phase};
use crate::network::{Clock, EmulNet, NetStats, SimClock, Tick};
use crate::node::{ClusterNode, NodeContext};
use crate::replication::transaction::{TransactionId, TransactionIds};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct NodeStats {
    pub address: Address,
    pub phase: Phase,
    pub failed: bool,
    pub members: usize,
    pub ring_size: usize,
    pub keys: usize,
    pub open_transactions: usize,
    pub network: NetStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterStats {
    pub tick: Tick,
    pub live_nodes: usize,
    pub converged: bool,
    pub nodes: Vec<NodeStats>,
}

pub struct Simulation {
    config: ClusterConfig,
    clock: SimClock,
    net: Arc<EmulNet>,
    audit: Arc<AuditLog>,
    nodes: Vec<ClusterNode>,
    booted: Vec<bool>,
}

impl Simulation {
    pub fn new(config: ClusterConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let clock = SimClock::new();
        let net = Arc::new(EmulNet::new(Arc::new(clock.clone()), config.network.clone()));
        let audit = Arc::new(AuditLog::new());
        let ids = TransactionIds::new();

        let nodes: Vec<ClusterNode> = (0..config.simulation.nodes)
            .map(|i| {
                let ctx = NodeContext {
                    address: Self::address_of(i),
                    transport: net.clone(),
                    clock: Arc::new(clock.clone()),
                    audit: audit.clone(),
                };
                let rng = StdRng::seed_from_u64(config.simulation.seed.wrapping_add(i as u64));
                ClusterNode::new(ctx, &config, ids.clone(), Box::new(rng))
            })
            .collect();

        tracing::info!(
            "Simulation ready: {} nodes, introducer {}",
            nodes.len(),
            Self::address_of(0)
        );

        Ok(Self {
            booted: vec![false; nodes.len()],
            config,
            clock,
            net,
            audit,
            nodes,
        })
    }

    pub fn address_of(index: usize) -> Address {
        Address::new(index as u32 + 1, 0)
    }

    pub fn introducer(&self) -> Address {
        Self::address_of(0)
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn audit(&self) -> Arc<AuditLog> {
        self.audit.clone()
    }

    pub fn network(&self) -> &EmulNet {
        &self.net
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn node(&self, addr: &Address) -> Option<&ClusterNode> {
        self.nodes.iter().find(|node| node.address() == *addr)
    }

    fn node_mut(&mut self, addr: &Address) -> Option<&mut ClusterNode> {
        self.nodes.iter_mut().find(|node| node.address() == *addr)
    }

    pub fn live_addresses(&self) -> Vec<Address> {
        self.nodes
            .iter()
            .filter(|node| !node.is_failed())
            .map(ClusterNode::address)
            .collect()
    }

    /// Advances the clock by one tick, boots whoever is due and ticks every
    /// node in address order.
    pub fn step(&mut self) {
        let now = self.clock.advance();
        let introducer = self.introducer();
        let join_interval = self.config.simulation.join_interval;

        for (i, node) in self.nodes.iter_mut().enumerate() {
            if !self.booted[i] && now >= 1 + i as Tick * join_interval {
                node.bootstrap(introducer);
                self.booted[i] = true;
            }
        }

        for node in &mut self.nodes {
            node.tick();
        }
    }

    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Steps until `done` holds or `max_ticks` pass. Returns whether `done`
    /// was reached.
    pub fn run_until(&mut self, max_ticks: u64, done: impl Fn(&Simulation) -> bool) -> bool {
        for _ in 0..max_ticks {
            if done(self) {
                return true;
            }
            self.step();
        }
        done(self)
    }

    /// Silences a node: it stops ticking and the network isolates it.
    pub fn fail_node(&mut self, addr: &Address) -> bool {
        match self.node_mut(addr) {
            Some(node) => {
                node.fail();
                self.net.isolate(*addr);
                true
            }
            None => false,
        }
    }

    /// Every live node is active and sees exactly the set of live nodes.
    pub fn is_converged(&self) -> bool {
        let live: BTreeSet<Address> = self.live_addresses().into_iter().collect();
        self.nodes.iter().filter(|node| !node.is_failed()).all(|node| {
            node.phase() == Phase::Active
                && node
                    .membership()
                    .table()
                    .addresses()
                    .into_iter()
                    .collect::<BTreeSet<_>>()
                    == live
        })
    }

    /// Live nodes whose local store holds `key`.
    pub fn holders(&self, key: &str) -> Vec<Address> {
        self.nodes
            .iter()
            .filter(|node| !node.is_failed() && node.coordinator().store().contains(key))
            .map(ClusterNode::address)
            .collect()
    }

    pub fn create(&mut self, on: &Address, key: &str, value: &str) -> Option<TransactionId> {
        self.live_node_mut(on).map(|node| node.create(key, value))
    }

    pub fn read(&mut self, on: &Address, key: &str) -> Option<TransactionId> {
        self.live_node_mut(on).map(|node| node.read(key))
    }

    pub fn update(&mut self, on: &Address, key: &str, value: &str) -> Option<TransactionId> {
        self.live_node_mut(on).map(|node| node.update(key, value))
    }

    pub fn delete(&mut self, on: &Address, key: &str) -> Option<TransactionId> {
        self.live_node_mut(on).map(|node| node.delete(key))
    }

    fn live_node_mut(&mut self, addr: &Address) -> Option<&mut ClusterNode> {
        self.node_mut(addr).filter(|node| !node.is_failed())
    }

    pub fn stats(&self) -> ClusterStats {
        let nodes = self
            .nodes
            .iter()
            .map(|node| NodeStats {
                address: node.address(),
                phase: node.phase(),
                failed: node.is_failed(),
                members: node.membership().table().len(),
                ring_size: node.ring().len(),
                keys: node.coordinator().store().len(),
                open_transactions: node.coordinator().transactions().len(),
                network: self.net.stats(&node.address()),
            })
            .collect();

        ClusterStats {
            tick: self.now(),
            live_nodes: self.live_addresses().len(),
            converged: self.is_converged(),
            nodes,
        }
    }
}
