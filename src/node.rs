//! Cluster Node
//!
//! Wires membership, the ring, replication and stabilization together and
//! runs them once per logical tick:
//!
//! 1. drain the inbound queue and handle every message;
//! 2. membership duties (heartbeat, failure detection, gossip);
//! 3. rebuild the ring from the membership view;
//! 4. stabilization against the previous ring;
//! 5. quorum evaluation of open transactions.

use crate::audit::AuditSink;
use crate::config::ClusterConfig;
use crate::membership::service::MembershipService;
use crate::membership::types::{Address, Phase};
use crate::network::{Clock, Tick, Transport};
use crate::protocol::Message;
use crate::replication::coordinator::ReplicationCoordinator;
use crate::replication::stabilization::StabilizationEngine;
use crate::replication::transaction::{TransactionId, TransactionIds};
use crate::storage::ring::Ring;

use rand::RngCore;
use std::sync::Arc;

/// The collaborators a node calls out to, plus its own address.
#[derive(Clone)]
pub struct NodeContext {
    pub address: Address,
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
    pub audit: Arc<dyn AuditSink>,
}

impl NodeContext {
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Encodes and sends `msg`. Encoding failures are logged and the message
    /// is dropped.
    pub fn send(&self, to: Address, msg: &Message) {
        match msg.encode() {
            Ok(bytes) => self.transport.send(self.address, to, bytes),
            Err(e) => {
                tracing::error!("[{}] failed to encode {:?}: {}", self.address, msg.kind(), e);
            }
        }
    }
}

pub struct ClusterNode {
    ctx: NodeContext,
    membership: MembershipService,
    coordinator: ReplicationCoordinator,
    stabilizer: StabilizationEngine,
    failed: bool,
}

impl ClusterNode {
    pub fn new(
        ctx: NodeContext,
        config: &ClusterConfig,
        ids: TransactionIds,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        Self {
            membership: MembershipService::new(ctx.clone(), config.membership.clone(), rng),
            coordinator: ReplicationCoordinator::new(ctx.clone(), config.replication.clone(), ids),
            stabilizer: StabilizationEngine::new(),
            ctx,
            failed: false,
        }
    }

    pub fn address(&self) -> Address {
        self.ctx.address
    }

    pub fn membership(&self) -> &MembershipService {
        &self.membership
    }

    pub fn coordinator(&self) -> &ReplicationCoordinator {
        &self.coordinator
    }

    pub fn stabilizer(&self) -> &StabilizationEngine {
        &self.stabilizer
    }

    pub fn ring(&self) -> &Ring {
        self.coordinator.ring()
    }

    pub fn phase(&self) -> Phase {
        self.membership.phase()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Stops the node for good: it will neither tick nor handle messages.
    pub fn fail(&mut self) {
        tracing::warn!("[{}] node failed", self.address());
        self.failed = true;
    }

    pub fn bootstrap(&mut self, introducer: Address) {
        self.membership.bootstrap(introducer);
    }

    pub fn create(&mut self, key: &str, value: &str) -> TransactionId {
        self.coordinator.create(key, value)
    }

    pub fn read(&mut self, key: &str) -> TransactionId {
        self.coordinator.read(key)
    }

    pub fn update(&mut self, key: &str, value: &str) -> TransactionId {
        self.coordinator.update(key, value)
    }

    pub fn delete(&mut self, key: &str) -> TransactionId {
        self.coordinator.delete(key)
    }

    pub fn tick(&mut self) {
        if self.failed {
            return;
        }

        self.check_messages();
        self.membership.tick();

        if self.membership.is_active() {
            let ring = Ring::from_table(self.membership.table());
            let pushes = self
                .stabilizer
                .stabilize(self.address(), &ring, self.coordinator.store());
            self.coordinator.set_ring(ring);
            self.coordinator.push_replicas(pushes);
        }

        self.coordinator.check_quorum();
    }

    /// Handles every message delivered since the last tick. Undecodable
    /// buffers are dropped.
    fn check_messages(&mut self) {
        for bytes in self.ctx.transport.receive(self.address()) {
            let msg = match Message::decode(&bytes) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("[{}] dropping malformed message: {}", self.address(), e);
                    continue;
                }
            };

            tracing::debug!("[{}] received {:?} from {}", self.address(), msg.kind(), msg.origin());
            if msg.is_membership() {
                self.membership.handle(msg);
            } else {
                self.coordinator.handle(msg);
            }
        }
    }
}
