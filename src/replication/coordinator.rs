//! Replication Coordinator
//!
//! Client-facing CRUD entry points plus the replica-side handlers. A client
//! operation is sent to the key's three replicas and tracked as a
//! [`Transaction`] until a quorum of replies arrives or `rtt` ticks pass.

use super::stabilization::RepairPush;
use super::transaction::{Transaction, TransactionId, TransactionIds, TransactionTable};
use crate::audit::{AuditEvent, OpKind, Outcome, Role};
use crate::config::ReplicationConfig;
use crate::membership::types::Address;
use crate::node::NodeContext;
use crate::protocol::Message;
use crate::storage::memory::LocalStore;
use crate::storage::ring::Ring;

pub struct ReplicationCoordinator {
    ctx: NodeContext,
    config: ReplicationConfig,
    ids: TransactionIds,
    store: LocalStore,
    ring: Ring,
    transactions: TransactionTable,
}

impl ReplicationCoordinator {
    pub fn new(ctx: NodeContext, config: ReplicationConfig, ids: TransactionIds) -> Self {
        Self {
            ctx,
            config,
            ids,
            store: LocalStore::new(),
            ring: Ring::default(),
            transactions: TransactionTable::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.ctx.address
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    /// Installs the ring used by every subsequent operation.
    pub fn set_ring(&mut self, ring: Ring) {
        self.ring = ring;
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn transactions(&self) -> &TransactionTable {
        &self.transactions
    }

    // ============================================================
    // CLIENT SIDE
    // ============================================================

    pub fn create(&mut self, key: &str, value: &str) -> TransactionId {
        self.dispatch(OpKind::Create, key, Some(value), |txn, from| Message::Create {
            txn,
            from,
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn read(&mut self, key: &str) -> TransactionId {
        self.dispatch(OpKind::Read, key, None, |txn, from| Message::Read {
            txn,
            from,
            key: key.to_string(),
        })
    }

    pub fn update(&mut self, key: &str, value: &str) -> TransactionId {
        self.dispatch(OpKind::Update, key, Some(value), |txn, from| Message::Update {
            txn,
            from,
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn delete(&mut self, key: &str) -> TransactionId {
        self.dispatch(OpKind::Delete, key, None, |txn, from| Message::Delete {
            txn,
            from,
            key: key.to_string(),
        })
    }

    /// Opens a transaction and sends the request to every replica of `key`.
    ///
    /// With fewer than three ring members there are no replicas: nothing is
    /// sent and the transaction simply times out.
    fn dispatch(
        &mut self,
        op: OpKind,
        key: &str,
        value: Option<&str>,
        build: impl FnOnce(TransactionId, Address) -> Message,
    ) -> TransactionId {
        let txn = self.ids.next();
        let replicas = self.ring.find_replicas(key);
        let request = build(txn, self.address());

        if replicas.is_empty() {
            tracing::warn!(
                "[{}] {} txn={} key={}: ring has {} members, no replicas available",
                self.address(),
                op,
                txn,
                key,
                self.ring.len()
            );
        }

        self.transactions.open(Transaction::new(
            txn,
            op,
            key.to_string(),
            value.map(str::to_string),
            request.clone(),
            self.ctx.now(),
        ));

        for replica in replicas {
            self.ctx.send(replica.address, &request);
        }

        txn
    }

    // ============================================================
    // REPLICA SIDE
    // ============================================================

    pub fn handle(&mut self, msg: Message) {
        match msg {
            Message::Create {
                txn,
                from,
                key,
                value,
            } => self.on_create(txn, from, key, value),
            Message::Read { txn, from, key } => self.on_read(txn, from, key),
            Message::Update {
                txn,
                from,
                key,
                value,
            } => self.on_update(txn, from, key, value),
            Message::Delete { txn, from, key } => self.on_delete(txn, from, key),
            reply @ (Message::Reply { .. } | Message::ReadReply { .. }) => {
                self.transactions.record_reply(reply);
            }
            other => {
                tracing::warn!(
                    "[{}] storage got a {:?} message, dropping",
                    self.address(),
                    other.kind()
                );
            }
        }
    }

    pub fn on_create(&mut self, txn: TransactionId, from: Address, key: String, value: String) {
        let result = self.store.create(&key, &value);

        if txn.is_repair() {
            match result {
                Ok(()) => {
                    tracing::debug!("[{}] repaired replica of {} from {}", self.address(), key, from);
                }
                Err(e) => {
                    tracing::debug!("[{}] repair push from {} skipped: {}", self.address(), from, e);
                }
            }
            return;
        }

        match result {
            Ok(()) => {
                self.audit_replica(OpKind::Create, txn, &key, Some(value), Outcome::Success);
                let reply = Message::Reply {
                    txn,
                    from: self.address(),
                    key,
                };
                self.ctx.send(from, &reply);
            }
            Err(e) => {
                tracing::debug!("[{}] create failed: {}", self.address(), e);
                self.audit_replica(OpKind::Create, txn, &key, Some(value), Outcome::Failure);
            }
        }
    }

    pub fn on_read(&mut self, txn: TransactionId, from: Address, key: String) {
        match self.store.read(&key).map(str::to_string) {
            Some(value) => {
                self.audit_replica(OpKind::Read, txn, &key, Some(value.clone()), Outcome::Success);
                let reply = Message::ReadReply {
                    txn,
                    from: self.address(),
                    key,
                    value,
                };
                self.ctx.send(from, &reply);
            }
            None => {
                self.audit_replica(OpKind::Read, txn, &key, None, Outcome::Failure);
            }
        }
    }

    pub fn on_update(&mut self, txn: TransactionId, from: Address, key: String, value: String) {
        match self.store.update(&key, &value) {
            Ok(()) => {
                self.audit_replica(OpKind::Update, txn, &key, Some(value), Outcome::Success);
                let reply = Message::Reply {
                    txn,
                    from: self.address(),
                    key,
                };
                self.ctx.send(from, &reply);
            }
            Err(e) => {
                tracing::debug!("[{}] update failed: {}", self.address(), e);
                self.audit_replica(OpKind::Update, txn, &key, Some(value), Outcome::Failure);
            }
        }
    }

    pub fn on_delete(&mut self, txn: TransactionId, from: Address, key: String) {
        match self.store.delete(&key) {
            Ok(()) => {
                self.audit_replica(OpKind::Delete, txn, &key, None, Outcome::Success);
                let reply = Message::Reply {
                    txn,
                    from: self.address(),
                    key,
                };
                self.ctx.send(from, &reply);
            }
            Err(e) => {
                tracing::debug!("[{}] delete failed: {}", self.address(), e);
                self.audit_replica(OpKind::Delete, txn, &key, None, Outcome::Failure);
            }
        }
    }

    // ============================================================
    // QUORUM & REPAIR
    // ============================================================

    /// Closes every transaction that reached quorum or timed out.
    pub fn check_quorum(&mut self) {
        let now = self.ctx.now();
        for decided in self.transactions.evaluate(now, self.config.rtt) {
            let t = decided.transaction;
            let value = match (t.op, decided.outcome) {
                (OpKind::Read, Outcome::Success) => t.read_value(),
                (OpKind::Read, Outcome::Failure) | (OpKind::Delete, _) => None,
                _ => t.value.clone(),
            };

            self.ctx.audit.record(AuditEvent::Operation {
                actor: self.address(),
                role: Role::Coordinator,
                op: t.op,
                txn: t.id,
                key: t.key,
                value,
                outcome: decided.outcome,
            });
        }
    }

    /// Sends stabilization pushes as unacknowledged creates.
    pub fn push_replicas(&self, pushes: Vec<RepairPush>) {
        for push in pushes {
            tracing::debug!("[{}] pushing {} to {}", self.address(), push.key, push.target);
            let msg = Message::Create {
                txn: TransactionId::REPAIR,
                from: self.address(),
                key: push.key,
                value: push.value,
            };
            self.ctx.send(push.target, &msg);
        }
    }

    fn audit_replica(
        &self,
        op: OpKind,
        txn: TransactionId,
        key: &str,
        value: Option<String>,
        outcome: Outcome,
    ) {
        self.ctx.audit.record(AuditEvent::Operation {
            actor: self.address(),
            role: Role::Replica,
            op,
            txn,
            key: key.to_string(),
            value,
            outcome,
        });
    }
}
