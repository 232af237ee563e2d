//! Audit Trail
//!
//! The observational side channel the core reports state transitions to:
//! membership adds and removes, and the outcome of every CRUD operation on
//! both the coordinator and the replica side. The core's behavior never
//! depends on it.

use crate::membership::types::Address;
use crate::replication::transaction::TransactionId;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OpKind {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Create => "create",
            OpKind::Read => "read",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Which side of a transaction produced an event.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    Replica,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum AuditEvent {
    NodeAdded {
        observer: Address,
        member: Address,
    },
    NodeRemoved {
        observer: Address,
        member: Address,
    },
    Operation {
        actor: Address,
        role: Role,
        op: OpKind,
        txn: TransactionId,
        key: String,
        value: Option<String>,
        outcome: Outcome,
    },
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Final state of a coordinator-side transaction.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TxnOutcome {
    pub coordinator: Address,
    pub op: OpKind,
    pub key: String,
    pub outcome: Outcome,
    /// Value observed by a successful read.
    pub value: Option<String>,
}

/// In-memory sink that keeps every event and mirrors it to `tracing`.
///
/// Coordinator outcomes are additionally indexed by transaction id so they
/// can be polled while the simulation keeps running.
#[derive(Default)]
pub struct AuditLog {
    events: Mutex<Vec<AuditEvent>>,
    outcomes: DashMap<TransactionId, TxnOutcome>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn outcome(&self, txn: TransactionId) -> Option<TxnOutcome> {
        self.outcomes.get(&txn).map(|entry| entry.value().clone())
    }

    /// How many times `observer` logged the removal of `member`.
    pub fn removals(&self, observer: Address, member: Address) -> usize {
        self.count(|event| {
            matches!(event, AuditEvent::NodeRemoved { observer: o, member: m }
                if *o == observer && *m == member)
        })
    }

    pub fn additions(&self, observer: Address, member: Address) -> usize {
        self.count(|event| {
            matches!(event, AuditEvent::NodeAdded { observer: o, member: m }
                if *o == observer && *m == member)
        })
    }

    /// Replica-side events for `txn`, in arrival order.
    pub fn replica_events(&self, txn: TransactionId) -> Vec<(Address, Outcome)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|event| match event {
                AuditEvent::Operation {
                    actor,
                    role: Role::Replica,
                    txn: t,
                    outcome,
                    ..
                } if *t == txn => Some((*actor, *outcome)),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&AuditEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| predicate(event))
            .count()
    }
}

impl AuditSink for AuditLog {
    fn record(&self, event: AuditEvent) {
        match &event {
            AuditEvent::NodeAdded { observer, member } => {
                tracing::info!("[{}] member added: {}", observer, member);
            }
            AuditEvent::NodeRemoved { observer, member } => {
                tracing::info!("[{}] member removed: {}", observer, member);
            }
            AuditEvent::Operation {
                actor,
                role,
                op,
                txn,
                key,
                value,
                outcome,
            } => {
                tracing::info!(
                    "[{}] {:?} {} txn={} key={} value={:?} -> {:?}",
                    actor,
                    role,
                    op,
                    txn,
                    key,
                    value,
                    outcome
                );

                if *role == Role::Coordinator {
                    self.outcomes.insert(
                        *txn,
                        TxnOutcome {
                            coordinator: *actor,
                            op: *op,
                            key: key.clone(),
                            outcome: *outcome,
                            value: if *op == OpKind::Read { value.clone() } else { None },
                        },
                    );
                }
            }
        }

        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
