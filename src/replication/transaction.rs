//! Transactions & Quorum
//!
//! Every client operation opens a transaction on its coordinator. Replies
//! are counted per distinct replica; two of three decide success, and a
//! transaction still short of quorum after `rtt` ticks is declared failed.

use crate::audit::{OpKind, Outcome};
use crate::membership::types::Address;
use crate::network::Tick;
use crate::protocol::Message;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Replies needed out of `REPLICATION_FACTOR` requests.
pub const QUORUM: usize = 2;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct TransactionId(pub i64);

impl TransactionId {
    /// Marks stabilization pushes, which are applied but never acknowledged.
    pub const REPAIR: TransactionId = TransactionId(-1);

    pub fn is_repair(&self) -> bool {
        *self == Self::REPAIR
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cluster-wide source of transaction ids. Clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct TransactionIds {
    next: Arc<AtomicI64>,
}

impl TransactionIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> TransactionId {
        TransactionId(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// An open client operation on its coordinator.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub op: OpKind,
    pub key: String,
    pub value: Option<String>,
    pub issued_at: Tick,
    /// The request as dispatched to the replicas.
    pub request: Message,
    replies: Vec<Message>,
}

impl Transaction {
    pub fn new(
        id: TransactionId,
        op: OpKind,
        key: String,
        value: Option<String>,
        request: Message,
        now: Tick,
    ) -> Self {
        Self {
            id,
            op,
            key,
            value,
            issued_at: now,
            request,
            replies: Vec::new(),
        }
    }

    /// Keeps `reply` unless its sender already answered. Returns whether it
    /// was counted.
    pub fn record_reply(&mut self, reply: Message) -> bool {
        let from = reply.origin();
        if self.replies.iter().any(|seen| seen.origin() == from) {
            tracing::debug!("txn {}: duplicate reply from {}", self.id, from);
            return false;
        }
        self.replies.push(reply);
        true
    }

    pub fn replies(&self) -> &[Message] {
        &self.replies
    }

    pub fn responders(&self) -> Vec<Address> {
        self.replies.iter().map(Message::origin).collect()
    }

    pub fn has_quorum(&self) -> bool {
        self.replies.len() >= QUORUM
    }

    pub fn is_expired(&self, now: Tick, rtt: Tick) -> bool {
        now > self.issued_at + rtt
    }

    /// Value carried by the first READ_REPLY, if any.
    pub fn read_value(&self) -> Option<String> {
        self.replies.iter().find_map(|reply| match reply {
            Message::ReadReply { value, .. } => Some(value.clone()),
            _ => None,
        })
    }
}

/// A transaction that reached a verdict and left the table.
#[derive(Debug, Clone)]
pub struct Decided {
    pub transaction: Transaction,
    pub outcome: Outcome,
}

/// Open transactions of one coordinator, keyed by id.
#[derive(Debug, Default)]
pub struct TransactionTable {
    open: BTreeMap<TransactionId, Transaction>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, transaction: Transaction) {
        self.open.insert(transaction.id, transaction);
    }

    pub fn get(&self, id: &TransactionId) -> Option<&Transaction> {
        self.open.get(id)
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Attaches a REPLY/READ_REPLY to its transaction. Replies for unknown
    /// (already decided) transactions are ignored.
    pub fn record_reply(&mut self, reply: Message) -> bool {
        let Some(id) = reply.txn() else {
            return false;
        };
        match self.open.get_mut(&id) {
            Some(transaction) => transaction.record_reply(reply),
            None => {
                tracing::debug!("reply for closed or unknown txn {}", id);
                false
            }
        }
    }

    /// Decides every transaction that has a quorum or has run out of time,
    /// removing it from the table. Quorum is checked before the deadline.
    pub fn evaluate(&mut self, now: Tick, rtt: Tick) -> Vec<Decided> {
        let ids: Vec<TransactionId> = self.open.keys().copied().collect();
        let mut decided = Vec::new();

        for id in ids {
            let outcome = match self.open.get(&id) {
                Some(t) if t.has_quorum() => Outcome::Success,
                Some(t) if t.is_expired(now, rtt) => Outcome::Failure,
                _ => continue,
            };
            if let Some(transaction) = self.open.remove(&id) {
                decided.push(Decided {
                    transaction,
                    outcome,
                });
            }
        }

        decided
    }
}
