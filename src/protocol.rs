//! Wire Protocol
//!
//! Every inter-node datagram is a [`Message`]. Membership variants carry a
//! table snapshot; storage variants carry a transaction id, the originating
//! address, a key and an optional value.
//!
//! ## Encoding
//! `[WIRE_VERSION][bincode(Message)]`. The leading byte lets a receiver reject
//! frames from an incompatible build instead of misreading them.

use crate::error::CodecError;
use crate::membership::types::{Address, MemberEntry};
use crate::replication::transaction::TransactionId;

use serde::{Deserialize, Serialize};

pub const WIRE_VERSION: u8 = 1;

/// Discriminant of a [`Message`], for logging and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    JoinRequest,
    JoinReply,
    Heartbeat,
    Create,
    Read,
    Update,
    Delete,
    Reply,
    ReadReply,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Message {
    /// Sent by a booting node to the introducer.
    JoinRequest { from: Address, heartbeat: u64 },

    /// Introducer's answer, carrying its full table.
    JoinReply {
        from: Address,
        members: Vec<MemberEntry>,
    },

    /// Periodic gossip of the sender's non-suspected peers plus itself.
    Heartbeat {
        from: Address,
        members: Vec<MemberEntry>,
    },

    /// Insert a new key. `txn == TransactionId::REPAIR` marks a stabilization
    /// push that expects no reply.
    Create {
        txn: TransactionId,
        from: Address,
        key: String,
        value: String,
    },

    Read {
        txn: TransactionId,
        from: Address,
        key: String,
    },

    Update {
        txn: TransactionId,
        from: Address,
        key: String,
        value: String,
    },

    Delete {
        txn: TransactionId,
        from: Address,
        key: String,
    },

    /// Acknowledges a successful create, update or delete.
    Reply {
        txn: TransactionId,
        from: Address,
        key: String,
    },

    ReadReply {
        txn: TransactionId,
        from: Address,
        key: String,
        value: String,
    },
}

impl Message {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = vec![WIRE_VERSION];
        bincode::serialize_into(&mut buf, self)?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (version, payload) = bytes.split_first().ok_or(CodecError::Empty)?;
        if *version != WIRE_VERSION {
            return Err(CodecError::UnsupportedVersion(*version));
        }
        Ok(bincode::deserialize(payload)?)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::JoinRequest { .. } => MessageKind::JoinRequest,
            Message::JoinReply { .. } => MessageKind::JoinReply,
            Message::Heartbeat { .. } => MessageKind::Heartbeat,
            Message::Create { .. } => MessageKind::Create,
            Message::Read { .. } => MessageKind::Read,
            Message::Update { .. } => MessageKind::Update,
            Message::Delete { .. } => MessageKind::Delete,
            Message::Reply { .. } => MessageKind::Reply,
            Message::ReadReply { .. } => MessageKind::ReadReply,
        }
    }

    /// Address of the node that produced this message.
    pub fn origin(&self) -> Address {
        match self {
            Message::JoinRequest { from, .. }
            | Message::JoinReply { from, .. }
            | Message::Heartbeat { from, .. }
            | Message::Create { from, .. }
            | Message::Read { from, .. }
            | Message::Update { from, .. }
            | Message::Delete { from, .. }
            | Message::Reply { from, .. }
            | Message::ReadReply { from, .. } => *from,
        }
    }

    pub fn txn(&self) -> Option<TransactionId> {
        match self {
            Message::Create { txn, .. }
            | Message::Read { txn, .. }
            | Message::Update { txn, .. }
            | Message::Delete { txn, .. }
            | Message::Reply { txn, .. }
            | Message::ReadReply { txn, .. } => Some(*txn),
            _ => None,
        }
    }

    pub fn is_membership(&self) -> bool {
        matches!(
            self.kind(),
            MessageKind::JoinRequest | MessageKind::JoinReply | MessageKind::Heartbeat
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(id: u32) -> Address {
        Address::new(id, 0)
    }

    #[test]
    fn test_heartbeat_survives_the_wire() {
        let msg = Message::Heartbeat {
            from: addr(1),
            members: vec![
                MemberEntry::new(addr(1), 10, 4),
                MemberEntry::new(addr(2), 3, 2),
            ],
        };

        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.kind(), MessageKind::Heartbeat);
        assert!(decoded.is_membership());
        assert_eq!(decoded.txn(), None);
    }

    #[test]
    fn test_storage_message_exposes_header() {
        let msg = Message::Update {
            txn: TransactionId(12),
            from: addr(3),
            key: "k1".into(),
            value: "v2".into(),
        };
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();

        assert_eq!(decoded.origin(), addr(3));
        assert_eq!(decoded.txn(), Some(TransactionId(12)));
        assert!(!decoded.is_membership());
    }

    #[test]
    fn test_encoding_starts_with_version() {
        let bytes = Message::JoinRequest {
            from: addr(2),
            heartbeat: 0,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes[0], WIRE_VERSION);
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        assert!(matches!(Message::decode(&[]), Err(CodecError::Empty)));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let mut bytes = Message::JoinRequest {
            from: addr(2),
            heartbeat: 0,
        }
        .encode()
        .unwrap();
        bytes[0] = 99;

        assert!(matches!(
            Message::decode(&bytes),
            Err(CodecError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let bytes = Message::Create {
            txn: TransactionId(1),
            from: addr(1),
            key: "key".into(),
            value: "value".into(),
        }
        .encode()
        .unwrap();

        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(
            Message::decode(truncated),
            Err(CodecError::Payload(_))
        ));
    }
}
