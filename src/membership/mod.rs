//! Membership & Failure Detection Module
//!
//! Gossip-style membership: every node keeps a table of the peers it knows
//! about, each with a heartbeat counter that only its owner increments.
//!
//! ## Core Mechanisms
//! - **Join**: a new node asks a fixed introducer, which replies with its whole table.
//! - **Anti-Entropy Gossip**: every tick a node sends its table to up to two random,
//!   non-suspected peers; receivers keep the higher heartbeat per member.
//! - **Failure Detection**: a peer whose heartbeat has not grown for `suspect_after` ticks
//!   stops being gossiped to; after `remove_after` ticks it is purged from the table.

pub mod service;
pub mod types;
