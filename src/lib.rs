//! Gossip Membership & Replicated Key-Value Store
//!
//! This library crate defines the modules of a simulated cluster in which
//! every node runs a gossip membership protocol and a consistent-hashing,
//! quorum-replicated key-value store. It serves as the foundation for the
//! binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`membership`**: heartbeat gossip, join via a fixed introducer, timeout-based
//!   suspicion and removal.
//! - **`storage`**: the hash ring that maps keys to replica sets, and the local map each
//!   replica applies operations to.
//! - **`replication`**: client CRUD over three replicas with a 2-of-3 quorum, and the
//!   stabilization pass that restores replica placement after membership changes.
//! - **`protocol`**: the versioned wire format shared by both layers.
//! - **`node`**: one cluster member, ticking all of the above in order.
//! - **`network`**: the transport and clock the nodes are handed, with a lossy
//!   in-process implementation.
//! - **`audit`**: the observational trail of membership changes and operation outcomes.
//! - **`simulation`**: the driver that owns time, boots nodes, injects failures and
//!   exposes the cluster over HTTP.

pub mod audit;
pub mod config;
pub mod error;
pub mod membership;
pub mod network;
pub mod node;
pub mod protocol;
pub mod replication;
pub mod simulation;
pub mod storage;
