//! Replicated Storage Module
//!
//! Quorum-based replication on top of the consistent-hashing ring.
//!
//! ## Core Concepts
//! - **Replica Set**: every key lives on the three ring-consecutive nodes starting at its successor.
//! - **Quorum**: a client operation succeeds once 2 of its 3 replicas acknowledge, and fails
//!   when `rtt` ticks pass first. There is no retry and no read repair.
//! - **Stabilization**: after a membership change, nodes push the keys their new neighbors
//!   are missing so every key gets back to three copies.

pub mod coordinator;
pub mod stabilization;
pub mod transaction;
