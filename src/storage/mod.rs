//! Storage Module
//!
//! Key placement and the node-local key-value map.
//!
//! ## Core Concepts
//! - **Ring**: node addresses and keys hash into one `2^32` keyspace; `Ring` is an immutable,
//!   sorted snapshot rebuilt from the membership view on every tick.
//! - **Replica Set**: a key lives on the first node at or after its position plus the next two.
//! - **LocalStore**: the plain map each replica applies CRUD operations to. It knows nothing
//!   about placement or quorum.

pub mod memory;
pub mod ring;

#[cfg(test)]
mod tests;
