//! External Collaborators: Transport & Clock
//!
//! The core never talks to sockets or reads wall-clock time. It is handed a
//! [`Transport`] to move opaque byte buffers between addresses and a
//! [`Clock`] that reports the current logical tick.
//!
//! ## Provided Implementations
//! - **`SimClock`**: shared tick counter, advanced only by the driver.
//! - **`EmulNet`**: in-process lossy network with per-address inboxes,
//!   configurable delay, drop and duplication, and failure isolation.

pub mod clock;
pub mod emulnet;

#[cfg(test)]
pub(crate) mod mock;

pub use clock::{Clock, SimClock, Tick};
pub use emulnet::{EmulNet, NetStats};

use crate::membership::types::Address;

/// Moves encoded messages between nodes.
///
/// No delivery guarantee: implementations may drop, delay or duplicate.
pub trait Transport: Send + Sync {
    fn send(&self, from: Address, to: Address, bytes: Vec<u8>);

    /// Drains every message currently deliverable to `at`.
    fn receive(&self, at: Address) -> Vec<Vec<u8>>;
}
