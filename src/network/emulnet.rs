//! Emulated Network
//!
//! A message sent at tick `t` becomes deliverable at `t + 1 + delay`, so no
//! node ever sees a message in the same tick it was sent, whatever order the
//! driver ticks the nodes in.

use super::{Clock, Tick, Transport};
use crate::config::NetworkConfig;
use crate::membership::types::Address;

use dashmap::{DashMap, DashSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

struct Envelope {
    deliver_at: Tick,
    bytes: Vec<u8>,
}

/// Per-address traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetStats {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
}

pub struct EmulNet {
    clock: Arc<dyn Clock>,
    config: NetworkConfig,
    inboxes: DashMap<Address, Vec<Envelope>>,
    stats: DashMap<Address, NetStats>,
    isolated: DashSet<Address>,
    rng: Mutex<StdRng>,
}

impl EmulNet {
    pub fn new(clock: Arc<dyn Clock>, config: NetworkConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            clock,
            config,
            inboxes: DashMap::new(),
            stats: DashMap::new(),
            isolated: DashSet::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Cuts `addr` off: everything it sends or is sent is discarded, and its
    /// pending inbox is cleared.
    pub fn isolate(&self, addr: Address) {
        self.isolated.insert(addr);
        self.inboxes.remove(&addr);
    }

    pub fn is_isolated(&self, addr: &Address) -> bool {
        self.isolated.contains(addr)
    }

    pub fn stats(&self, addr: &Address) -> NetStats {
        self.stats.get(addr).map(|s| *s).unwrap_or_default()
    }

    /// Messages queued for `addr`, deliverable or not.
    pub fn pending(&self, addr: &Address) -> usize {
        self.inboxes.get(addr).map(|q| q.len()).unwrap_or(0)
    }

    fn record_drop(&self, from: Address) {
        self.stats.entry(from).or_default().dropped += 1;
    }
}

impl Transport for EmulNet {
    fn send(&self, from: Address, to: Address, bytes: Vec<u8>) {
        if self.is_isolated(&from) || self.is_isolated(&to) {
            tracing::debug!("Dropping {} -> {}: endpoint isolated", from, to);
            self.record_drop(from);
            return;
        }

        self.stats.entry(from).or_default().sent += 1;

        let (lost, copies, delay) = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let lost = self.config.drop_rate > 0.0 && rng.gen_bool(self.config.drop_rate);
            let copies = if self.config.duplicate_rate > 0.0
                && rng.gen_bool(self.config.duplicate_rate)
            {
                2
            } else {
                1
            };
            let delay = if self.config.max_delay > 0 {
                rng.gen_range(0..=self.config.max_delay)
            } else {
                0
            };
            (lost, copies, delay)
        };

        if lost {
            tracing::debug!("Message {} -> {} lost", from, to);
            self.record_drop(from);
            return;
        }

        let deliver_at = self.clock.now() + 1 + delay;
        let mut inbox = self.inboxes.entry(to).or_default();
        for _ in 0..copies {
            inbox.push(Envelope {
                deliver_at,
                bytes: bytes.clone(),
            });
        }
    }

    fn receive(&self, at: Address) -> Vec<Vec<u8>> {
        if self.is_isolated(&at) {
            return Vec::new();
        }

        let now = self.clock.now();
        let ready: Vec<Vec<u8>> = match self.inboxes.get_mut(&at) {
            Some(mut inbox) => {
                let (ready, waiting): (Vec<Envelope>, Vec<Envelope>) =
                    inbox.drain(..).partition(|env| env.deliver_at <= now);
                *inbox = waiting;
                ready.into_iter().map(|env| env.bytes).collect()
            }
            None => Vec::new(),
        };

        if !ready.is_empty() {
            self.stats.entry(at).or_default().received += ready.len() as u64;
        }
        ready
    }
}
