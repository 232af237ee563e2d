//! In-memory transport for unit tests: every send is captured and can be
//! inspected or drained as decoded messages.

use super::{Clock, SimClock, Transport};
use crate::audit::AuditLog;
use crate::membership::types::Address;
use crate::node::NodeContext;
use crate::protocol::Message;

use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(Address, Address, Message)>>,
    inboxes: Mutex<Vec<(Address, Vec<u8>)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything sent so far as `(from, to, message)`.
    pub fn take_sent(&self) -> Vec<(Address, Address, Message)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// Messages sent to `to` so far, without draining.
    pub fn sent_to(&self, to: Address) -> Vec<Message> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, dest, _)| *dest == to)
            .map(|(_, _, msg)| msg.clone())
            .collect()
    }

    /// Queues a raw buffer for `at`, as if it arrived from the network.
    pub fn inject(&self, at: Address, bytes: Vec<u8>) {
        self.inboxes.lock().unwrap().push((at, bytes));
    }
}

impl Transport for RecordingTransport {
    fn send(&self, from: Address, to: Address, bytes: Vec<u8>) {
        let msg = Message::decode(&bytes).unwrap();
        self.sent.lock().unwrap().push((from, to, msg));
    }

    fn receive(&self, at: Address) -> Vec<Vec<u8>> {
        let mut inboxes = self.inboxes.lock().unwrap();
        let (mine, rest): (Vec<_>, Vec<_>) = inboxes.drain(..).partition(|(dest, _)| *dest == at);
        *inboxes = rest;
        mine.into_iter().map(|(_, bytes)| bytes).collect()
    }
}

/// A node context wired to fresh test doubles.
pub struct Harness {
    pub transport: Arc<RecordingTransport>,
    pub clock: SimClock,
    pub audit: Arc<AuditLog>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            transport: Arc::new(RecordingTransport::new()),
            clock: SimClock::new(),
            audit: Arc::new(AuditLog::new()),
        }
    }

    pub fn context(&self, address: Address) -> NodeContext {
        NodeContext {
            address,
            transport: self.transport.clone(),
            clock: Arc::new(self.clock.clone()),
            audit: self.audit.clone(),
        }
    }

    /// Advances the shared clock until it reads `tick`.
    pub fn advance_to(&self, tick: u64) {
        while self.clock.now() < tick {
            self.clock.advance();
        }
    }
}
