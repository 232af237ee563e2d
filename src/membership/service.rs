use super::types::{Address, MemberEntry, MembershipTable, Phase};
use crate::audit::AuditEvent;
use crate::config::{GOSSIP_FANOUT, MembershipConfig};
use crate::network::Tick;
use crate::node::NodeContext;
use crate::protocol::Message;

use rand::RngCore;
use rand::seq::SliceRandom;
use tracing::info;

/// Gossip-style membership for one node.
///
/// Owns the local table, bumps the self heartbeat every tick, merges the
/// tables peers gossip to it and purges peers that went quiet.
pub struct MembershipService {
    ctx: NodeContext,
    config: MembershipConfig,
    phase: Phase,
    table: MembershipTable,
    rng: Box<dyn RngCore + Send>,
    last_join_attempt: Option<(Address, Tick)>,
}

impl MembershipService {
    pub fn new(ctx: NodeContext, config: MembershipConfig, rng: Box<dyn RngCore + Send>) -> Self {
        let self_entry = MemberEntry::new(ctx.address, 0, ctx.now());
        Self {
            ctx,
            config,
            phase: Phase::Uninitialized,
            table: MembershipTable::new(self_entry),
            rng,
            last_join_attempt: None,
        }
    }

    pub fn address(&self) -> Address {
        self.ctx.address
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }

    /// Enters the group. The introducer starts it on its own; everyone else
    /// asks the introducer and waits in `Joining`.
    pub fn bootstrap(&mut self, introducer: Address) {
        if self.phase != Phase::Uninitialized {
            tracing::warn!("[{}] bootstrap called twice, ignoring", self.address());
            return;
        }

        let now = self.ctx.now();
        self.table.self_entry_mut().timestamp = now;

        if introducer == self.address() {
            info!("[{}] starting up group as introducer", self.address());
            self.phase = Phase::Active;
        } else {
            info!("[{}] trying to join via {}", self.address(), introducer);
            self.phase = Phase::Joining;
            self.send_join_request(introducer, now);
        }
    }

    pub fn handle(&mut self, msg: Message) {
        if self.phase == Phase::Uninitialized {
            tracing::debug!("[{}] not started, dropping {:?}", self.address(), msg.kind());
            return;
        }

        match msg {
            Message::JoinRequest { from, heartbeat } => self.on_join_request(from, heartbeat),
            Message::JoinReply { members, .. } => self.on_join_reply(&members),
            Message::Heartbeat { members, .. } => self.on_heartbeat(&members),
            other => {
                tracing::warn!(
                    "[{}] membership got a {:?} message, dropping",
                    self.address(),
                    other.kind()
                );
            }
        }
    }

    pub fn on_join_request(&mut self, from: Address, heartbeat: u64) {
        if !self.is_active() {
            tracing::debug!("[{}] not in group yet, ignoring join from {}", self.address(), from);
            return;
        }

        let now = self.ctx.now();
        if self.table.admit(from, heartbeat, now) {
            self.ctx.audit.record(AuditEvent::NodeAdded {
                observer: self.address(),
                member: from,
            });
        }
        info!("[{}] {} joined, group size now {}", self.address(), from, self.table.len());

        let reply = Message::JoinReply {
            from: self.address(),
            members: self.table.entries(),
        };
        self.ctx.send(from, &reply);
    }

    pub fn on_join_reply(&mut self, members: &[MemberEntry]) {
        if self.phase == Phase::Joining {
            info!("[{}] join accepted, {} members known", self.address(), members.len());
            self.phase = Phase::Active;
            self.last_join_attempt = None;
        }
        self.merge(members);
    }

    pub fn on_heartbeat(&mut self, members: &[MemberEntry]) {
        self.merge(members);
    }

    fn merge(&mut self, members: &[MemberEntry]) {
        let now = self.ctx.now();
        for member in self.table.merge(members, now) {
            self.ctx.audit.record(AuditEvent::NodeAdded {
                observer: self.address(),
                member,
            });
        }
    }

    /// Periodic duties: heartbeat, failure detection, gossip.
    pub fn tick(&mut self) {
        match self.phase {
            Phase::Active => {}
            Phase::Joining => {
                self.retry_join();
                return;
            }
            Phase::Uninitialized => return,
        }

        let now = self.ctx.now();
        {
            let me = self.table.self_entry_mut();
            me.heartbeat += 1;
            me.timestamp = now;
        }

        for member in self.table.remove_stale(now, self.config.remove_after) {
            tracing::warn!(
                "[{}] removing {} (silent for {} ticks)",
                self.address(),
                member,
                self.config.remove_after
            );
            self.ctx.audit.record(AuditEvent::NodeRemoved {
                observer: self.address(),
                member,
            });
        }

        self.gossip(now);
    }

    /// Picks up to `GOSSIP_FANOUT` non-suspected peers at random and sends
    /// them every non-suspected entry plus the fresh self entry.
    fn gossip(&mut self, now: Tick) {
        let mut outgoing = self.table.live_peers(now, self.config.suspect_after);
        if outgoing.is_empty() {
            return;
        }

        let targets: Vec<Address> = outgoing
            .choose_multiple(&mut *self.rng, GOSSIP_FANOUT)
            .map(MemberEntry::address)
            .collect();

        outgoing.push(*self.table.self_entry());
        let msg = Message::Heartbeat {
            from: self.address(),
            members: outgoing,
        };

        for target in targets {
            tracing::debug!("[{}] gossiping to {}", self.address(), target);
            self.ctx.send(target, &msg);
        }
    }

    /// A lost JOIN_REQUEST would strand the node; ask again every
    /// `suspect_after` ticks until the reply shows up.
    fn retry_join(&mut self) {
        let now = self.ctx.now();
        if let Some((introducer, sent_at)) = self.last_join_attempt
            && now.saturating_sub(sent_at) >= self.config.suspect_after
        {
            tracing::debug!("[{}] no join reply yet, asking {} again", self.address(), introducer);
            self.send_join_request(introducer, now);
        }
    }

    fn send_join_request(&mut self, introducer: Address, now: Tick) {
        let msg = Message::JoinRequest {
            from: self.address(),
            heartbeat: self.table.self_entry().heartbeat,
        };
        self.ctx.send(introducer, &msg);
        self.last_join_attempt = Some((introducer, now));
    }
}
