//! Node Process - the per-node event loop.
//!
//! Each tick does exactly one unit of work and exactly one clock update:
//!
//! ```text
//!            ┌──────────── sleep(1 / tick_rate) ◄────────────┐
//!            ▼                                               │
//!  ┌──── inbox empty? ────┐                                  │
//!  │ no                   │ yes: r = roll(1, 10)             │
//!  ▼                      ▼                                  │
//! RECEIVE            r=1  send peers[0]   ┐                  │
//! max(c, m) + 1      r=2  send peers[1]   ├─ SEND  c + 1     │
//!  │                 r=3  send all peers  ┘                  │
//!  │                 r≥4  INTERNAL c + 1                     │
//!  └─────────────────────────┴──────── emit record ──────────┘
//! ```
//!
//! The clock is owned by the loop and never touched by the serving side;
//! the inbox is the only state shared with the `MessageServer`.

use crate::clock::LogicalClock;
use crate::config::NodeConfig;
use crate::event::EventRecord;
use crate::inbox::{Inbox, InboxEntry};
use crate::logger::EventLogger;
use crate::peers::PeerTable;
use crate::server::MessageServer;

use lamport_env::{Message, NodeContext, NodeId, PeerAddress, PeerLink};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Inclusive range of the branch roll.
pub const ROLL_RANGE: (u32, u32) = (1, 10);

/// What an idle tick does, decided by one roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// r = 1
    SendFirst,
    /// r = 2
    SendSecond,
    /// r = 3
    SendAll,
    /// r = 4..=10
    Internal,
}

impl Branch {
    /// Maps a roll in `ROLL_RANGE` to its branch.
    pub fn from_roll(roll: u32) -> Self {
        match roll {
            1 => Branch::SendFirst,
            2 => Branch::SendSecond,
            3 => Branch::SendAll,
            _ => Branch::Internal,
        }
    }

    /// Peers this branch addresses, in table order.
    pub fn targets(&self, peers: &PeerTable) -> Vec<PeerAddress> {
        match self {
            Branch::SendFirst => peers.get(0).cloned().into_iter().collect(),
            Branch::SendSecond => peers.get(1).cloned().into_iter().collect(),
            Branch::SendAll => peers.all().to_vec(),
            Branch::Internal => Vec::new(),
        }
    }
}

/// Counters kept by the event loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Ticks executed
    pub ticks: u64,

    /// INTERNAL events
    pub internal_events: u64,

    /// SEND events (one per tick, however many peers)
    pub send_events: u64,

    /// Individual messages attempted
    pub messages_sent: u64,

    /// Attempts that did not get an OK
    pub failed_sends: u64,

    /// RECEIVE events
    pub receives: u64,

    /// Largest backlog seen at a RECEIVE
    pub max_queue_length: usize,
}

/// One node's event loop.
///
/// Generic over the context, link and logger so the same loop runs against
/// real sockets or inside the simulator.
pub struct NodeProcess<Ctx, Link, Log>
where
    Ctx: NodeContext,
    Link: PeerLink,
    Log: EventLogger,
{
    config: NodeConfig,
    clock: LogicalClock,
    inbox: Inbox,
    peers: PeerTable,
    context: Arc<Ctx>,
    link: Arc<Link>,
    logger: Log,
    stats: NodeStats,
}

impl<Ctx, Link, Log> NodeProcess<Ctx, Link, Log>
where
    Ctx: NodeContext,
    Link: PeerLink,
    Log: EventLogger,
{
    /// Creates a node at clock 0 with an empty inbox.
    ///
    /// # Arguments
    /// * `config` - Validated node settings
    /// * `peers` - Ordered peer table (immutable for the node's lifetime)
    /// * `context` - Time and randomness
    /// * `link` - Outbound transport
    /// * `logger` - Event record sink
    pub fn new(config: NodeConfig, peers: PeerTable, context: Arc<Ctx>, link: Arc<Link>, logger: Log) -> Self {
        Self {
            config,
            clock: LogicalClock::new(),
            inbox: Inbox::new(),
            peers,
            context,
            link,
            logger,
            stats: NodeStats::default(),
        }
    }

    /// Uses an existing inbox handle (e.g. one a server already feeds).
    pub fn with_inbox(mut self, inbox: Inbox) -> Self {
        self.inbox = inbox;
        self
    }

    /// Starts from a given clock instead of zero.
    pub fn with_clock(mut self, clock: LogicalClock) -> Self {
        self.clock = clock;
        self
    }

    /// Node name.
    pub fn id(&self) -> NodeId {
        self.config.id
    }

    /// Node settings.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Current clock value.
    pub fn clock(&self) -> u64 {
        self.clock.value()
    }

    /// The node's inbox.
    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// The node's peer table.
    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Counters so far.
    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    /// A server that feeds this node's inbox.
    pub fn message_server(&self) -> MessageServer {
        MessageServer::new(self.config.id, self.inbox.clone())
    }

    /// Executes one tick and returns the record it emitted.
    pub async fn step(&mut self) -> EventRecord {
        self.stats.ticks += 1;

        let record = match self.inbox.try_pop() {
            Some(entry) => self.receive(entry),
            None => {
                let (low, high) = ROLL_RANGE;
                let branch = Branch::from_roll(self.context.roll(low, high));
                self.act(branch).await
            }
        };

        debug!(node = %self.config.id, clock = record.logical_clock, event = %record.event_type(), "tick");
        if let Err(e) = self.logger.append(&record) {
            warn!(node = %self.config.id, error = %e, "failed to append event record");
        }
        record
    }

    fn receive(&mut self, entry: InboxEntry) -> EventRecord {
        let clock = self.clock.tick_receive(entry.message.clock);

        self.stats.receives += 1;
        self.stats.max_queue_length = self.stats.max_queue_length.max(entry.queue_length);

        EventRecord::receive(
            self.timestamp(),
            self.config.id,
            clock,
            entry.message.sender(),
            entry.queue_length,
        )
    }

    async fn act(&mut self, branch: Branch) -> EventRecord {
        let targets = branch.targets(&self.peers);

        if targets.is_empty() {
            if branch != Branch::Internal {
                debug!(node = %self.config.id, ?branch, "branch has no peer, recording internal event");
            }
            let clock = self.clock.tick_internal();
            self.stats.internal_events += 1;
            return EventRecord::internal(self.timestamp(), self.config.id, clock);
        }

        // Every message of this event carries the clock as it was before the send.
        let outgoing = self.clock.value();
        for target in &targets {
            self.stats.messages_sent += 1;
            let message = Message::new(outgoing, self.config.id.to_string());
            if let Err(e) = self.link.send(target, message).await {
                self.stats.failed_sends += 1;
                warn!(node = %self.config.id, peer = %target.id, error = %e, "delivery failed");
            }
        }

        // The attempt is the event, delivered or not.
        let clock = self.clock.tick_send();
        self.stats.send_events += 1;
        EventRecord::send(
            self.timestamp(),
            self.config.id,
            clock,
            targets.iter().map(|t| t.id).collect(),
        )
    }

    fn timestamp(&self) -> chrono::NaiveDateTime {
        EventRecord::timestamp_from(self.context.system_time())
    }

    /// Ticks until `shutdown` becomes true (or its sender is dropped).
    ///
    /// The period is measured from the end of the previous tick, so a slow
    /// send stretches the gap between ticks. A tick that has started runs
    /// to completion before shutdown is observed.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.tick_period();
        info!(
            node = %self.config.id,
            tick_rate = self.config.tick_rate,
            peers = ?self.peers.ids(),
            "node loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.context.sleep(period) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            self.step().await;
        }

        info!(
            node = %self.config.id,
            clock = self.clock.value(),
            ticks = self.stats.ticks,
            backlog = self.inbox.size(),
            "node loop stopped"
        );
    }
}
