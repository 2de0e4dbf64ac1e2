//! Event records and the fixed log grammar.
//!
//! The offline analysis tooling parses node logs with fixed patterns, so the
//! rendering below is bit-exact:
//!
//! ```text
//! 2025-03-01 12:00:00 [A] [INTERNAL]   Logical Clock: 7
//! 2025-03-01 12:00:00 [A] [RECEIVE ]   from: B, Queue Length: 3, Logical Clock: 8
//! 2025-03-01 12:00:01 [A] [SEND   ]   To: B, C, Logical Clock: 9
//! ```

use crate::error::RecordParseError;
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use lamport_env::NodeId;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// strftime layout of the leading timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TIMESTAMP_LEN: usize = 19;
const CLOCK_FIELD: &str = "Logical Clock: ";
/// Written in place of a sender that is not a node name. Readers that
/// expect a single capital letter after `from: ` will skip these lines.
const UNKNOWN_SENDER: &str = "?";

/// The three event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Internal,
    Send,
    Receive,
}

impl EventType {
    /// Bracketed tag as it appears in the log, padding included.
    pub fn tag(&self) -> &'static str {
        match self {
            EventType::Internal => "[INTERNAL]",
            EventType::Receive => "[RECEIVE ]",
            EventType::Send => "[SEND   ]",
        }
    }

    /// Bare name (`INTERNAL`, `SEND`, `RECEIVE`).
    pub fn name(&self) -> &'static str {
        match self {
            EventType::Internal => "INTERNAL",
            EventType::Send => "SEND",
            EventType::Receive => "RECEIVE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Event-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Purely local tick
    Internal,

    /// One logical send event addressed to one or more peers
    Send { peers: Vec<NodeId> },

    /// One inbox entry drained
    Receive {
        /// Sender identity carried in the message, if it was a node name
        sender: Option<NodeId>,
        /// Inbox depth observed just before the pop
        queue_length: usize,
    },
}

/// A single write-once log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Wall-clock time at second resolution (UTC)
    pub timestamp: NaiveDateTime,

    /// Node that produced the event
    pub node: NodeId,

    /// Clock value right after this event's update rule
    pub logical_clock: u64,

    /// Event-specific payload
    pub kind: EventKind,
}

impl EventRecord {
    /// An INTERNAL record.
    pub fn internal(timestamp: NaiveDateTime, node: NodeId, logical_clock: u64) -> Self {
        Self {
            timestamp,
            node,
            logical_clock,
            kind: EventKind::Internal,
        }
    }

    /// A SEND record listing every addressed peer.
    pub fn send(timestamp: NaiveDateTime, node: NodeId, logical_clock: u64, peers: Vec<NodeId>) -> Self {
        Self {
            timestamp,
            node,
            logical_clock,
            kind: EventKind::Send { peers },
        }
    }

    /// A RECEIVE record.
    pub fn receive(
        timestamp: NaiveDateTime,
        node: NodeId,
        logical_clock: u64,
        sender: Option<NodeId>,
        queue_length: usize,
    ) -> Self {
        Self {
            timestamp,
            node,
            logical_clock,
            kind: EventKind::Receive { sender, queue_length },
        }
    }

    /// Truncates a wall-clock instant to the record's second resolution.
    pub fn timestamp_from(time: SystemTime) -> NaiveDateTime {
        let naive = DateTime::<Utc>::from(time).naive_utc();
        naive.with_nanosecond(0).unwrap_or(naive)
    }

    /// Returns the event category.
    pub fn event_type(&self) -> EventType {
        match self.kind {
            EventKind::Internal => EventType::Internal,
            EventKind::Send { .. } => EventType::Send,
            EventKind::Receive { .. } => EventType::Receive,
        }
    }

    /// Queue length (RECEIVE only).
    pub fn queue_length(&self) -> Option<usize> {
        match self.kind {
            EventKind::Receive { queue_length, .. } => Some(queue_length),
            _ => None,
        }
    }

    /// Addressed peers (SEND only).
    pub fn peers(&self) -> Option<&[NodeId]> {
        match &self.kind {
            EventKind::Send { peers } => Some(peers),
            _ => None,
        }
    }

    /// Sender (RECEIVE only, when known).
    pub fn sender(&self) -> Option<NodeId> {
        match self.kind {
            EventKind::Receive { sender, .. } => sender,
            _ => None,
        }
    }

    /// Parses one line of the grammar.
    pub fn parse_line(line: &str) -> Result<Self, RecordParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let err = |reason| RecordParseError::new(line, reason);

        if line.len() < TIMESTAMP_LEN || !line.is_char_boundary(TIMESTAMP_LEN) {
            return Err(err("too short"));
        }
        let (stamp, rest) = line.split_at(TIMESTAMP_LEN);
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).map_err(|_| err("bad timestamp"))?;

        let rest = rest.strip_prefix(" [").ok_or_else(|| err("missing node"))?;
        let (node, rest) = rest.split_once("] [").ok_or_else(|| err("missing node"))?;
        let node = NodeId::parse(node).ok_or_else(|| err("bad node name"))?;

        let (tag, body) = rest.split_once(']').ok_or_else(|| err("missing event tag"))?;
        let body = body.trim_start();

        let (fields, clock) = body.rsplit_once(CLOCK_FIELD).ok_or_else(|| err("missing logical clock"))?;
        let logical_clock = clock.parse::<u64>().map_err(|_| err("bad logical clock"))?;

        let kind = match tag.trim_end() {
            "INTERNAL" => {
                if !fields.is_empty() {
                    return Err(err("unexpected fields on INTERNAL"));
                }
                EventKind::Internal
            }
            "RECEIVE" => {
                let fields = fields.strip_suffix(", ").ok_or_else(|| err("bad RECEIVE fields"))?;
                let fields = fields.strip_prefix("from: ").ok_or_else(|| err("missing sender"))?;
                let (sender, queue) = fields.split_once(", Queue Length: ").ok_or_else(|| err("missing queue length"))?;
                let sender = match sender {
                    UNKNOWN_SENDER => None,
                    name => Some(NodeId::parse(name).ok_or_else(|| err("bad sender"))?),
                };
                let queue_length = queue.parse::<usize>().map_err(|_| err("bad queue length"))?;
                EventKind::Receive { sender, queue_length }
            }
            "SEND" => {
                let fields = fields.strip_suffix(", ").ok_or_else(|| err("bad SEND fields"))?;
                let list = fields.strip_prefix("To:").ok_or_else(|| err("missing recipients"))?.trim();
                let peers = if list.is_empty() {
                    Vec::new()
                } else {
                    list.split(',')
                        .map(|p| NodeId::parse(p.trim()).ok_or_else(|| err("bad recipient")))
                        .collect::<Result<Vec<_>, _>>()?
                };
                EventKind::Send { peers }
            }
            _ => return Err(err("unknown event tag")),
        };

        Ok(Self {
            timestamp,
            node,
            logical_clock,
            kind,
        })
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}   ",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.node,
            self.event_type().tag()
        )?;
        match &self.kind {
            EventKind::Internal => {}
            EventKind::Receive { sender, queue_length } => {
                match sender {
                    Some(sender) => write!(f, "from: {}, ", sender)?,
                    None => write!(f, "from: {}, ", UNKNOWN_SENDER)?,
                }
                write!(f, "Queue Length: {}, ", queue_length)?;
            }
            EventKind::Send { peers } => {
                let list: Vec<String> = peers.iter().map(|p| p.to_string()).collect();
                write!(f, "To: {}, ", list.join(", "))?;
            }
        }
        write!(f, "{}{}", CLOCK_FIELD, self.logical_clock)
    }
}

impl FromStr for EventRecord {
    type Err = RecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_line(s)
    }
}

/// Parses a whole log stream, skipping blank lines.
pub fn parse_log(text: &str) -> Result<Vec<EventRecord>, RecordParseError> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(EventRecord::parse_line)
        .collect()
}
