//! Common types for the Lamport environment abstraction.

use serde::{Deserialize, Serialize};

/// Identifier for a node: a single ASCII uppercase letter.
///
/// The log grammar and the peer selection rules both depend on names
/// being exactly one letter, so the invariant is enforced on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(char);

impl NodeId {
    /// Creates a NodeId from a letter, or `None` if it is not `A..=Z`.
    pub fn new(name: char) -> Option<Self> {
        name.is_ascii_uppercase().then_some(Self(name))
    }

    /// Parses a NodeId from a one-letter string.
    pub fn parse(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::new(c),
            _ => None,
        }
    }

    /// The full alphabet of valid names, in order.
    pub fn alphabet() -> Vec<NodeId> {
        ('A'..='Z').map(NodeId).collect()
    }

    /// Returns the letter.
    pub fn as_char(&self) -> char {
        self.0
    }

    /// Zero-based position in the alphabet (`A` = 0).
    pub fn index(&self) -> u64 {
        u64::from(self.0 as u8 - b'A')
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for NodeId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid node name {:?}: expected one uppercase letter", value))
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0.to_string()
    }
}

/// Where a peer can be reached, resolved by node identity from the
/// configured descriptor table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    /// The peer's node name
    pub id: NodeId,

    /// Host name or IP
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl PeerAddress {
    /// Creates a new peer address.
    pub fn new(id: NodeId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }

    /// Returns `host:port` suitable for `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}

/// A clock-bearing message: the single RPC request.
///
/// Unknown fields are rejected so that schema violations never reach
/// a node's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    /// Sender's logical clock at send time
    pub clock: u64,

    /// Opaque payload; carries the sender's name in practice
    pub content: String,
}

impl Message {
    /// Creates a new message.
    pub fn new(clock: u64, content: impl Into<String>) -> Self {
        Self {
            clock,
            content: content.into(),
        }
    }

    /// Returns the sender identity carried in the payload, if it is one.
    pub fn sender(&self) -> Option<NodeId> {
        NodeId::parse(self.content.trim())
    }
}

/// Reply to a `SendMessage` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReply {
    /// `"OK"` on success, `"ERROR: <reason>"` otherwise
    pub status: String,
}

impl MessageReply {
    pub const OK: &'static str = "OK";

    /// Successful acknowledgment.
    pub fn ok() -> Self {
        Self {
            status: Self::OK.to_string(),
        }
    }

    /// Error acknowledgment with a reason.
    pub fn error(reason: impl std::fmt::Display) -> Self {
        Self {
            status: format!("ERROR: {}", reason),
        }
    }

    /// Returns true if the status is `"OK"`.
    pub fn is_ok(&self) -> bool {
        self.status == Self::OK
    }
}
