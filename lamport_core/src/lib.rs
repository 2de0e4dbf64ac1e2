//! Lamport Core - per-node logical clock runtime.
//!
//! This library implements the node side of a small simulated network of
//! Lamport-clocked machines:
//! 1. **Clock**: the three update rules (`internal`, `send`, `receive`)
//! 2. **Inbox**: the only state shared between serving and looping
//! 3. **Node loop**: one unit of work and one clock update per tick
//! 4. **Records**: the fixed log grammar consumed by offline analysis
//!
//! Transport, time and randomness come from `lamport_env`, so the same
//! `NodeProcess` runs over TCP in production and in virtual time in the
//! simulator.

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod inbox;
pub mod logger;
pub mod node;
pub mod peers;
pub mod server;

// Re-export key types for convenience
pub use clock::LogicalClock;
pub use config::{ClusterConfig, NodeConfig, NodeDescriptor};
pub use error::{ConfigError, LogError, RecordParseError};
pub use event::{parse_log, EventKind, EventRecord, EventType, TIMESTAMP_FORMAT};
pub use inbox::{Inbox, InboxEntry};
pub use logger::{EventLogger, FileEventLogger, MemoryEventLogger};
pub use node::{Branch, NodeProcess, NodeStats, ROLL_RANGE};
pub use peers::{select_peers, PeerTable, DEFAULT_PEER_COUNT};
pub use server::MessageServer;
