//! Error types for the Lamport node runtime.

use thiserror::Error;

/// Malformed or missing cluster configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("cannot read config {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    
    /// Configuration is not valid JSON for the descriptor schema
    #[error("invalid config JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    
    /// The descriptor list is empty
    #[error("config lists no nodes")]
    NoNodes,
    
    /// A name is not a single uppercase letter
    #[error("invalid node name {0:?}: expected one uppercase letter")]
    InvalidName(String),
    
    /// A name appears twice
    #[error("duplicate node name {0}")]
    DuplicateName(String),
    
    /// Two nodes on the same host share a port
    #[error("duplicate address {0}")]
    DuplicateAddress(String),
    
    /// Port 0 cannot be dialed by peers
    #[error("node {0} has port 0")]
    InvalidPort(String),
    
    /// clock_rate must be finite and strictly positive
    #[error("node {name} has invalid clock_rate {rate}")]
    InvalidClockRate { name: String, rate: f64 },
    
    /// A node name was referenced that is not in the table
    #[error("unknown node {0}")]
    UnknownNode(String),
}

/// A log line that does not match the record grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable record ({reason}): {line:?}")]
pub struct RecordParseError {
    pub line: String,
    pub reason: &'static str,
}

impl RecordParseError {
    pub(crate) fn new(line: &str, reason: &'static str) -> Self {
        Self {
            line: line.to_string(),
            reason,
        }
    }
}

/// An event record could not be appended to its sink.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),
}
