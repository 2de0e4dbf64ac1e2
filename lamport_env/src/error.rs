//! Error types for the Lamport environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Network send failed (connection refused, reset, closed, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),
    
    /// Target node is unreachable (refused or simulated partition)
    #[error("Node unreachable: {0}")]
    NodeUnreachable(String),
    
    /// Request/reply serialization or deserialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
    
    /// The peer answered, but with an error status
    #[error("Protocol error: {0}")]
    ProtocolError(String),
    
    /// Context operation failed
    #[error("Context error: {0}")]
    ContextError(String),
    
    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
    
    /// Underlying socket I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }
    
    /// Creates an unreachable error.
    pub fn unreachable(node: impl std::fmt::Display) -> Self {
        Self::NodeUnreachable(node.to_string())
    }
    
    /// Creates a protocol error from a peer's error status.
    pub fn protocol(status: impl Into<String>) -> Self {
        Self::ProtocolError(status.into())
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
