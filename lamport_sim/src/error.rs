//! Error types for the simulation harness.

use lamport_core::{ConfigError, LogError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid cluster: {0}")]
    Config(#[from] ConfigError),

    #[error("log output failed: {0}")]
    Log(#[from] LogError),

    #[error("export failed: {0}")]
    Export(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
