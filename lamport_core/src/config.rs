//! Cluster configuration: the ordered node descriptor table.
//!
//! ```json
//! { "VMs": [ { "name": "A", "port": 50051, "clock_rate": 2 }, ... ] }
//! ```

use crate::error::ConfigError;
use lamport_env::{NodeId, PeerAddress};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

fn default_host() -> String {
    "localhost".to_string()
}

/// One entry of the descriptor list, as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Single uppercase letter
    pub name: String,

    /// Listening port
    pub port: u16,

    /// Ticks per second
    pub clock_rate: f64,

    /// Host peers dial (default: localhost)
    #[serde(default = "default_host")]
    pub host: String,
}

impl NodeDescriptor {
    /// Creates a descriptor on localhost.
    pub fn new(name: impl Into<String>, port: u16, clock_rate: f64) -> Self {
        Self {
            name: name.into(),
            port,
            clock_rate,
            host: default_host(),
        }
    }
}

/// Validated, immutable settings of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// Node name
    pub id: NodeId,

    /// Where this node listens and where peers reach it
    pub address: PeerAddress,

    /// Ticks per second (> 0)
    pub tick_rate: f64,
}

impl NodeConfig {
    /// Time between the end of one unit of work and the next tick.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate)
    }
}

/// The whole cluster's descriptor table, in configured order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(rename = "VMs")]
    pub nodes: Vec<NodeDescriptor>,
}

impl ClusterConfig {
    /// Builds a config from descriptors without validating.
    pub fn new(nodes: Vec<NodeDescriptor>) -> Self {
        Self { nodes }
    }

    /// The three-node reference topology (A, B, C at 2, 4, 6 ticks/s).
    pub fn triangle() -> Self {
        Self::new(vec![
            NodeDescriptor::new("A", 50051, 2.0),
            NodeDescriptor::new("B", 50052, 4.0),
            NodeDescriptor::new("C", 50053, 6.0),
        ])
    }

    /// Reads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parses and validates a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ClusterConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every descriptor; returns the derived node configs in order.
    pub fn validate(&self) -> Result<Vec<NodeConfig>, ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }

        let mut names = HashSet::new();
        let mut addresses = HashSet::new();
        let mut configs = Vec::with_capacity(self.nodes.len());

        for desc in &self.nodes {
            let id = NodeId::parse(&desc.name).ok_or_else(|| ConfigError::InvalidName(desc.name.clone()))?;
            if !names.insert(id) {
                return Err(ConfigError::DuplicateName(desc.name.clone()));
            }
            if desc.port == 0 {
                return Err(ConfigError::InvalidPort(desc.name.clone()));
            }
            if !addresses.insert((desc.host.clone(), desc.port)) {
                return Err(ConfigError::DuplicateAddress(format!("{}:{}", desc.host, desc.port)));
            }
            if !desc.clock_rate.is_finite() || desc.clock_rate <= 0.0 {
                return Err(ConfigError::InvalidClockRate {
                    name: desc.name.clone(),
                    rate: desc.clock_rate,
                });
            }
            configs.push(NodeConfig {
                id,
                address: PeerAddress::new(id, desc.host.clone(), desc.port),
                tick_rate: desc.clock_rate,
            });
        }

        Ok(configs)
    }

    /// Node names in configured order (invalid names skipped).
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().filter_map(|d| NodeId::parse(&d.name)).collect()
    }

    /// Validated settings of a single node.
    pub fn node(&self, id: NodeId) -> Result<NodeConfig, ConfigError> {
        self.validate()?
            .into_iter()
            .find(|n| n.id == id)
            .ok_or_else(|| ConfigError::UnknownNode(id.to_string()))
    }

    /// Resolves a node's address by identity.
    pub fn address_of(&self, id: NodeId) -> Option<PeerAddress> {
        self.nodes
            .iter()
            .find(|d| NodeId::parse(&d.name) == Some(id))
            .map(|d| PeerAddress::new(id, d.host.clone(), d.port))
    }
}
