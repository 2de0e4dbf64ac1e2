//! Peer selection and the immutable per-node peer table.

use crate::config::ClusterConfig;
use crate::error::ConfigError;
use lamport_env::{NodeId, PeerAddress};

/// Peers per node in the reference (triangle) topology.
pub const DEFAULT_PEER_COUNT: usize = 2;

/// Picks the first `count` names of `alphabet` other than `name`.
///
/// Deterministic for a fixed alphabet ordering.
pub fn select_peers(name: NodeId, alphabet: &[NodeId], count: usize) -> Vec<NodeId> {
    alphabet
        .iter()
        .copied()
        .filter(|candidate| *candidate != name)
        .take(count)
        .collect()
}

/// Ordered peer addresses of one node, fixed at startup.
///
/// Branch 1 of the event loop addresses `peers[0]`, branch 2 `peers[1]`,
/// branch 3 all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerTable {
    local: NodeId,
    peers: Vec<PeerAddress>,
}

impl PeerTable {
    /// Creates a table from already-resolved addresses.
    pub fn new(local: NodeId, peers: Vec<PeerAddress>) -> Self {
        Self { local, peers }
    }

    /// Selects up to `count` peers for `local` from the configured names in
    /// alphabetical order and resolves each by identity against the same
    /// descriptor table. The order the nodes are listed in does not matter.
    pub fn from_config(config: &ClusterConfig, local: NodeId, count: usize) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut ids = config.ids();
        ids.sort();
        if !ids.contains(&local) {
            return Err(ConfigError::UnknownNode(local.to_string()));
        }

        let peers = select_peers(local, &ids, count)
            .into_iter()
            .map(|id| {
                config
                    .address_of(id)
                    .ok_or_else(|| ConfigError::UnknownNode(id.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { local, peers })
    }

    /// The owning node.
    pub fn local(&self) -> NodeId {
        self.local
    }

    /// Peer at position `index`.
    pub fn get(&self, index: usize) -> Option<&PeerAddress> {
        self.peers.get(index)
    }

    /// All peers in order.
    pub fn all(&self) -> &[PeerAddress] {
        &self.peers
    }

    /// Peer names in order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.peers.iter().map(|p| p.id).collect()
    }

    /// Looks a peer up by name.
    pub fn resolve(&self, id: NodeId) -> Option<&PeerAddress> {
        self.peers.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
