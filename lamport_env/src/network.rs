//! Network transport abstraction for Lamport nodes.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{Message, MessageReply, NodeId, PeerAddress};

/// Outbound capability: deliver one clock-bearing message to one peer.
///
/// # Implementations
///
/// - **Production**: `TcpPeerLink` - newline-delimited JSON over TCP
/// - **Simulation**: `SimNetwork` - direct hand-off with injectable faults
///
/// # Packet Flow
///
/// ```text
/// Node A (loop)              PeerLink                Node B (server)
///   |                           |                          |
///   |-- send(B, msg) ---------->|-- request -------------->|-- push(inbox)
///   |                           |<------------- {"OK"} ----|
///   |<-- Ok(reply) -------------|                          |
/// ```
#[async_trait]
pub trait PeerLink: Send + Sync + 'static {
    /// Sends a message to a peer and awaits its acknowledgment.
    ///
    /// # Returns
    /// * `Ok(reply)` - The peer accepted the message into its inbox
    /// * `Err(EnvError::NodeUnreachable)` - Connection refused / partitioned
    /// * `Err(EnvError::Timeout)` - No acknowledgment within the bound
    /// * `Err(EnvError::ProtocolError)` - The peer rejected the request
    ///
    /// # Blocking
    /// The caller's tick is held until this returns.
    async fn send(&self, target: &PeerAddress, message: Message) -> Result<MessageReply, EnvError>;
}

/// Inbound seam: turns one raw request into one reply.
///
/// Transports own framing only; decoding, validation and enqueueing are the
/// handler's job so that every transport rejects malformed input the same way.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handles a single encoded request.
    fn handle(&self, request: &[u8]) -> MessageReply;
}

impl<H: RequestHandler + ?Sized> RequestHandler for std::sync::Arc<H> {
    fn handle(&self, request: &[u8]) -> MessageReply {
        (**self).handle(request)
    }
}

/// Marker trait for network controllers in simulation.
///
/// Allows injecting faults like partitions, latency and loss.
pub trait NetworkController: Send + Sync {
    /// Creates a network partition between two node sets.
    fn partition(&self, group_a: &[NodeId], group_b: &[NodeId]);
    
    /// Heals all partitions.
    fn heal_all(&self);
    
    /// Sets latency for a specific link.
    fn set_link_latency(&self, from: NodeId, to: NodeId, latency_ms: u64);
    
    /// Sets packet loss probability for a link (0.0 - 1.0).
    fn set_link_loss(&self, from: NodeId, to: NodeId, loss_rate: f64);
}
