//! Inbound side of a node: decode, validate, enqueue, acknowledge.

use crate::inbox::Inbox;
use lamport_env::{Message, MessageReply, NodeId, RequestHandler};
use tracing::{debug, warn};

/// Accepts `SendMessage` requests into one node's inbox.
///
/// The reply is sent as soon as the message is queued; it says nothing
/// about when the event loop will get to it.
#[derive(Debug, Clone)]
pub struct MessageServer {
    node: NodeId,
    inbox: Inbox,
}

impl MessageServer {
    /// Creates a server feeding `inbox`.
    pub fn new(node: NodeId, inbox: Inbox) -> Self {
        Self { node, inbox }
    }

    /// The owning node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Handle to the inbox being fed.
    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Enqueues an already-decoded message.
    pub fn accept(&self, message: Message) -> MessageReply {
        let depth = self.inbox.push(message);
        debug!(node = %self.node, depth, "message queued");
        MessageReply::ok()
    }
}

impl RequestHandler for MessageServer {
    fn handle(&self, request: &[u8]) -> MessageReply {
        match serde_json::from_slice::<Message>(request) {
            Ok(message) if message.clock == u64::MAX => {
                warn!(node = %self.node, "rejected request with saturated clock");
                MessageReply::error("invalid request: clock has no successor")
            }
            Ok(message) => self.accept(message),
            Err(e) => {
                warn!(node = %self.node, error = %e, "rejected malformed request");
                MessageReply::error(format!("invalid request: {}", e))
            }
        }
    }
}
