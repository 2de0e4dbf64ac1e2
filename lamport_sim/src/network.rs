//! Simulated network transport with fault injection.

use crate::context::SimContext;
use async_trait::async_trait;
use lamport_env::{
    EnvError, Message, MessageReply, NetworkController, NodeId, PeerAddress, PeerLink, RequestHandler,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

/// How long a simulated lost message holds the sender before it gives up.
pub const SIM_SEND_TIMEOUT: Duration = Duration::from_millis(1000);

/// Every node's inbound handler, by name.
#[derive(Clone, Default)]
pub struct Endpoints {
    handlers: Arc<RwLock<HashMap<NodeId, Arc<dyn RequestHandler>>>>,
}

impl Endpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the handler reached at `id`.
    pub fn register(&self, id: NodeId, handler: Arc<dyn RequestHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handler);
    }

    /// Removes a node; later sends to it are unreachable.
    pub fn unregister(&self, id: NodeId) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn get(&self, id: NodeId) -> Option<Arc<dyn RequestHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

/// Simulated network interface for one node.
///
/// Delivery is immediate: the request is encoded exactly as on the wire and
/// handed to the target's handler. Link latency and losses are charged to
/// the sender as a stall, which the world adds to its next tick deadline.
pub struct SimNetwork {
    /// This node's ID
    local_id: NodeId,

    /// Where requests are delivered
    endpoints: Endpoints,

    /// Shared fault configuration
    controller: Arc<SimNetworkController>,

    /// Source of loss decisions
    context: SimContext,

    /// Sender-side blocking accumulated since the last `take_stall`
    stall: Mutex<Duration>,

    /// Simulated timeout for lost messages
    timeout: Duration,
}

impl SimNetwork {
    /// Creates a new simulated network interface.
    pub fn new(
        local_id: NodeId,
        endpoints: Endpoints,
        controller: Arc<SimNetworkController>,
        context: SimContext,
    ) -> Self {
        Self {
            local_id,
            endpoints,
            controller,
            context,
            stall: Mutex::new(Duration::ZERO),
            timeout: SIM_SEND_TIMEOUT,
        }
    }

    /// Overrides the simulated send timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// This node's ID.
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Returns and resets the time sends have held this node.
    pub fn take_stall(&self) -> Duration {
        let mut stall = self.stall.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *stall)
    }

    fn add_stall(&self, duration: Duration) {
        *self.stall.lock().unwrap_or_else(PoisonError::into_inner) += duration;
    }
}

#[async_trait]
impl PeerLink for SimNetwork {
    async fn send(&self, target: &PeerAddress, message: Message) -> Result<MessageReply, EnvError> {
        if !self.controller.can_communicate(self.local_id, target.id) {
            return Err(EnvError::unreachable(target));
        }

        let handler = self
            .endpoints
            .get(target.id)
            .ok_or_else(|| EnvError::unreachable(target))?;

        let loss = self.controller.get_loss(self.local_id, target.id);
        if loss > 0.0 && self.context.chance() < loss {
            self.add_stall(self.timeout);
            return Err(EnvError::Timeout(self.timeout.as_millis() as u64));
        }

        let latency_ms = self.controller.get_latency(self.local_id, target.id);
        self.add_stall(Duration::from_millis(latency_ms));

        let request = serde_json::to_vec(&message)?;
        let reply = handler.handle(&request);
        if reply.is_ok() {
            Ok(reply)
        } else {
            Err(EnvError::protocol(reply.status))
        }
    }
}

/// Network controller for fault injection.
#[derive(Debug, Default)]
pub struct SimNetworkController {
    /// Per-link latency in milliseconds
    link_latency: Mutex<HashMap<(NodeId, NodeId), u64>>,

    /// Per-link packet loss rate (0.0 - 1.0)
    link_loss: Mutex<HashMap<(NodeId, NodeId), f64>>,

    /// Active partitions (nodes that cannot communicate)
    partitions: Mutex<Vec<(Vec<NodeId>, Vec<NodeId>)>>,
}

impl SimNetworkController {
    /// Creates a new network controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets latency for a specific link.
    pub fn set_latency(&self, from: NodeId, to: NodeId, latency_ms: u64) {
        let mut latencies = self.link_latency.lock().unwrap_or_else(PoisonError::into_inner);
        latencies.insert((from, to), latency_ms);
    }

    /// Sets packet loss rate for a link.
    pub fn set_loss(&self, from: NodeId, to: NodeId, loss_rate: f64) {
        let mut losses = self.link_loss.lock().unwrap_or_else(PoisonError::into_inner);
        losses.insert((from, to), loss_rate.clamp(0.0, 1.0));
    }

    /// Creates a network partition between two groups.
    pub fn add_partition(&self, group_a: Vec<NodeId>, group_b: Vec<NodeId>) {
        let mut partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        partitions.push((group_a, group_b));
    }

    /// Cuts `node` off from every other node in `all`.
    pub fn isolate(&self, node: NodeId, all: &[NodeId]) {
        let others: Vec<NodeId> = all.iter().copied().filter(|n| *n != node).collect();
        self.add_partition(vec![node], others);
    }

    /// Heals all active partitions.
    pub fn heal(&self) {
        let mut partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        partitions.clear();
    }

    /// Checks if two nodes can communicate (not partitioned).
    pub fn can_communicate(&self, from: NodeId, to: NodeId) -> bool {
        let partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);

        for (group_a, group_b) in partitions.iter() {
            let from_in_a = group_a.contains(&from);
            let from_in_b = group_b.contains(&from);
            let to_in_a = group_a.contains(&to);
            let to_in_b = group_b.contains(&to);

            // Partitioned if one is in A and other in B (or vice versa)
            if (from_in_a && to_in_b) || (from_in_b && to_in_a) {
                return false;
            }
        }

        true
    }

    /// Gets the latency for a link (default 0).
    pub fn get_latency(&self, from: NodeId, to: NodeId) -> u64 {
        let latencies = self.link_latency.lock().unwrap_or_else(PoisonError::into_inner);
        *latencies.get(&(from, to)).unwrap_or(&0)
    }

    /// Gets the loss rate for a link (default 0.0).
    pub fn get_loss(&self, from: NodeId, to: NodeId) -> f64 {
        let losses = self.link_loss.lock().unwrap_or_else(PoisonError::into_inner);
        *losses.get(&(from, to)).unwrap_or(&0.0)
    }
}

impl NetworkController for SimNetworkController {
    fn partition(&self, group_a: &[NodeId], group_b: &[NodeId]) {
        self.add_partition(group_a.to_vec(), group_b.to_vec());
    }

    fn heal_all(&self) {
        self.heal();
    }

    fn set_link_latency(&self, from: NodeId, to: NodeId, latency_ms: u64) {
        self.set_latency(from, to, latency_ms);
    }

    fn set_link_loss(&self, from: NodeId, to: NodeId, loss_rate: f64) {
        self.set_loss(from, to, loss_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamport_core::{Inbox, MessageServer};

    fn id(name: &str) -> NodeId {
        NodeId::parse(name).unwrap()
    }

    fn addr(name: &str) -> PeerAddress {
        PeerAddress::new(id(name), "sim", 1)
    }

    fn setup() -> (SimNetwork, Inbox, Arc<SimNetworkController>) {
        let endpoints = Endpoints::new();
        let inbox = Inbox::new();
        endpoints.register(id("B"), Arc::new(MessageServer::new(id("B"), inbox.clone())));
        let controller = Arc::new(SimNetworkController::new());
        let network = SimNetwork::new(id("A"), endpoints, Arc::clone(&controller), SimContext::new(1));
        (network, inbox, controller)
    }

    #[tokio::test]
    async fn test_delivery_goes_through_server() {
        let (network, inbox, _) = setup();

        let reply = network.send(&addr("B"), Message::new(4, "A")).await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(inbox.try_pop().unwrap().message, Message::new(4, "A"));
        assert_eq!(network.take_stall(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_partition_makes_peer_unreachable() {
        let (network, inbox, controller) = setup();
        controller.isolate(id("A"), &[id("A"), id("B"), id("C")]);

        let result = network.send(&addr("B"), Message::new(1, "A")).await;
        assert!(matches!(result, Err(EnvError::NodeUnreachable(_))));
        assert!(inbox.is_empty());

        controller.heal_all();
        assert!(network.send(&addr("B"), Message::new(1, "A")).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_unreachable() {
        let (network, _, _) = setup();
        let result = network.send(&addr("Z"), Message::new(1, "A")).await;
        assert!(matches!(result, Err(EnvError::NodeUnreachable(_))));
    }

    #[tokio::test]
    async fn test_total_loss_times_out_and_stalls() {
        let (network, inbox, controller) = setup();
        controller.set_link_loss(id("A"), id("B"), 1.0);

        let result = network.send(&addr("B"), Message::new(1, "A")).await;
        assert!(matches!(result, Err(EnvError::Timeout(1000))));
        assert!(inbox.is_empty());
        assert_eq!(network.take_stall(), SIM_SEND_TIMEOUT);
        assert_eq!(network.take_stall(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_latency_is_charged_to_sender() {
        let (network, _, controller) = setup();
        controller.set_link_latency(id("A"), id("B"), 40);

        network.send(&addr("B"), Message::new(1, "A")).await.unwrap();
        network.send(&addr("B"), Message::new(2, "A")).await.unwrap();
        assert_eq!(network.take_stall(), Duration::from_millis(80));
    }

    #[test]
    fn test_network_controller_partition() {
        let controller = SimNetworkController::new();

        let a = id("A");
        let b = id("B");
        let c = id("C");

        // Initially all can communicate
        assert!(controller.can_communicate(a, b));
        assert!(controller.can_communicate(a, c));
        assert!(controller.can_communicate(b, c));

        // Partition: {a} vs {b, c}
        controller.add_partition(vec![a], vec![b, c]);

        // Now a cannot talk to b or c
        assert!(!controller.can_communicate(a, b));
        assert!(!controller.can_communicate(c, a));

        // But b and c can still talk
        assert!(controller.can_communicate(b, c));

        // Heal
        controller.heal();
        assert!(controller.can_communicate(a, b));
    }

    #[test]
    fn test_network_controller_latency() {
        let controller = SimNetworkController::new();

        let a = id("A");
        let b = id("B");

        assert_eq!(controller.get_latency(a, b), 0);

        controller.set_latency(a, b, 100);
        assert_eq!(controller.get_latency(a, b), 100);

        // Reverse direction is separate
        assert_eq!(controller.get_latency(b, a), 0);
    }
}
