//! SimWorld - every node of a cluster on one virtual clock.

use crate::context::SimContext;
use crate::network::{Endpoints, SimNetwork, SimNetworkController, SIM_SEND_TIMEOUT};

use lamport_core::{
    ClusterConfig, ConfigError, EventRecord, MemoryEventLogger, NodeProcess, NodeStats, PeerTable,
    DEFAULT_PEER_COUNT,
};
use lamport_env::{NodeContext, NodeId};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Nodes to run, in configured order
    pub cluster: ClusterConfig,

    /// Peers selected per node
    pub peer_count: usize,

    /// How long a lost message holds its sender
    pub send_timeout: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            cluster: ClusterConfig::triangle(),
            peer_count: DEFAULT_PEER_COUNT,
            send_timeout: SIM_SEND_TIMEOUT,
        }
    }
}

/// A node process wired to the simulated network and an in-memory log.
pub type SimNode = NodeProcess<SimContext, SimNetwork, MemoryEventLogger>;

/// Handle to a simulated node.
pub struct NodeHandle {
    /// The node's event loop
    pub process: SimNode,

    /// Outbound link (also tracks sender stalls)
    pub network: Arc<SimNetwork>,

    /// Everything the node has logged
    pub logger: MemoryEventLogger,

    /// Virtual time of the next tick
    next_tick_ns: u64,
}

impl NodeHandle {
    /// Virtual time at which this node ticks next.
    pub fn next_tick(&self) -> Duration {
        Duration::from_nanos(self.next_tick_ns)
    }
}

/// The SimWorld - container for the entire simulation.
///
/// Nodes do not run as free tasks here. The world repeatedly picks the
/// node with the earliest deadline (ties go to configured order), moves the
/// virtual clock there and executes that node's tick. The next deadline is
/// the end of the work plus one tick period plus whatever the sends stalled.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    context: Arc<SimContext>,

    /// Network controller for fault injection
    controller: Arc<SimNetworkController>,

    /// Every node's inbound handler
    endpoints: Endpoints,

    /// Node handles in configured order
    nodes: Vec<NodeHandle>,

    /// Ticks executed across all nodes
    tick_count: u64,
}

impl SimWorld {
    /// Builds every node of the configured cluster.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        let node_configs = config.cluster.validate()?;
        let context = SimContext::shared(config.seed);
        let controller = Arc::new(SimNetworkController::new());
        let endpoints = Endpoints::new();

        let mut nodes = Vec::with_capacity(node_configs.len());
        for (index, node_config) in node_configs.into_iter().enumerate() {
            let id = node_config.id;
            let peers = PeerTable::from_config(&config.cluster, id, config.peer_count)?;

            // Separate streams for rolls and for loss decisions.
            let stream = index as u64 * 2;
            let node_context = Arc::new(context.fork(stream + 1));
            let network = Arc::new(
                SimNetwork::new(id, endpoints.clone(), Arc::clone(&controller), context.fork(stream + 2))
                    .with_timeout(config.send_timeout),
            );
            let logger = MemoryEventLogger::new();

            let first_tick = node_config.tick_period();
            let process = NodeProcess::new(node_config, peers, node_context, Arc::clone(&network), logger.clone());
            endpoints.register(id, Arc::new(process.message_server()));

            nodes.push(NodeHandle {
                process,
                network,
                logger,
                next_tick_ns: first_tick.as_nanos() as u64,
            });
        }

        Ok(Self {
            config,
            context,
            controller,
            endpoints,
            nodes,
            tick_count: 0,
        })
    }

    /// Executes the earliest pending tick and returns what it logged.
    pub async fn step_next(&mut self) -> Option<(NodeId, EventRecord)> {
        let index = self
            .nodes
            .iter()
            .enumerate()
            .min_by_key(|(index, handle)| (handle.next_tick_ns, *index))
            .map(|(index, _)| index)?;

        let handle = &mut self.nodes[index];
        let deadline = handle.next_tick_ns;
        self.context.set_time(deadline);

        let record = handle.process.step().await;
        let stall = handle.network.take_stall();
        let period = handle.process.config().tick_period();
        handle.next_tick_ns = deadline + (stall + period).as_nanos() as u64;
        self.tick_count += 1;

        let id = handle.process.id();
        debug!(node = %id, time_ns = deadline, stall_ms = stall.as_millis() as u64, "sim tick");
        Some((id, record))
    }

    /// Runs every tick due within the next `duration` of virtual time and
    /// leaves the clock at the end of the window. Returns the ticks executed.
    pub async fn run_for(&mut self, duration: Duration) -> u64 {
        let end = self.context.time_ns() + duration.as_nanos() as u64;
        let mut ticks = 0;

        while self.nodes.iter().any(|n| n.next_tick_ns <= end) {
            if self.step_next().await.is_none() {
                break;
            }
            ticks += 1;
        }

        self.context.set_time(end);
        ticks
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.context.now()
    }

    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.now().as_secs_f64()
    }

    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Node names in configured order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.process.id()).collect()
    }

    /// All node handles in configured order.
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// Handle of one node.
    pub fn node(&self, id: NodeId) -> Option<&NodeHandle> {
        self.nodes.iter().find(|n| n.process.id() == id)
    }

    /// Fault injection for this world's links.
    pub fn controller(&self) -> &Arc<SimNetworkController> {
        &self.controller
    }

    /// Takes a node off the network; its peers see it as unreachable.
    pub fn crash(&mut self, id: NodeId) {
        self.endpoints.unregister(id);
        self.nodes.retain(|n| n.process.id() != id);
    }

    /// Records logged by one node so far.
    pub fn records(&self, id: NodeId) -> Vec<EventRecord> {
        self.node(id).map(|n| n.logger.records()).unwrap_or_default()
    }

    /// A node's current clock.
    pub fn clock(&self, id: NodeId) -> Option<u64> {
        self.node(id).map(|n| n.process.clock())
    }

    /// A node's counters.
    pub fn stats(&self, id: NodeId) -> Option<&NodeStats> {
        self.node(id).map(|n| n.process.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamport_core::{EventType, NodeDescriptor};
    use lamport_env::NetworkController;

    fn id(name: &str) -> NodeId {
        NodeId::parse(name).unwrap()
    }

    fn pair(rate_a: f64, rate_b: f64) -> SimConfig {
        SimConfig {
            seed: 11,
            cluster: ClusterConfig::new(vec![
                NodeDescriptor::new("A", 7001, rate_a),
                NodeDescriptor::new("B", 7002, rate_b),
            ]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sim_world_creation() {
        let world = SimWorld::new(SimConfig::default()).unwrap();

        assert_eq!(world.ids(), vec![id("A"), id("B"), id("C")]);
        assert_eq!(world.tick_count(), 0);
        assert_eq!(world.time(), 0.0);
        assert_eq!(world.node(id("C")).unwrap().process.peers().ids(), vec![id("A"), id("B")]);
    }

    #[tokio::test]
    async fn test_invalid_cluster_is_rejected() {
        let config = SimConfig {
            cluster: ClusterConfig::new(vec![]),
            ..Default::default()
        };
        assert!(matches!(SimWorld::new(config), Err(ConfigError::NoNodes)));
    }

    #[tokio::test]
    async fn test_first_tick_after_one_period() {
        let mut world = SimWorld::new(pair(2.0, 4.0)).unwrap();

        let (first, _) = world.step_next().await.unwrap();
        assert_eq!(first, id("B"));
        assert_eq!(world.now(), Duration::from_millis(250));

        let (second, _) = world.step_next().await.unwrap();
        assert_eq!(second, id("A"));
        assert_eq!(world.now(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_tick_counts_follow_rates() {
        let mut world = SimWorld::new(pair(2.0, 4.0)).unwrap();
        let ticks = world.run_for(Duration::from_secs(10)).await;

        let a = world.stats(id("A")).unwrap().ticks;
        let b = world.stats(id("B")).unwrap().ticks;
        assert_eq!(a, 20);
        assert_eq!(b, 40);
        assert_eq!(ticks, 60);
        assert_eq!(world.now(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_same_seed_same_logs() {
        let mut first = SimWorld::new(SimConfig::default()).unwrap();
        let mut second = SimWorld::new(SimConfig::default()).unwrap();
        first.run_for(Duration::from_secs(20)).await;
        second.run_for(Duration::from_secs(20)).await;

        for node in first.ids() {
            assert_eq!(first.records(node), second.records(node));
        }
    }

    #[tokio::test]
    async fn test_receives_follow_lamport_rule() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        world.run_for(Duration::from_secs(30)).await;

        let mut receives = 0;
        for node in world.ids() {
            let records = world.records(node);
            assert!(records.windows(2).all(|w| w[1].logical_clock > w[0].logical_clock));
            receives += records.iter().filter(|r| r.event_type() == EventType::Receive).count();
        }
        assert!(receives > 0);
    }

    #[tokio::test]
    async fn test_partition_fails_every_send() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        let all = world.ids();
        world.controller().isolate(id("A"), &all);
        world.run_for(Duration::from_secs(60)).await;

        let stats = world.stats(id("A")).unwrap();
        assert!(stats.messages_sent > 0);
        assert_eq!(stats.failed_sends, stats.messages_sent);

        for node in [id("B"), id("C")] {
            assert!(world.records(node).iter().all(|r| r.sender() != Some(id("A"))));
        }

        world.controller().heal_all();
        world.run_for(Duration::from_secs(60)).await;
        assert!(world.stats(id("A")).unwrap().failed_sends < world.stats(id("A")).unwrap().messages_sent);
    }

    #[tokio::test]
    async fn test_latency_stretches_sender_schedule() {
        let config = SimConfig {
            peer_count: 1,
            ..pair(10.0, 10.0)
        };
        let mut world = SimWorld::new(config).unwrap();
        world.controller().set_link_latency(id("A"), id("B"), 500);
        world.run_for(Duration::from_secs(30)).await;

        let a = world.stats(id("A")).unwrap();
        let b = world.stats(id("B")).unwrap();
        assert!(a.send_events > 0);
        assert!(a.ticks < b.ticks);
    }

    #[tokio::test]
    async fn test_crashed_node_is_unreachable() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        world.crash(id("C"));
        world.run_for(Duration::from_secs(30)).await;

        assert_eq!(world.ids(), vec![id("A"), id("B")]);
        let failed: u64 = world.nodes().iter().map(|n| n.process.stats().failed_sends).sum();
        assert!(failed > 0);
    }
}
