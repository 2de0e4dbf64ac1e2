//! Wires one node's serving and event-loop tasks onto real sockets.

use anyhow::{Context, Result};
use lamport_core::{ClusterConfig, FileEventLogger, NodeProcess, NodeStats, PeerTable};
use lamport_env::{serve_tcp, EnvError, NodeId, TcpPeerLink, TokioContext};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Settings shared by every node the agent starts.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Directory receiving `<NODE>.log`
    pub log_dir: PathBuf,

    /// Peers selected per node
    pub peer_count: usize,

    /// Bound on each outbound send
    pub send_timeout: Duration,

    /// Base seed for reproducible rolls; entropy when absent
    pub seed: Option<u64>,
}

/// A node whose two tasks are running.
pub struct RunningNode {
    pub id: NodeId,

    /// Where the message server actually listens
    pub addr: SocketAddr,

    server: JoinHandle<Result<(), EnvError>>,
    event_loop: JoinHandle<NodeStats>,
}

impl RunningNode {
    /// Waits for both tasks to stop and returns the loop's counters.
    pub async fn join(self) -> Result<NodeStats> {
        self.server
            .await
            .with_context(|| format!("server task of {} panicked", self.id))?
            .with_context(|| format!("server of {} failed", self.id))?;
        let stats = self
            .event_loop
            .await
            .with_context(|| format!("event loop of {} panicked", self.id))?;
        Ok(stats)
    }
}

/// Binds the node's configured port on all interfaces and starts it.
pub async fn spawn_node(
    cluster: &ClusterConfig,
    id: NodeId,
    options: &NodeOptions,
    shutdown: watch::Receiver<bool>,
) -> Result<RunningNode> {
    let config = cluster.node(id)?;
    let bind_addr = format!("0.0.0.0:{}", config.address.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("could not bind {} for node {}", bind_addr, id))?;
    spawn_node_on(cluster, id, listener, options, shutdown).await
}

/// Starts a node on an already-bound listener.
///
/// The serving task is up before the event loop begins, so peers that
/// tick early already find an open port.
pub async fn spawn_node_on(
    cluster: &ClusterConfig,
    id: NodeId,
    listener: TcpListener,
    options: &NodeOptions,
    shutdown: watch::Receiver<bool>,
) -> Result<RunningNode> {
    let config = cluster.node(id)?;
    let peers = PeerTable::from_config(cluster, id, options.peer_count)?;
    let logger = FileEventLogger::create(&options.log_dir, id)
        .with_context(|| format!("could not open log for node {}", id))?;
    let log_path = logger.path().display().to_string();

    let context = match options.seed {
        Some(seed) => TokioContext::with_seed(seed ^ id.index()),
        None => TokioContext::new(),
    };
    let link = TcpPeerLink::with_timeout(options.send_timeout);

    let mut process = NodeProcess::new(config, peers, Arc::new(context), Arc::new(link), logger);

    let addr = listener.local_addr()?;
    let server = tokio::spawn(serve_tcp(listener, Arc::new(process.message_server()), shutdown.clone()));

    info!(node = %id, addr = %addr, log = %log_path, peers = ?process.peers().ids(), "node started");

    let event_loop = tokio::spawn(async move {
        process.run(shutdown).await;
        process.stats().clone()
    });

    Ok(RunningNode {
        id,
        addr,
        server,
        event_loop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamport_core::{parse_log, EventType, NodeDescriptor, DEFAULT_PEER_COUNT};

    fn id(name: &str) -> NodeId {
        NodeId::parse(name).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_two_nodes_exchange_over_tcp() {
        let listener_a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listener_b = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let mut a = NodeDescriptor::new("A", listener_a.local_addr().unwrap().port(), 20.0);
        let mut b = NodeDescriptor::new("B", listener_b.local_addr().unwrap().port(), 20.0);
        a.host = "127.0.0.1".to_string();
        b.host = "127.0.0.1".to_string();
        let cluster = ClusterConfig::new(vec![a, b]);

        let log_dir = std::env::temp_dir().join(format!("lamport-agent-test-{}", std::process::id()));
        let options = NodeOptions {
            log_dir: log_dir.clone(),
            peer_count: DEFAULT_PEER_COUNT,
            send_timeout: Duration::from_millis(500),
            seed: Some(9),
        };

        let (tx, rx) = watch::channel(false);
        let node_a = spawn_node_on(&cluster, id("A"), listener_a, &options, rx.clone()).await.unwrap();
        let node_b = spawn_node_on(&cluster, id("B"), listener_b, &options, rx).await.unwrap();

        tokio::time::sleep(Duration::from_millis(2000)).await;
        tx.send(true).unwrap();

        let stats_a = tokio::time::timeout(Duration::from_secs(5), node_a.join()).await.unwrap().unwrap();
        let stats_b = tokio::time::timeout(Duration::from_secs(5), node_b.join()).await.unwrap().unwrap();

        let mut receives = 0;
        for (name, stats) in [("A", &stats_a), ("B", &stats_b)] {
            let text = std::fs::read_to_string(log_dir.join(format!("{}.log", name))).unwrap();
            let records = parse_log(&text).unwrap();
            assert_eq!(records.len() as u64, stats.ticks);
            assert!(records.windows(2).all(|w| w[1].logical_clock > w[0].logical_clock));
            receives += records.iter().filter(|r| r.event_type() == EventType::Receive).count();
        }

        assert!(stats_a.messages_sent + stats_b.messages_sent > 0);
        assert!(receives > 0);

        std::fs::remove_dir_all(&log_dir).ok();
    }

    #[tokio::test]
    async fn test_unknown_node_is_rejected() {
        let options = NodeOptions {
            log_dir: std::env::temp_dir(),
            peer_count: DEFAULT_PEER_COUNT,
            send_timeout: Duration::from_millis(100),
            seed: None,
        };
        let (_tx, rx) = watch::channel(false);
        let result = spawn_node(&ClusterConfig::triangle(), id("Q"), &options, rx).await;
        assert!(result.is_err());
    }
}
