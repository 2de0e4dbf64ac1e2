//! Lamport node launcher
//!
//! Starts every configured node (or just `--node`) in this process. Each
//! node gets a message server task and an event-loop task and writes its
//! events to `<log-dir>/<NODE>.log`. Ctrl-C stops everything.

use anyhow::{Context, Result};
use clap::Parser;
use lamport_core::{ClusterConfig, DEFAULT_PEER_COUNT};
use lamport_env::NodeId;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cluster;

use cluster::{spawn_node, NodeOptions};

#[derive(Parser, Debug)]
#[command(name = "lamport-node")]
#[command(about = "Run Lamport logical clock nodes over TCP", long_about = None)]
struct Args {
    /// Cluster config (`{"VMs": [...]}`); the A/B/C reference cluster when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for per-node event logs
    #[arg(short, long, default_value = "logs")]
    log_dir: PathBuf,

    /// Run only this node (others are expected elsewhere)
    #[arg(short, long)]
    node: Option<String>,

    /// Peers each node sends to
    #[arg(short, long, default_value_t = DEFAULT_PEER_COUNT)]
    peers: usize,

    /// Bound on each outbound send, in milliseconds
    #[arg(long, default_value = "1000")]
    send_timeout_ms: u64,

    /// Seed for reproducible branch rolls
    #[arg(long)]
    seed: Option<u64>,

    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();

    let cluster = match &args.config {
        Some(path) => ClusterConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ClusterConfig::triangle(),
    };

    let ids: Vec<NodeId> = match &args.node {
        Some(name) => {
            let id = NodeId::parse(name).with_context(|| format!("invalid node name {:?}", name))?;
            vec![id]
        }
        None => cluster.ids(),
    };

    let options = NodeOptions {
        log_dir: args.log_dir.clone(),
        peer_count: args.peers,
        send_timeout: Duration::from_millis(args.send_timeout_ms),
        seed: args.seed,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut running = Vec::with_capacity(ids.len());
    for id in ids {
        running.push(spawn_node(&cluster, id, &options, shutdown_rx.clone()).await?);
    }
    info!(nodes = running.len(), log_dir = %args.log_dir.display(), "cluster running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutting down");
    // Fails only when every receiver is already gone.
    let _ = shutdown_tx.send(true);

    for node in running {
        let id = node.id;
        match node.join().await {
            Ok(stats) => info!(
                node = %id,
                ticks = stats.ticks,
                sends = stats.send_events,
                failed = stats.failed_sends,
                receives = stats.receives,
                "node stopped"
            ),
            Err(e) => error!(node = %id, error = %e, "node did not stop cleanly"),
        }
    }

    Ok(())
}
