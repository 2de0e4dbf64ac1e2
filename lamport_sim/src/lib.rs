//! Deterministic simulation harness for Lamport clock clusters.
//!
//! The same `NodeProcess` that runs over TCP runs here against a virtual
//! clock, an in-process network and seeded randomness, so a whole cluster
//! replays bit-for-bit from one 64-bit seed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        SimWorld                          │
//! │   virtual clock ── earliest deadline picks next tick     │
//! │                                                          │
//! │  ┌──────────┐   SimNetwork    ┌──────────┐               │
//! │  │ Node A   │ ──────────────► │ Node B   │   ...         │
//! │  │ ctx fork │  JSON request   │ server → │               │
//! │  └──────────┘                 │ inbox    │               │
//! │        ▲                      └──────────┘               │
//! │        └─── SimNetworkController (partition/latency/loss)│
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use lamport_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Partition).await;
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod network;
mod runner;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{summary_table, write_logs, NodeExport, SimExport};
pub use network::{Endpoints, SimNetwork, SimNetworkController, SIM_SEND_TIMEOUT};
pub use runner::{check_invariants, NodeSummary, ScenarioMetrics, ScenarioOutcome, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use world::{NodeHandle, SimConfig, SimNode, SimWorld};
