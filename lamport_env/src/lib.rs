//! Lamport Environment Abstraction Layer
//!
//! This crate provides the abstraction allowing a Lamport clock node to run
//! in both **Production** (tokio + TCP) and **Simulation** (virtual time +
//! in-memory links) environments.
//!
//! # Core Concept: The Reactor Pattern
//!
//! Every source of non-determinism a node touches is behind a trait:
//! - Time (`now()`, `sleep()`)
//! - Randomness (`roll()`)
//! - Network (`PeerLink::send()` outbound, `RequestHandler::handle()` inbound)
//!
//! By deriving all entropy from a single 64-bit seed, any run of the
//! simulator becomes reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use lamport_env::{NodeContext, PeerLink};
//!
//! async fn node_loop<Ctx: NodeContext, Link: PeerLink>(ctx: &Ctx, link: &Link) {
//!     loop {
//!         ctx.sleep(Duration::from_millis(250)).await;
//!         if ctx.roll(1, 10) == 1 {
//!             let _ = link.send(&peer, Message::new(clock, "A")).await;
//!         }
//!     }
//! }
//! ```

mod context;
mod network;
mod types;
mod error;
mod tokio_impl;
mod tcp;

pub use context::NodeContext;
pub use network::{NetworkController, PeerLink, RequestHandler};
pub use types::{Message, MessageReply, NodeId, PeerAddress};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use tcp::{serve_tcp, TcpPeerLink, DEFAULT_SEND_TIMEOUT, MAX_REQUEST_LEN};
