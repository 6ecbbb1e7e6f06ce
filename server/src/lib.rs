//! # Tick Server Library
//!
//! Authoritative server for a fixed-rate, snapshot-replicated world. Clients
//! send intents over UDP; the server alone decides where every entity is and
//! broadcasts the full world state once per tick.
//!
//! ## Tick Pipeline
//!
//! Every tick runs four phases in order:
//!
//! 1. **Draining** - decode inbound datagrams, create or refresh sessions,
//!    record movement intents and actions
//! 2. **Scheduling** - run one job per live entity on a fixed worker pool,
//!    each reading only the previous snapshot
//! 3. **Sweeping** - evict sessions that went silent past the timeout
//! 4. **Publishing** - merge the job outputs into a new immutable snapshot
//!    and send it to every active session
//!
//! Session bookkeeping only happens on the tick thread. The worker pool
//! never touches sessions, and jobs never see each other's output, so the
//! published snapshot is the same regardless of worker count.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Peer lifecycle from handshake to timeout, held intents, outbound replies.
//!
//! ### Simulation Module (`simulation`)
//! Per-entity update rules and the pluggable spawn/despawn policy.
//!
//! ### Scheduler Module (`scheduler`)
//! Worker pool running a tick's jobs with per-job fault isolation.
//!
//! ### Replication Module (`replication`)
//! Double-buffered snapshots and the merge that builds the next one.
//!
//! ### Network Module (`network`)
//! The [`network::ServerNetworkManager`] tying the phases together.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::ServerNetworkManager;
//! use server::simulation::WaveSpawnPolicy;
//! use shared::{SystemClock, UdpTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = UdpTransport::bind("127.0.0.1:8080").await?;
//!     let mut server = ServerNetworkManager::new(
//!         ServerConfig::default(),
//!         Box::new(transport),
//!         Box::new(SystemClock::new()),
//!         Box::new(WaveSpawnPolicy::new(7)),
//!     )?;
//!
//!     // Ticks at the configured rate until Ctrl+C
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod replication;
pub mod scheduler;
pub mod session;
pub mod simulation;
