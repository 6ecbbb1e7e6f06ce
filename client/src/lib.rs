//! # Tick Client Library
//!
//! Headless client for the tick server. It joins with a handshake, sends
//! movement and action intents, and mirrors the server's world from the
//! snapshots it receives. There is no prediction: the view is always the
//! last snapshot the server published that arrived in order.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! [`game::ClientWorldView`], the last applied snapshot keyed by entity.
//! Late and duplicate snapshots are dropped by tick number.
//!
//! ### Network Module (`network`)
//! [`network::ClientNetworkManager`] handles the connection lifecycle:
//! - Handshake with retries until acknowledged
//! - Sequenced commands for movement and firing
//! - Periodic pings for round-trip measurement
//! - Server silence timeout and disconnect notices
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{ClientConfig, ClientNetworkManager};
//! use shared::{NetworkManager, SystemClock, UdpTransport, Vec2};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = UdpTransport::bind("0.0.0.0:0").await?;
//!     let mut client = ClientNetworkManager::new(
//!         ClientConfig::new("127.0.0.1:8080".parse()?),
//!         Box::new(transport),
//!         Box::new(SystemClock::new()),
//!     );
//!     client.connect()?;
//!
//!     loop {
//!         client.update();
//!         for event in client.poll_events() {
//!             println!("{:?}", event);
//!         }
//!         let _ = client.send_move(Vec2::new(1.0, 0.0));
//!         tokio::time::sleep(std::time::Duration::from_millis(16)).await;
//!     }
//! }
//! ```

pub mod error;
pub mod game;
pub mod network;
