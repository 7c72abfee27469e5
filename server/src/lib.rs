//! # Dungeon Server Library
//!
//! Authoritative server for the multiplayer dungeon crawl. It owns the only
//! true copy of the dungeon and every actor in it, applies client intents,
//! and streams state changes back to all connected clients.
//!
//! ## Channels
//!
//! Clients talk to the server over two sockets:
//!
//! - **Datagram (UDP)**: movement, attack and update intents. Lossy and
//!   unordered; each datagram is decoded and applied on its own task.
//! - **Stream (TCP)**: one session per client. The client opens with `Join`
//!   and receives `Welcome`, a snapshot of every actor and the score table.
//!   All broadcasts travel here, one JSON packet per line.
//!
//! ## Concurrency
//!
//! All world state lives in a single [`game::GameState`] behind
//! [`game::SharedGame`]. Every logical operation (a join, one intent, one
//! tick) runs in exactly one critical section. Packets produced by intents
//! are queued inside the state and go out, in order, after the next tick.
//! The session registry sits behind its own lock, always taken after the
//! game lock and never while holding it.
//!
//! ## Modules
//!
//! - [`ai`]: pluggable behaviour for autonomous actors
//! - [`client_manager`]: registry of stream sessions and their outgoing queues
//! - [`config`]: runtime settings
//! - [`game`]: world state, intent validation, combat and scoring
//! - [`network`]: sockets, sessions and the tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     let shutdown = server.shutdown_handle();
//!
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.trigger();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod ai;
pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
