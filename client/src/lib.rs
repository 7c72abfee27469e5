//! # Dungeon Client Library
//!
//! Headless terminal client for the dungeon server. It mirrors the world
//! from the packets the server streams, keeps its own fog of war, and turns
//! typed commands into intents.
//!
//! ## Modules
//!
//! ### Game Module (`game`)
//! Client-side model of the world:
//! - Applies `Welcome`, actor snapshots, field updates and tombstones
//! - Reveals fog around our own actor as it moves
//! - Answers which glyph and colour each cell shows
//! - Pre-checks moves and attacks without changing anything
//! - Kill-feed lines that fade after a number of reads
//!
//! ### Input Module (`input`)
//! Parses one typed line into a command. A blank line repeats the last one.
//!
//! ### Network Module (`network`)
//! The join handshake on the session stream, intents over datagrams, and the
//! interactive loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use shared::Payload;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), shared::GameError> {
//!     let mut client = Client::connect("127.0.0.1", 12000, 12001, "ann").await?;
//!     let player_id = client.game().player_id().unwrap_or_default();
//!
//!     client
//!         .send_intent(Payload::Movement { player_id, dx: 1, dy: 0 })
//!         .await?;
//!     while client.receive().await? {
//!         if client.game().should_quit() {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
