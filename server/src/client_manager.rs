//! Registry of connected stream sessions.
//!
//! Each joined client owns a TCP session. The session's writer task drains
//! an unbounded queue of already encoded lines; this registry holds the
//! sending half of every queue so the tick loop can fan packets out without
//! touching any socket itself.
//!
//! A slow or broken client only ever affects its own queue.

use log::{debug, info};
use shared::ActorId;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// A joined client and the queue feeding its writer task
#[derive(Debug)]
pub struct Client {
    /// Id of the player actor this session controls
    pub player_id: ActorId,
    pub name: String,
    /// Peer address of the stream socket
    pub addr: SocketAddr,
    pub connected_at: Instant,
    outbox: UnboundedSender<String>,
}

impl Client {
    pub fn new(
        player_id: ActorId,
        name: impl Into<String>,
        addr: SocketAddr,
        outbox: UnboundedSender<String>,
    ) -> Self {
        Self {
            player_id,
            name: name.into(),
            addr,
            connected_at: Instant::now(),
            outbox,
        }
    }

    /// Queues one encoded line for the writer task
    ///
    /// Returns false once the writer has gone away, which happens when the
    /// socket failed or the session ended.
    pub fn send(&self, line: &str) -> bool {
        self.outbox.send(line.to_string()).is_ok()
    }
}

/// All live sessions, keyed by player id
///
/// Enforces the server's capacity limit. Iteration order is ascending player
/// id, so every client sees broadcasts in the same relative order.
pub struct ClientManager {
    clients: BTreeMap<ActorId, Client>,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            max_clients,
        }
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Registers a session
    ///
    /// Returns false, leaving the registry untouched, when the server is at
    /// capacity or the player id is already registered.
    pub fn add_client(&mut self, client: Client) -> bool {
        if self.is_full() || self.clients.contains_key(&client.player_id) {
            return false;
        }

        info!(
            "Client {} ({}) connected from {}",
            client.player_id, client.name, client.addr
        );
        self.clients.insert(client.player_id, client);
        true
    }

    /// Drops a session. Returns the removed client if it was registered.
    pub fn remove_client(&mut self, player_id: &ActorId) -> Option<Client> {
        let client = self.clients.remove(player_id)?;
        info!(
            "Client {} ({}) disconnected after {:.1}s",
            client.player_id,
            client.name,
            client.connected_at.elapsed().as_secs_f32()
        );
        Some(client)
    }

    /// Queues a line for a single client. Returns false if the client is
    /// unknown or its writer is gone.
    pub fn send_to(&self, player_id: ActorId, line: &str) -> bool {
        self.clients
            .get(&player_id)
            .is_some_and(|client| client.send(line))
    }

    /// Queues a line for every client
    ///
    /// Returns the ids whose writer has already stopped. Those sessions are
    /// on their way out and are cleaned up by their own reader task.
    pub fn broadcast(&self, line: &str) -> Vec<ActorId> {
        let failed: Vec<ActorId> = self
            .clients
            .values()
            .filter(|client| !client.send(line))
            .map(|client| client.player_id)
            .collect();
        if !failed.is_empty() {
            debug!("Broadcast skipped closed sessions {:?}", failed);
        }
        failed
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
