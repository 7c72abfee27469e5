//! Integration tests for the dungeon server and client
//!
//! Every test runs a real server on loopback ports chosen by the OS and talks
//! to it with the real client.

use client::game::ClientGameState;
use client::network::Client;
use serde_json::json;
use server::config::ServerConfig;
use server::game::GameState;
use server::network::{Server, Shutdown};
use shared::{ActorId, Dungeon, GameError, Payload, Point3, Tile};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_test::assert_ok;

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    udp: SocketAddr,
    tcp: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), GameError>>,
}

impl TestServer {
    async fn start(dungeon: Dungeon, max_clients: usize) -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            udp_port: 0,
            tcp_port: 0,
            tick_rate: 100,
            udp_intake_delay: Duration::ZERO,
            attack_windup_ticks: 2,
            max_clients,
            ..ServerConfig::default()
        };
        let server = Server::bind_with(config, GameState::with_dungeon(dungeon, 2, 7))
            .await
            .unwrap();
        TestServer {
            udp: server.udp_addr().unwrap(),
            tcp: server.tcp_addr().unwrap(),
            shutdown: server.shutdown_handle(),
            task: tokio::spawn(server.run()),
        }
    }

    async fn connect(&self, name: &str) -> Result<Client, GameError> {
        Client::connect("127.0.0.1", self.udp.port(), self.tcp.port(), name).await
    }

    /// Connects and waits until the client has seen its own actor.
    async fn join(&self, name: &str) -> Client {
        let mut client = assert_ok!(self.connect(name).await);
        assert!(pump_until(&mut client, ClientGameState::is_ready).await);
        client
    }

    async fn stop(self) {
        self.shutdown.trigger();
        assert_ok!(self.task.await.unwrap());
    }
}

fn room() -> Dungeon {
    Dungeon::from_fn(|p| {
        if (1..=20).contains(&p.x) && (1..=10).contains(&p.y) && p.z == 0 {
            Tile::Floor
        } else {
            Tile::Wall
        }
    })
}

/// Three floor cells in a row; two players are always within a step of
/// each other.
fn corridor() -> Dungeon {
    Dungeon::from_fn(|p| {
        if p.y == 1 && (1..=3).contains(&p.x) && p.z == 0 {
            Tile::Floor
        } else {
            Tile::Wall
        }
    })
}

/// Feeds packets into the client until `done` holds. False on timeout or a
/// closed stream.
async fn pump_until(client: &mut Client, done: impl Fn(&ClientGameState) -> bool) -> bool {
    let waited = timeout(WAIT, async {
        while !done(client.game()) {
            match client.receive().await {
                Ok(true) => {}
                _ => return false,
            }
        }
        true
    })
    .await;
    waited.unwrap_or(false)
}

fn position_of(game: &ClientGameState, id: ActorId) -> Option<Point3> {
    if game.player_id() == Some(id) {
        game.me().map(|me| me.pos)
    } else {
        game.actor(id).map(|actor| actor.pos)
    }
}

fn free_step(client: &Client) -> (i32, i32) {
    const STEPS: [(i32, i32); 8] = [
        (1, 0),
        (-1, 0),
        (0, 1),
        (0, -1),
        (1, 1),
        (-1, -1),
        (1, -1),
        (-1, 1),
    ];
    STEPS
        .into_iter()
        .find(|(dx, dy)| client.game().attempt_move(*dx, *dy))
        .unwrap()
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    /// A join is answered with the map, our own actor and the score table
    #[tokio::test]
    async fn join_handshake_delivers_world() {
        let server = TestServer::start(room(), 4).await;
        let ann = server.join("ann").await;

        let me = ann.game().me().unwrap();
        assert_eq!(me.name, "ann");
        assert_eq!(me.health, shared::PLAYER_START_HEALTH);
        assert_eq!(me.pos.z, 0);
        assert_eq!(ann.game().score_lines(), vec!["0/0-ann"]);
        assert!(!ann.game().dungeon().unwrap().is_unrevealed(me.pos.x, me.pos.y, 0));

        server.stop().await;
    }

    /// Later joiners see earlier players in their snapshot, and earlier
    /// players hear about the newcomer
    #[tokio::test]
    async fn players_see_each_other() {
        let server = TestServer::start(room(), 4).await;
        let mut ann = server.join("ann").await;
        let bob = server.join("bob").await;

        let ann_id = ann.game().player_id().unwrap();
        let bob_id = bob.game().player_id().unwrap();
        assert_ne!(ann_id, bob_id);
        assert!(bob.game().actor(ann_id).is_some());

        assert!(pump_until(&mut ann, |g| g.actor(bob_id).is_some()).await);
        assert_eq!(ann.game().score_lines().len(), 2);

        server.stop().await;
    }

    #[tokio::test]
    async fn full_server_refuses_join() {
        let server = TestServer::start(room(), 1).await;
        let _ann = server.join("ann").await;

        match server.connect("bob").await {
            Err(GameError::JoinRefused(reason)) => assert_eq!(reason, "server full"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("second join should be refused"),
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn duplicate_name_refused() {
        let server = TestServer::start(room(), 4).await;
        let _ann = server.join("ann").await;

        match server.connect("ann").await {
            Err(GameError::JoinRefused(reason)) => assert!(reason.contains("name already in use")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("duplicate name should be refused"),
        }

        server.stop().await;
    }

    /// Quitting removes the player for everyone else
    #[tokio::test]
    async fn quit_broadcasts_tombstone() {
        let server = TestServer::start(room(), 4).await;
        let mut ann = server.join("ann").await;
        let mut bob = server.join("bob").await;
        let bob_id = bob.game().player_id().unwrap();
        assert!(pump_until(&mut ann, |g| g.actor(bob_id).is_some()).await);

        assert_ok!(bob.quit().await);

        assert!(pump_until(&mut ann, |g| g.actor(bob_id).is_none()).await);
        assert_eq!(ann.game().score_lines(), vec!["0/0-ann"]);

        // The name is free again.
        let _bob = server.join("bob").await;

        server.stop().await;
    }
}

/// INTENT TESTS
mod intent_tests {
    use super::*;

    /// A movement sent over datagrams reaches every session as an update
    #[tokio::test]
    async fn movement_is_broadcast() {
        let server = TestServer::start(room(), 4).await;
        let mut ann = server.join("ann").await;
        let mut bob = server.join("bob").await;
        let ann_id = ann.game().player_id().unwrap();
        let bob_id = bob.game().player_id().unwrap();
        assert!(pump_until(&mut ann, |g| g.actor(bob_id).is_some()).await);

        let start = ann.game().me().unwrap().pos;
        let (dx, dy) = free_step(&ann);
        let target = start.offset(Point3::planar(dx, dy));

        assert_ok!(
            ann.send_intent(Payload::Movement {
                player_id: ann_id,
                dx,
                dy
            })
            .await
        );

        assert!(pump_until(&mut bob, |g| position_of(g, ann_id) == Some(target)).await);
        assert!(pump_until(&mut ann, |g| position_of(g, ann_id) == Some(target)).await);

        server.stop().await;
    }

    /// Malformed and illegal datagrams change nothing and do not stop the
    /// intake loop
    #[tokio::test]
    async fn bad_datagrams_are_isolated() {
        let server = TestServer::start(room(), 4).await;
        let mut ann = server.join("ann").await;
        let ann_id = ann.game().player_id().unwrap();
        let start = ann.game().me().unwrap().pos;

        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let junk = [
            b"not json at all".to_vec(),
            vec![0xff; 32],
            json!({"id": 1, "payload": {"type": "movement", "player_id": ann_id, "dx": 5, "dy": 0}})
                .to_string()
                .into_bytes(),
            json!({"id": 2, "payload": {"type": "movement", "player_id": 999, "dx": 1, "dy": 0}})
                .to_string()
                .into_bytes(),
            json!({"id": 3, "payload": {"type": "update", "actor_id": ann_id, "changes": []}})
                .to_string()
                .into_bytes(),
        ];
        for datagram in &junk {
            raw.send_to(datagram, server.udp).await.unwrap();
        }

        let (dx, dy) = free_step(&ann);
        let target = start.offset(Point3::planar(dx, dy));
        assert_ok!(
            ann.send_intent(Payload::Movement {
                player_id: ann_id,
                dx,
                dy
            })
            .await
        );

        assert!(pump_until(&mut ann, |g| position_of(g, ann_id) == Some(target)).await);
        assert_eq!(ann.game().me().unwrap().health, shared::PLAYER_START_HEALTH);

        server.stop().await;
    }

    /// Two players fight it out in a corridor until one dies
    #[tokio::test]
    async fn attacks_kill_and_score() {
        let server = TestServer::start(corridor(), 4).await;
        let mut ann = server.join("ann").await;
        let mut bob = server.join("bob").await;
        let ann_id = ann.game().player_id().unwrap();
        let bob_id = bob.game().player_id().unwrap();
        assert!(pump_until(&mut ann, |g| g.actor(bob_id).is_some()).await);

        let bob_x = ann.game().actor(bob_id).unwrap().pos.x;
        let ann_x = ann.game().me().unwrap().pos.x;
        let dx = (bob_x - ann_x).signum();
        if (bob_x - ann_x).abs() == 2 {
            assert_ok!(
                ann.send_intent(Payload::Movement {
                    player_id: ann_id,
                    dx,
                    dy: 0
                })
                .await
            );
            let target = Point3::new(ann_x + dx, 1, 0);
            assert!(pump_until(&mut ann, |g| position_of(g, ann_id) == Some(target)).await);
        }

        for _ in 0..shared::PLAYER_START_HEALTH {
            let before = ann.game().actor(bob_id).map(|b| b.health);
            assert!(ann.game().attempt_attack(dx, 0));
            assert_ok!(
                ann.send_intent(Payload::Attack {
                    player_id: ann_id,
                    dx,
                    dy: 0
                })
                .await
            );
            assert!(
                pump_until(&mut ann, |g| g.actor(bob_id).map(|b| b.health) != before).await
            );
            assert!(pump_until(&mut ann, |g| !g.me().unwrap().is_attacking()).await);
        }

        assert!(ann.game().actor(bob_id).is_none());
        assert!(
            pump_until(&mut ann, |g| g.scores().get("ann").map(|s| s.kills) == Some(1)).await
        );
        assert_eq!(ann.game_mut().messages(), vec!["ann k bob"]);
        assert!(
            pump_until(&mut ann, |g| g.scores().get("bob").map(|s| s.deaths) == Some(1)).await
        );
        assert!(pump_until(&mut bob, ClientGameState::should_quit).await);
        assert_eq!(bob.game().me().unwrap().health, 0);

        server.stop().await;
    }
}
