//! Server network layer: datagram intake, stream sessions and the tick loop

use crate::client_manager::{Client, ClientManager};
use crate::config::ServerConfig;
use crate::game::{GameState, SharedGame};
use log::{debug, error, info, warn};
use shared::{ActorId, GameError, Packet, Payload, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::RwLock;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};

/// How long a blocking receive waits before re-checking the quit flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// A new stream connection must send its `Join` within this window.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared quit flag polled by every server loop.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owns the sockets and runs the three long-lived server tasks
pub struct Server {
    config: ServerConfig,
    udp: Arc<UdpSocket>,
    tcp: TcpListener,
    game: SharedGame,
    clients: Arc<RwLock<ClientManager>>,
    shutdown: Shutdown,
}

impl Server {
    /// Builds the world and binds both sockets.
    pub async fn bind(config: ServerConfig) -> Result<Self, GameError> {
        let game = GameState::new(&config);
        Self::bind_with(config, game).await
    }

    /// Binds both sockets around an existing world.
    pub async fn bind_with(config: ServerConfig, game: GameState) -> Result<Self, GameError> {
        let udp = Arc::new(UdpSocket::bind(config.udp_addr()).await?);
        let tcp = TcpListener::bind(config.tcp_addr()).await?;
        info!(
            "Server listening on udp {} and tcp {}",
            udp.local_addr()?,
            tcp.local_addr()?
        );

        Ok(Server {
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            game: SharedGame::new(game),
            shutdown: Shutdown::new(),
            config,
            udp,
            tcp,
        })
    }

    pub fn udp_addr(&self) -> Result<SocketAddr, GameError> {
        Ok(self.udp.local_addr()?)
    }

    pub fn tcp_addr(&self) -> Result<SocketAddr, GameError> {
        Ok(self.tcp.local_addr()?)
    }

    pub fn game(&self) -> SharedGame {
        self.game.clone()
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Asks every loop to stop. `run` returns once they have.
    pub fn quit(&self) {
        self.shutdown.trigger();
    }

    /// Runs until the quit flag is set
    pub async fn run(self) -> Result<(), GameError> {
        let Server {
            config,
            udp,
            tcp,
            game,
            clients,
            shutdown,
        } = self;

        let datagrams = tokio::spawn(run_datagram_loop(
            udp,
            game.clone(),
            shutdown.clone(),
            config.udp_intake_delay,
        ));
        let sessions = tokio::spawn(run_accept_loop(
            tcp,
            game.clone(),
            Arc::clone(&clients),
            shutdown.clone(),
        ));
        let ticks = tokio::spawn(run_tick_loop(
            game,
            clients,
            shutdown,
            config.tick_duration(),
        ));

        info!("Server started successfully");
        let (a, b, c) = tokio::join!(datagrams, sessions, ticks);
        for result in [a, b, c] {
            if let Err(e) = result {
                error!("Server task panicked: {}", e);
            }
        }
        info!("Server stopped");
        Ok(())
    }
}

/// Receives intents. Each datagram is copied out and handled on its own
/// task, so a bad packet never stalls the loop.
async fn run_datagram_loop(
    socket: Arc<UdpSocket>,
    game: SharedGame,
    shutdown: Shutdown,
    intake_delay: Duration,
) {
    let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

    while !shutdown.is_triggered() {
        match timeout(POLL_INTERVAL, socket.recv_from(&mut buffer)).await {
            Err(_) => continue,
            Ok(Ok((len, addr))) => {
                let data = buffer[..len].to_vec();
                buffer[..len].fill(0);

                let game = game.clone();
                tokio::spawn(async move {
                    handle_datagram(&game, &data, addr).await;
                });
            }
            Ok(Err(e)) => {
                error!("Error receiving datagram: {}", e);
                sleep(Duration::from_millis(10)).await;
            }
        }

        if !intake_delay.is_zero() {
            sleep(intake_delay).await;
        }
    }
    debug!("Datagram loop stopped");
}

async fn handle_datagram(game: &SharedGame, data: &[u8], addr: SocketAddr) {
    let packet = match Packet::decode_bytes(data) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("Dropping datagram from {}: {}", addr, e);
            return;
        }
    };

    let kind = packet.payload.kind();
    if let Err(e) = game.with(|g| g.handle_packet(packet)).await {
        log_rejection(kind, addr, &e);
    }
}

fn log_rejection(kind: &str, addr: SocketAddr, e: &GameError) {
    match e {
        GameError::RejectedIntent(_) => debug!("{} from {} rejected: {}", kind, addr, e),
        _ => warn!("{} from {} failed: {}", kind, addr, e),
    }
}

async fn run_accept_loop(
    listener: TcpListener,
    game: SharedGame,
    clients: Arc<RwLock<ClientManager>>,
    shutdown: Shutdown,
) {
    while !shutdown.is_triggered() {
        match timeout(POLL_INTERVAL, listener.accept()).await {
            Err(_) => continue,
            Ok(Ok((stream, addr))) => {
                debug!("Stream connection from {}", addr);
                let game = game.clone();
                let clients = Arc::clone(&clients);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_session(stream, addr, game, clients, shutdown).await {
                        warn!("Session with {} ended with error: {}", addr, e);
                    }
                });
            }
            Ok(Err(e)) => {
                error!("Error accepting connection: {}", e);
                sleep(Duration::from_millis(10)).await;
            }
        }
    }
    debug!("Accept loop stopped");
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    let mut bytes = Vec::with_capacity(line.len() + 1);
    bytes.extend_from_slice(line.as_bytes());
    bytes.push(b'\n');
    writer.write_all(&bytes).await
}

/// Drains one client's queue onto its socket. A write failure ends only this
/// task; the registry notices when the queue closes.
async fn run_writer(mut writer: OwnedWriteHalf, mut outbox: UnboundedReceiver<String>, addr: SocketAddr) {
    while let Some(line) = outbox.recv().await {
        if let Err(e) = write_line(&mut writer, &line).await {
            warn!("Write to {} failed: {}", addr, e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Player id an intent claims to act for.
fn claimed_player(payload: &Payload) -> Option<ActorId> {
    match payload {
        Payload::Movement { player_id, .. } | Payload::Attack { player_id, .. } => {
            Some(*player_id)
        }
        Payload::Update(update) => Some(update.actor_id),
        _ => None,
    }
}

async fn reject(writer: &mut OwnedWriteHalf, game: &SharedGame, reason: String) -> Result<(), GameError> {
    let line = game
        .with(|g| g.stamp(Payload::Rejected { reason }))
        .await
        .encode()?;
    write_line(writer, &line).await?;
    writer.shutdown().await?;
    Ok(())
}

/// One client's stream session: handshake, then intents until `Quit`, EOF or
/// an I/O error.
async fn run_session(
    stream: TcpStream,
    addr: SocketAddr,
    game: SharedGame,
    clients: Arc<RwLock<ClientManager>>,
    shutdown: Shutdown,
) -> Result<(), GameError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let first = match timeout(JOIN_TIMEOUT, lines.next_line()).await {
        Ok(Ok(Some(line))) => line,
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return reject(&mut writer, &game, "join timed out".to_string()).await;
        }
    };

    let name = match Packet::decode(&first) {
        Ok(Packet {
            payload: Payload::Join { name },
            ..
        }) => name,
        Ok(other) => {
            let reason = format!("expected join, got {}", other.payload.kind());
            return reject(&mut writer, &game, reason).await;
        }
        Err(e) => return reject(&mut writer, &game, e.to_string()).await,
    };

    if clients.read().await.is_full() {
        info!("Rejecting {} from {}: server full", name, addr);
        return reject(&mut writer, &game, "server full".to_string()).await;
    }

    // Join and greeting are built in one critical section so the snapshot
    // matches the moment the player appeared.
    let joined = game
        .with(|g| {
            let player_id = g.add_player(&name)?;
            let mut greeting = vec![g.stamp(Payload::Welcome {
                player_id,
                dungeon: g.dungeon().clone(),
            })];
            greeting.extend(g.snapshot_packets());
            greeting.extend(g.score_packets());
            Ok::<_, GameError>((player_id, greeting))
        })
        .await;
    let (player_id, greeting) = match joined {
        Ok(joined) => joined,
        Err(e) => {
            info!("Rejecting {} from {}: {}", name, addr, e);
            return reject(&mut writer, &game, e.to_string()).await;
        }
    };

    let greeting: Vec<String> = greeting
        .iter()
        .filter_map(|packet| match packet.encode() {
            Ok(line) => Some(line),
            Err(e) => {
                error!("Failed to encode greeting {} for {}: {}", packet.id, name, e);
                None
            }
        })
        .collect();

    // The greeting is queued under the registry lock, so no broadcast can
    // overtake the Welcome.
    let (outbox, queue) = unbounded_channel::<String>();
    let registered = {
        let mut registry = clients.write().await;
        let added = registry.add_client(Client::new(player_id, name.clone(), addr, outbox));
        if added {
            for line in &greeting {
                registry.send_to(player_id, line);
            }
        }
        added
    };

    if !registered {
        game.with(|g| {
            g.remove_player(player_id);
            g.forget_score(&name);
        })
        .await;
        info!("Rejecting {} from {}: server full", name, addr);
        return reject(&mut writer, &game, "server full".to_string()).await;
    }
    let writer_task = tokio::spawn(run_writer(writer, queue, addr));

    let outcome = read_intents(&mut lines, player_id, addr, &game, &shutdown).await;

    clients.write().await.remove_client(&player_id);
    game.with(|g| {
        g.remove_player(player_id);
        g.forget_score(&name);
    })
    .await;
    let _ = writer_task.await;
    info!("Session for {} ({}) closed", name, player_id);
    outcome
}

async fn read_intents<R>(
    lines: &mut tokio::io::Lines<R>,
    player_id: ActorId,
    addr: SocketAddr,
    game: &SharedGame,
    shutdown: &Shutdown,
) -> Result<(), GameError>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    while !shutdown.is_triggered() {
        let line = match timeout(POLL_INTERVAL, lines.next_line()).await {
            Err(_) => continue,
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(e)) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }

        let packet = match Packet::decode(&line) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping line from {}: {}", addr, e);
                continue;
            }
        };

        if packet.payload == Payload::Quit {
            debug!("Player {} quit", player_id);
            return Ok(());
        }
        if let Some(claimed) = claimed_player(&packet.payload) {
            if claimed != player_id {
                warn!(
                    "Session {} sent an intent for player {}; dropped",
                    player_id, claimed
                );
                continue;
            }
        }

        let kind = packet.payload.kind();
        if let Err(e) = game.with(|g| g.handle_packet(packet)).await {
            log_rejection(kind, addr, &e);
        }
    }
    Ok(())
}

/// Advances the world at a fixed rate and fans out what each tick produced
async fn run_tick_loop(
    game: SharedGame,
    clients: Arc<RwLock<ClientManager>>,
    shutdown: Shutdown,
    tick_duration: Duration,
) {
    let mut ticker = interval(tick_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !shutdown.is_triggered() {
        ticker.tick().await;

        let (tick, outgoing) = game
            .with(|g| {
                g.tick();
                (g.tick, g.drain_outgoing())
            })
            .await;

        if !outgoing.is_empty() {
            let clients = clients.read().await;
            for packet in &outgoing {
                match packet.encode() {
                    Ok(line) => {
                        clients.broadcast(&line);
                    }
                    Err(e) => error!("Failed to encode {} packet: {}", packet.payload.kind(), e),
                }
            }
        }

        if tick % 500 == 0 {
            let client_count = clients.read().await.len();
            debug!("Tick {}: {} clients", tick, client_count);
        }
    }
    debug!("Tick loop stopped");
}
