use crate::game::ClientGameState;
use crate::input::{Command, InputManager, HELP};
use log::{debug, error, info, warn};
use shared::{GameError, IdAllocator, Packet, Payload};
use std::io::{Error as IoError, ErrorKind};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream, UdpSocket};

fn closed() -> GameError {
    GameError::TransportFault(IoError::new(
        ErrorKind::UnexpectedEof,
        "server closed the connection",
    ))
}

pub struct Client {
    udp: UdpSocket,
    server_udp: SocketAddr,
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    game: ClientGameState,
    input: InputManager,
    packet_ids: IdAllocator,
}

impl Client {
    /// Opens the session stream, sends `Join` and waits for the greeting.
    pub async fn connect(
        host: &str,
        udp_port: u16,
        tcp_port: u16,
        name: &str,
    ) -> Result<Self, GameError> {
        let server_udp = lookup_host((host, udp_port))
            .await?
            .next()
            .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("cannot resolve {}", host)))?;
        let udp = UdpSocket::bind(if server_udp.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        })
        .await?;

        let stream = TcpStream::connect((host, tcp_port)).await?;
        let (reader, writer) = stream.into_split();

        let mut client = Client {
            udp,
            server_udp,
            lines: BufReader::new(reader).lines(),
            writer,
            game: ClientGameState::new(name),
            input: InputManager::new(),
            packet_ids: IdAllocator::new(),
        };

        info!("Joining {} as {}", host, name);
        client
            .send_stream(Payload::Join {
                name: name.to_string(),
            })
            .await?;

        loop {
            let packet = client.next_packet().await?.ok_or_else(closed)?;
            match &packet.payload {
                Payload::Welcome { .. } => {
                    client.game.apply(packet);
                    return Ok(client);
                }
                Payload::Rejected { reason } => {
                    return Err(GameError::JoinRefused(reason.clone()));
                }
                _ => client.game.apply(packet),
            }
        }
    }

    pub fn game(&self) -> &ClientGameState {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut ClientGameState {
        &mut self.game
    }

    async fn send_stream(&mut self, payload: Payload) -> Result<(), GameError> {
        let mut line = Packet::stamped(&self.packet_ids, payload).encode()?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Fires an intent at the datagram port. Delivery is not confirmed.
    pub async fn send_intent(&self, payload: Payload) -> Result<(), GameError> {
        let packet = Packet::stamped(&self.packet_ids, payload);
        packet.validate()?;
        self.udp
            .send_to(packet.encode()?.as_bytes(), self.server_udp)
            .await?;
        Ok(())
    }

    /// Next well-formed packet from the stream, or `None` once it closes.
    /// Malformed lines are skipped.
    pub async fn next_packet(&mut self) -> Result<Option<Packet>, GameError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            match Packet::decode(&line) {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => warn!("Dropping malformed packet from server: {}", e),
            }
        }
    }

    /// Reads one packet and folds it into the local model.
    pub async fn receive(&mut self) -> Result<bool, GameError> {
        match self.next_packet().await? {
            Some(packet) => {
                debug!("Received {}", packet.payload.kind());
                self.game.apply(packet);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Sends `Quit` on the stream and closes our half.
    pub async fn quit(&mut self) -> Result<(), GameError> {
        self.game.set_quit();
        self.send_stream(Payload::Quit).await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) -> Result<(), GameError> {
        let Some(player_id) = self.game.player_id() else {
            return Ok(());
        };

        match command {
            Command::Move(dx, dy) if !self.game.attempt_move(dx, dy) => {
                println!("You can't go there.");
            }
            Command::Attack(dx, dy) if !self.game.attempt_attack(dx, dy) => {
                println!("You can't attack there.");
            }
            Command::Quit => self.quit().await?,
            Command::Look => self.draw(),
            Command::Scores => {
                for line in self.game.score_lines() {
                    println!("{}", line);
                }
            }
            Command::Unknown => println!("{}", HELP),
            _ => {
                if let Some(payload) = command.to_payload(player_id) {
                    self.send_intent(payload).await?;
                }
            }
        }
        Ok(())
    }

    fn draw(&mut self) {
        for row in self.game.render_floor() {
            println!("{}", row);
        }
        if let Some(me) = self.game.me() {
            println!("{} hp:{} floor:{}", me.name, me.health, me.pos.z);
        }
        for text in self.game.messages() {
            println!("{}", text);
        }
    }

    /// Interactive loop: commands from stdin, state from the stream.
    pub async fn run(&mut self) -> Result<(), GameError> {
        let mut stdin: Lines<BufReader<Stdin>> = BufReader::new(tokio::io::stdin()).lines();
        println!("{}", HELP);
        self.draw();

        while !self.game.should_quit() {
            tokio::select! {
                line = stdin.next_line() => {
                    match line? {
                        Some(line) => {
                            let command = self.input.parse(&line);
                            if let Err(e) = self.handle_command(command).await {
                                error!("Error sending command: {}", e);
                            }
                        }
                        None => self.quit().await?,
                    }
                }
                received = self.receive() => {
                    if !received? {
                        warn!("Server closed the connection");
                        break;
                    }
                    if matches!(self.game.me(), Some(me) if me.health > 0) {
                        self.draw();
                    }
                }
            }
        }

        if let Some(reason) = self.game.rejection() {
            println!("Rejected: {}", reason);
        } else if self.game.me().is_some_and(|me| me.health <= 0) {
            println!("You died.");
        }
        Ok(())
    }
}
