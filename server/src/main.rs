use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind both sockets to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Datagram port for intents
    #[clap(short, long, default_value = "12000")]
    udp_port: u16,
    /// Stream port for sessions and broadcasts
    #[clap(short = 'p', long, default_value = "12001")]
    tcp_port: u16,
    /// Ticks per second
    #[clap(short, long, default_value = "50")]
    tick_rate: u32,
    /// Milliseconds to pause between datagram receives
    #[clap(long, default_value = "5")]
    intake_delay_ms: u64,
    /// Ticks an attack takes to wind up
    #[clap(short, long, default_value = "10")]
    windup_ticks: u64,
    /// Maximum number of simultaneous sessions
    #[clap(short, long, default_value = "8")]
    max_clients: usize,
    /// Wandering AI actors to spawn at start
    #[clap(short, long, default_value = "0")]
    ai: usize,
    /// Potions placed on each floor at start
    #[clap(long, default_value = "2")]
    potions: usize,
    /// Seed for dungeon generation and placement
    #[clap(long)]
    seed: Option<u64>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            udp_port: args.udp_port,
            tcp_port: args.tcp_port,
            tick_rate: args.tick_rate,
            udp_intake_delay: Duration::from_millis(args.intake_delay_ms),
            attack_windup_ticks: args.windup_ticks,
            max_clients: args.max_clients,
            ai_count: args.ai,
            potions_per_floor: args.potions,
            seed: args.seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    info!(
        "Starting server on {} (udp {}, tcp {}) at {}Hz",
        args.host, args.udp_port, args.tcp_port, args.tick_rate
    );

    let server = Server::bind(ServerConfig::from(args)).await?;
    let shutdown = server.shutdown_handle();
    let mut running = tokio::spawn(server.run());

    tokio::select! {
        result = &mut running => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.trigger();
        }
    }

    running.await??;
    Ok(())
}
