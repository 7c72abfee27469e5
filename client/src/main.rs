use clap::Parser;
use client::network::Client;
use log::info;
use shared::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Player name shown to everyone else
    name: String,

    /// Server host to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    server: String,

    /// Server datagram port
    #[arg(short = 'u', long, default_value_t = DEFAULT_UDP_PORT)]
    udp_port: u16,

    /// Server stream port
    #[arg(short = 'p', long, default_value_t = DEFAULT_TCP_PORT)]
    tcp_port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!(
        "Connecting to: {} (udp {}, tcp {})",
        args.server, args.udp_port, args.tcp_port
    );

    let mut client = Client::connect(&args.server, args.udp_port, args.tcp_port, &args.name).await?;
    client.run().await?;

    Ok(())
}
