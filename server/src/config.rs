use shared::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT, POTIONS_PER_FLOOR};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub udp_port: u16,
    pub tcp_port: u16,
    /// Ticks per second.
    pub tick_rate: u32,
    /// Pause between two datagram receives.
    pub udp_intake_delay: Duration,
    pub attack_windup_ticks: u64,
    pub max_clients: usize,
    pub ai_count: usize,
    pub potions_per_floor: usize,
    /// Fixed seed for dungeon generation and placement. Random when unset.
    pub seed: Option<u64>,
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    pub fn udp_addr(&self) -> String {
        format!("{}:{}", self.host, self.udp_port)
    }

    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.host, self.tcp_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            udp_port: DEFAULT_UDP_PORT,
            tcp_port: DEFAULT_TCP_PORT,
            tick_rate: 50,
            udp_intake_delay: Duration::from_millis(5),
            attack_windup_ticks: 10,
            max_clients: 8,
            ai_count: 0,
            potions_per_floor: POTIONS_PER_FLOOR,
            seed: None,
        }
    }
}
