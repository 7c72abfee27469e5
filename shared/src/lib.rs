//! Types shared by the dungeon server and its clients: the map, actors,
//! the packet protocol and the score table.

pub mod actor;
pub mod dungeon;
pub mod error;
pub mod ids;
pub mod packet;
pub mod point;
pub mod score;

pub use actor::{Actor, ActorKind, AttackState, Capabilities, PlayerState};
pub use dungeon::{Dungeon, Tile};
pub use error::GameError;
pub use ids::IdAllocator;
pub use packet::{ActorUpdate, FieldChange, Packet, Payload};
pub use point::Point3;
pub use score::{format_score, Score, ScoreBoard};

pub type ActorId = u64;
pub type PacketId = u64;

pub const COLUMNS: i32 = 80;
pub const ROWS: i32 = 24;
pub const FLOORS: i32 = 4;

/// Chebyshev radius revealed around a player after each move.
pub const VISIBILITY_RADIUS: i32 = 5;

pub const PLAYER_START_HEALTH: i32 = 5;
pub const POTION_HEAL: i32 = 2;
pub const POTIONS_PER_FLOOR: usize = 2;

/// Random placements tried before falling back to a linear scan.
pub const JOIN_PLACEMENT_ATTEMPTS: usize = 30;
pub const POTION_PLACEMENT_ATTEMPTS: usize = 30;

pub const SCORE_DISPLAY_DIVISOR: u32 = 3;

/// Number of reads a kill-feed line stays on a client's screen.
pub const MESSAGE_TIMEOUT: u32 = 50;

pub const MAX_NAME_LEN: usize = 24;
pub const MAX_MESSAGE_LEN: usize = 256;
pub const MAX_DATAGRAM_SIZE: usize = 4096;

pub const DEFAULT_UDP_PORT: u16 = 12000;
pub const DEFAULT_TCP_PORT: u16 = 12001;
