//! Players, AI entities and potions: every "thing with a position and health".

use crate::point::Point3;
use crate::{ActorId, PLAYER_START_HEALTH};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PLAYER_SYMBOL: &str = "@";
pub const AI_SYMBOL: &str = "g";
pub const POTION_SYMBOL: &str = "\u{2764}";
pub const ATTACK_SYMBOL: &str = "*";

pub const PLAYER_COLOR: u32 = 255;
pub const AI_COLOR: u32 = 0x00AA00;
pub const POTION_COLOR: u32 = 0xFF0000;

bitflags! {
    /// What an actor can do, derived from its variant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Driven by client intents.
        const CONTROLLED = 1 << 0;
        /// Driven by an AI policy each tick.
        const AUTONOMOUS = 1 << 1;
        /// May wind up and resolve melee attacks.
        const ATTACKS = 1 << 2;
        /// One-shot pickup: heals whoever hits it.
        const CONSUMABLE = 1 << 3;
        /// Kills and deaths count toward the score table.
        const SCORED = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttackState {
    #[default]
    Idle,
    /// Committed but not yet expired. `pending` stays true until the tick
    /// resolver has applied the hit.
    WindingUp {
        dx: i32,
        dy: i32,
        started_tick: u64,
        pending: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerState {
    pub attack: AttackState,
}

impl PlayerState {
    pub fn is_attacking(&self) -> bool {
        matches!(self.attack, AttackState::WindingUp { .. })
    }

    pub fn attack_delta(&self) -> Option<Point3> {
        match self.attack {
            AttackState::WindingUp { dx, dy, .. } => Some(Point3::planar(dx, dy)),
            AttackState::Idle => None,
        }
    }

    pub fn is_expired(&self, now: u64, windup_ticks: u64) -> bool {
        match self.attack {
            AttackState::WindingUp { started_tick, .. } => {
                now >= started_tick.saturating_add(windup_ticks)
            }
            AttackState::Idle => false,
        }
    }

    /// Winding up and not yet expired.
    pub fn in_flight(&self, now: u64, windup_ticks: u64) -> bool {
        self.is_attacking() && !self.is_expired(now, windup_ticks)
    }

    /// Returns to Idle if the windup has run out. Returns true when it did.
    pub fn attempt_attack_reset(&mut self, now: u64, windup_ticks: u64) -> bool {
        if self.is_expired(now, windup_ticks) {
            self.attack = AttackState::Idle;
            true
        } else {
            false
        }
    }

    /// Starts a windup. An expired windup is cleared first so the new attack
    /// is accepted in the same call; an unexpired one rejects the request.
    pub fn begin_attack(&mut self, dx: i32, dy: i32, now: u64, windup_ticks: u64) -> bool {
        if self.is_attacking() && !self.attempt_attack_reset(now, windup_ticks) {
            return false;
        }
        self.attack = AttackState::WindingUp {
            dx,
            dy,
            started_tick: now,
            pending: true,
        };
        true
    }

    /// Hands out the committed delta once; later calls return `None` until the
    /// next `begin_attack`.
    pub fn take_pending_attack(&mut self) -> Option<Point3> {
        if let AttackState::WindingUp {
            dx, dy, pending, ..
        } = &mut self.attack
        {
            if *pending {
                *pending = false;
                return Some(Point3::planar(*dx, *dy));
            }
        }
        None
    }

    /// Mirrors an authoritative attack flag received over the wire.
    pub fn set_attacking(&mut self, attacking: bool, dx: i32, dy: i32, now: u64) {
        self.attack = if attacking {
            AttackState::WindingUp {
                dx,
                dy,
                started_tick: now,
                pending: false,
            }
        } else {
            AttackState::Idle
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActorKind {
    Player(PlayerState),
    Ai,
    Potion,
}

impl ActorKind {
    pub fn capabilities(&self) -> Capabilities {
        match self {
            ActorKind::Player(_) => {
                Capabilities::CONTROLLED | Capabilities::ATTACKS | Capabilities::SCORED
            }
            ActorKind::Ai => Capabilities::AUTONOMOUS | Capabilities::SCORED,
            ActorKind::Potion => Capabilities::CONSUMABLE,
        }
    }
}

/// A single actor record. Variant-specific state lives in `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    id: ActorId,
    pub name: String,
    pub pos: Point3,
    pub health: i32,
    pub symbol: String,
    pub color: u32,
    pub kind: ActorKind,
}

impl Actor {
    pub fn player(id: ActorId, name: impl Into<String>, pos: Point3) -> Self {
        Self {
            id,
            name: name.into(),
            pos,
            health: PLAYER_START_HEALTH,
            symbol: PLAYER_SYMBOL.to_string(),
            color: PLAYER_COLOR,
            kind: ActorKind::Player(PlayerState::default()),
        }
    }

    pub fn ai(id: ActorId, name: impl Into<String>, pos: Point3) -> Self {
        Self {
            id,
            name: name.into(),
            pos,
            health: PLAYER_START_HEALTH,
            symbol: AI_SYMBOL.to_string(),
            color: AI_COLOR,
            kind: ActorKind::Ai,
        }
    }

    pub fn potion(id: ActorId, pos: Point3) -> Self {
        Self {
            id,
            name: format!("potion-{}", id),
            pos,
            health: 1,
            symbol: POTION_SYMBOL.to_string(),
            color: POTION_COLOR,
            kind: ActorKind::Potion,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn capabilities(&self) -> Capabilities {
        self.kind.capabilities()
    }

    pub fn is_player(&self) -> bool {
        matches!(self.kind, ActorKind::Player(_))
    }

    pub fn is_potion(&self) -> bool {
        self.capabilities().contains(Capabilities::CONSUMABLE)
    }

    pub fn player_state(&self) -> Option<&PlayerState> {
        match &self.kind {
            ActorKind::Player(state) => Some(state),
            _ => None,
        }
    }

    pub fn player_state_mut(&mut self) -> Option<&mut PlayerState> {
        match &mut self.kind {
            ActorKind::Player(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_attacking(&self) -> bool {
        self.player_state().is_some_and(PlayerState::is_attacking)
    }

    /// Cell the current windup is aimed at.
    pub fn attack_pos(&self) -> Option<Point3> {
        self.player_state()
            .and_then(PlayerState::attack_delta)
            .map(|delta| self.pos.offset(delta))
    }

    /// Translates the position. Bounds and occupancy are the caller's job.
    pub fn move_by(&mut self, delta: Point3) {
        self.pos.translate(delta);
    }

    pub fn damage(&self) -> i32 {
        1
    }

    /// Applies this actor's damage to `target`. Death and removal are handled
    /// by the game loop.
    pub fn hit(&self, target: &mut Actor) {
        target.health -= self.damage();
    }

    pub fn heal(&mut self, amount: i32) {
        self.health += amount;
    }

    pub fn check_hit(&self, point: Point3) -> bool {
        self.pos == point
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} at {}", self.name, self.id, self.pos)
    }
}
