//! Wire messages exchanged between clients and the server.
//!
//! Every packet carries a unique id from the sender's `IdAllocator` and a
//! typed payload. The textual encoding is JSON; the stream channel frames one
//! packet per line.

use crate::actor::Actor;
use crate::dungeon::Dungeon;
use crate::error::GameError;
use crate::ids::IdAllocator;
use crate::point::Point3;
use crate::{ActorId, PacketId, MAX_MESSAGE_LEN, MAX_NAME_LEN};
use serde::{Deserialize, Serialize};

/// One sparse field mutation inside an `ActorUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldChange {
    X(i32),
    Y(i32),
    Z(i32),
    Health(i32),
    Symbol(String),
    Attack { attacking: bool, dx: i32, dy: i32 },
    /// Tombstone: the actor is gone. Nothing else in the update applies.
    Remove,
}

/// Changes to one actor. Fields that are absent are unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorUpdate {
    pub actor_id: ActorId,
    pub changes: Vec<FieldChange>,
}

impl ActorUpdate {
    pub fn new(actor_id: ActorId) -> Self {
        Self {
            actor_id,
            changes: Vec::new(),
        }
    }

    pub fn with(mut self, change: FieldChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn remove(actor_id: ActorId) -> Self {
        Self::new(actor_id).with(FieldChange::Remove)
    }

    pub fn position(actor_id: ActorId, pos: Point3) -> Self {
        Self::new(actor_id)
            .with(FieldChange::X(pos.x))
            .with(FieldChange::Y(pos.y))
            .with(FieldChange::Z(pos.z))
    }

    pub fn health(actor_id: ActorId, health: i32) -> Self {
        Self::new(actor_id).with(FieldChange::Health(health))
    }

    pub fn attacking(actor_id: ActorId, attacking: bool, delta: Point3) -> Self {
        Self::new(actor_id).with(FieldChange::Attack {
            attacking,
            dx: delta.x,
            dy: delta.y,
        })
    }

    pub fn is_tombstone(&self) -> bool {
        self.changes.contains(&FieldChange::Remove)
    }

    /// The position this update would leave `actor` at.
    pub fn resulting_position(&self, actor: &Actor) -> Point3 {
        let mut pos = actor.pos;
        for change in &self.changes {
            match change {
                FieldChange::X(x) => pos.x = *x,
                FieldChange::Y(y) => pos.y = *y,
                FieldChange::Z(z) => pos.z = *z,
                _ => {}
            }
        }
        pos
    }

    /// Applies the field changes to `actor`. Returns true if its position
    /// changed. Tombstones are the caller's business and are ignored here.
    pub fn apply_to(&self, actor: &mut Actor, now: u64) -> bool {
        if self.is_tombstone() {
            return false;
        }

        let before = actor.pos;
        actor.pos = self.resulting_position(actor);
        for change in &self.changes {
            match change {
                FieldChange::Health(health) => actor.health = *health,
                FieldChange::Symbol(symbol) => actor.symbol = symbol.clone(),
                FieldChange::Attack { attacking, dx, dy } => {
                    if let Some(state) = actor.player_state_mut() {
                        state.set_attacking(*attacking, *dx, *dy, now);
                    }
                }
                FieldChange::X(_) | FieldChange::Y(_) | FieldChange::Z(_) | FieldChange::Remove => {}
            }
        }
        actor.pos != before
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// First line a client sends on the stream channel.
    Join { name: String },
    Welcome { player_id: ActorId, dungeon: Dungeon },
    Rejected { reason: String },

    Movement { player_id: ActorId, dx: i32, dy: i32 },
    Actor(Actor),
    Update(ActorUpdate),
    Attack { player_id: ActorId, dx: i32, dy: i32 },
    Quit,
    Score { name: String, kills: u32, deaths: u32 },
    Message { text: String },
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Join { .. } => "join",
            Payload::Welcome { .. } => "welcome",
            Payload::Rejected { .. } => "rejected",
            Payload::Movement { .. } => "movement",
            Payload::Actor(_) => "actor",
            Payload::Update(_) => "update",
            Payload::Attack { .. } => "attack",
            Payload::Quit => "quit",
            Payload::Score { .. } => "score",
            Payload::Message { .. } => "message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub id: PacketId,
    pub payload: Payload,
}

fn check_step(dx: i32, dy: i32) -> Result<(), GameError> {
    if !(-1..=1).contains(&dx) || !(-1..=1).contains(&dy) {
        return Err(GameError::InvalidPacket(format!(
            "delta ({}, {}) is not a single step",
            dx, dy
        )));
    }
    if dx == 0 && dy == 0 {
        return Err(GameError::InvalidPacket("zero delta".to_string()));
    }
    Ok(())
}

pub fn check_name(name: &str) -> Result<(), GameError> {
    if name.trim().is_empty() {
        return Err(GameError::InvalidPacket("empty name".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(GameError::InvalidPacket(format!(
            "name longer than {} characters",
            MAX_NAME_LEN
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(GameError::InvalidPacket(
            "name contains control characters".to_string(),
        ));
    }
    Ok(())
}

impl Packet {
    pub fn new(id: PacketId, payload: Payload) -> Self {
        Self { id, payload }
    }

    /// Builds a packet with the next id from `ids`.
    pub fn stamped(ids: &IdAllocator, payload: Payload) -> Self {
        Self::new(ids.next_id(), payload)
    }

    pub fn encode(&self) -> Result<String, GameError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, GameError> {
        let packet: Packet = serde_json::from_str(text.trim())?;
        packet.validate()?;
        Ok(packet)
    }

    pub fn decode_bytes(data: &[u8]) -> Result<Self, GameError> {
        let text = std::str::from_utf8(data)
            .map_err(|e| GameError::InvalidPacket(e.to_string()))?;
        Self::decode(text)
    }

    /// Semantic checks beyond what the JSON structure guarantees.
    pub fn validate(&self) -> Result<(), GameError> {
        match &self.payload {
            Payload::Join { name } => check_name(name),
            Payload::Movement { dx, dy, .. } | Payload::Attack { dx, dy, .. } => {
                check_step(*dx, *dy)
            }
            Payload::Update(update) => {
                if update.changes.is_empty() {
                    return Err(GameError::InvalidPacket("empty update".to_string()));
                }
                Ok(())
            }
            Payload::Score { name, .. } => check_name(name),
            Payload::Message { text } if text.chars().count() > MAX_MESSAGE_LEN => Err(
                GameError::InvalidPacket(format!("message longer than {}", MAX_MESSAGE_LEN)),
            ),
            Payload::Actor(actor) => check_name(&actor.name),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Actor;
    use crate::dungeon::Tile;

    fn roundtrip(payload: Payload) -> Packet {
        let packet = Packet::new(9, payload);
        let text = packet.encode().unwrap();
        Packet::decode(&text).unwrap()
    }

    #[test]
    fn test_stamped_ids_are_unique_and_increasing() {
        let ids = IdAllocator::new();
        let a = Packet::stamped(&ids, Payload::Quit);
        let b = Packet::stamped(&ids, Payload::Quit);
        assert!(b.id > a.id);
    }

    #[test]
    fn test_movement_decodes_from_text() {
        let text = r#"{"id":3,"payload":{"type":"movement","player_id":7,"dx":1,"dy":-1}}"#;
        let packet = Packet::decode(text).unwrap();
        assert_eq!(packet.id, 3);
        assert_eq!(
            packet.payload,
            Payload::Movement {
                player_id: 7,
                dx: 1,
                dy: -1
            }
        );
    }

    #[test]
    fn test_incomplete_payload_is_invalid() {
        let missing_dy = r#"{"id":3,"payload":{"type":"movement","player_id":7,"dx":1}}"#;
        assert!(matches!(
            Packet::decode(missing_dy),
            Err(GameError::InvalidPacket(_))
        ));

        let unknown = r#"{"id":3,"payload":{"type":"teleport","player_id":7}}"#;
        assert!(matches!(Packet::decode(unknown), Err(GameError::InvalidPacket(_))));

        assert!(matches!(Packet::decode("}{"), Err(GameError::InvalidPacket(_))));
        assert!(matches!(
            Packet::decode_bytes(&[0xff, 0xfe, 0x00]),
            Err(GameError::InvalidPacket(_))
        ));
    }

    #[test]
    fn test_oversized_steps_are_invalid() {
        for (dx, dy) in [(2, 0), (0, -3), (0, 0)] {
            let packet = Packet::new(
                1,
                Payload::Attack {
                    player_id: 1,
                    dx,
                    dy,
                },
            );
            let text = packet.encode().unwrap();
            assert!(Packet::decode(&text).is_err(), "({}, {})", dx, dy);
        }
    }

    #[test]
    fn test_join_name_rules() {
        assert!(check_name("alice").is_ok());
        assert!(check_name("   ").is_err());
        assert!(check_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(check_name("bad\nname").is_err());
    }

    #[test]
    fn test_update_wire_shape_is_sparse() {
        let update = ActorUpdate::new(4).with(FieldChange::Health(2));
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"actor_id":4,"changes":[{"health":2}]}"#);

        let tombstone = serde_json::to_string(&ActorUpdate::remove(4)).unwrap();
        assert_eq!(tombstone, r#"{"actor_id":4,"changes":["remove"]}"#);
    }

    #[test]
    fn test_empty_update_is_invalid() {
        let packet = Packet::new(1, Payload::Update(ActorUpdate::new(3)));
        assert!(packet.validate().is_err());
    }

    #[test]
    fn test_apply_only_touches_present_fields() {
        let mut actor = Actor::player(1, "a", Point3::new(5, 5, 0));
        let update = ActorUpdate::new(1).with(FieldChange::X(6));

        assert!(update.apply_to(&mut actor, 0));
        assert_eq!(actor.pos, Point3::new(6, 5, 0));
        assert_eq!(actor.health, crate::PLAYER_START_HEALTH);
        assert_eq!(actor.symbol, crate::actor::PLAYER_SYMBOL);
    }

    #[test]
    fn test_tombstone_ignores_other_fields() {
        let mut actor = Actor::player(1, "a", Point3::new(5, 5, 0));
        let update = ActorUpdate::new(1)
            .with(FieldChange::Health(0))
            .with(FieldChange::Remove)
            .with(FieldChange::X(9));

        assert!(update.is_tombstone());
        assert!(!update.apply_to(&mut actor, 0));
        assert_eq!(actor.pos, Point3::new(5, 5, 0));
        assert_eq!(actor.health, crate::PLAYER_START_HEALTH);
    }

    #[test]
    fn test_attack_change_mirrors_state() {
        let mut actor = Actor::player(1, "a", Point3::new(5, 5, 0));
        ActorUpdate::attacking(1, true, Point3::planar(0, 1)).apply_to(&mut actor, 3);
        assert_eq!(actor.attack_pos(), Some(Point3::new(5, 6, 0)));

        ActorUpdate::attacking(1, false, Point3::default()).apply_to(&mut actor, 4);
        assert!(!actor.is_attacking());
    }

    #[test]
    fn test_welcome_carries_dungeon() {
        let dungeon = Dungeon::from_fn(|p| if p.x == 1 { Tile::Floor } else { Tile::Wall });
        let packet = roundtrip(Payload::Welcome {
            player_id: 2,
            dungeon: dungeon.clone(),
        });
        match packet.payload {
            Payload::Welcome {
                player_id,
                dungeon: received,
            } => {
                assert_eq!(player_id, 2);
                assert_eq!(received, dungeon);
            }
            _ => panic!("Wrong packet type after decoding"),
        }
    }

    #[test]
    fn test_actor_and_score_payloads() {
        let actor = Actor::potion(5, Point3::new(2, 2, 2));
        match roundtrip(Payload::Actor(actor.clone())).payload {
            Payload::Actor(received) => assert_eq!(received, actor),
            _ => panic!("Wrong packet type after decoding"),
        }

        let score = roundtrip(Payload::Score {
            name: "ann".to_string(),
            kills: 3,
            deaths: 1,
        });
        assert_eq!(score.payload.kind(), "score");
        assert_eq!(roundtrip(Payload::Quit).payload, Payload::Quit);
    }
}
