//! Client-side mirror of the world, fed by server packets
//!
//! The client never decides anything on its own: it applies what the server
//! sends, keeps its own fog overlay, and answers the rendering questions
//! "what glyph goes here" and "what colour".

use log::{debug, info, warn};
use shared::actor::ATTACK_SYMBOL;
use shared::{
    Actor, ActorId, ActorUpdate, Capabilities, Dungeon, Packet, Payload, Point3, Score,
    ScoreBoard, Tile, MESSAGE_TIMEOUT,
};
use std::collections::BTreeMap;

pub const UNREVEALED_COLOR: u32 = 241;
pub const STAIR_COLOR: u32 = 127;
pub const DEFAULT_COLOR: u32 = 255;

#[derive(Debug, Default)]
pub struct ClientGameState {
    name: String,
    player_id: Option<ActorId>,
    me: Option<Actor>,
    dungeon: Option<Dungeon>,
    others: BTreeMap<ActorId, Actor>,
    scores: ScoreBoard,
    /// (remaining reads, text)
    messages: Vec<(u32, String)>,
    quit: bool,
    rejected: Option<String>,
    /// Local clock for mirrored attack state; only ordering matters.
    clock: u64,
}

impl ClientGameState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn player_id(&self) -> Option<ActorId> {
        self.player_id
    }

    pub fn me(&self) -> Option<&Actor> {
        self.me.as_ref()
    }

    pub fn dungeon(&self) -> Option<&Dungeon> {
        self.dungeon.as_ref()
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.others.get(&id)
    }

    pub fn others(&self) -> impl Iterator<Item = &Actor> {
        self.others.values()
    }

    /// Both the map and our own actor have arrived.
    pub fn is_ready(&self) -> bool {
        self.me.is_some() && self.dungeon.is_some()
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn set_quit(&mut self) {
        self.quit = true;
    }

    pub fn rejection(&self) -> Option<&str> {
        self.rejected.as_deref()
    }

    pub fn apply(&mut self, packet: Packet) {
        self.clock += 1;
        match packet.payload {
            Payload::Welcome { player_id, dungeon } => {
                info!("Joined as player {}", player_id);
                self.player_id = Some(player_id);
                self.dungeon = Some(dungeon);
                if let Some(me) = self.me.clone() {
                    self.set_me(me);
                }
            }
            Payload::Rejected { reason } => {
                warn!("Server rejected us: {}", reason);
                self.rejected = Some(reason);
                self.quit = true;
            }
            Payload::Actor(actor) => self.add_actor(actor),
            Payload::Update(update) => self.update(update),
            Payload::Score {
                name,
                kills,
                deaths,
            } => self.scores.set(&name, Score::new(kills, deaths)),
            Payload::Message { text } => self.add_message(text),
            other => debug!("Ignoring {} packet", other.kind()),
        }
    }

    fn set_me(&mut self, me: Actor) {
        if let Some(dungeon) = self.dungeon.as_mut() {
            dungeon.update_visible_dungeon(&me);
        }
        self.scores.ensure(&me.name);
        self.me = Some(me);
    }

    fn add_actor(&mut self, actor: Actor) {
        if Some(actor.id()) == self.player_id {
            self.set_me(actor);
            return;
        }
        if actor.capabilities().contains(Capabilities::SCORED) {
            self.scores.ensure(&actor.name);
        }
        self.others.entry(actor.id()).or_insert(actor);
    }

    fn update(&mut self, update: ActorUpdate) {
        let id = update.actor_id;
        let mine = Some(id) == self.player_id;

        if update.is_tombstone() {
            if mine {
                if let Some(me) = self.me.as_mut() {
                    me.health = 0;
                }
                info!("We were removed from the game");
                self.quit = true;
            } else if let Some(actor) = self.others.remove(&id) {
                self.scores.remove(&actor.name);
            }
            return;
        }

        let now = self.clock;
        if mine {
            let moved = self
                .me
                .as_mut()
                .is_some_and(|me| update.apply_to(me, now));
            if moved {
                if let (Some(dungeon), Some(me)) = (self.dungeon.as_mut(), self.me.as_ref()) {
                    dungeon.update_visible_dungeon(me);
                }
            }
        } else if let Some(actor) = self.others.get_mut(&id) {
            update.apply_to(actor, now);
        } else {
            debug!("Update for unknown actor {}", id);
        }
    }

    /// Queues a kill-feed line unless the same text is already showing.
    pub fn add_message(&mut self, text: String) {
        if self.messages.iter().any(|(_, existing)| *existing == text) {
            return;
        }
        self.messages.push((MESSAGE_TIMEOUT, text));
    }

    /// Lines still visible. Each call ages every line by one read.
    pub fn messages(&mut self) -> Vec<String> {
        self.messages.retain_mut(|(remaining, _)| {
            *remaining -= 1;
            *remaining > 0
        });
        self.messages.iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn scores(&self) -> &ScoreBoard {
        &self.scores
    }

    pub fn score_lines(&self) -> Vec<String> {
        self.scores.ranking()
    }

    fn is_unrevealed(&self, pos: Point3) -> bool {
        self.dungeon
            .as_ref()
            .map_or(true, |d| d.is_unrevealed(pos.x, pos.y, pos.z))
    }

    /// Another player winding up an attack on `pos`.
    fn attacker_at(&self, pos: Point3) -> Option<&Actor> {
        self.others
            .values()
            .find(|actor| actor.attack_pos() == Some(pos))
    }

    fn other_at(&self, pos: Point3) -> Option<&Actor> {
        self.others.values().find(|actor| actor.check_hit(pos))
    }

    /// Glyph for one cell. Our own actor and swing always show; other
    /// actors and their swings only on revealed cells.
    pub fn get_symbol(&self, x: i32, y: i32, z: i32) -> String {
        let (Some(me), Some(dungeon)) = (self.me.as_ref(), self.dungeon.as_ref()) else {
            return Tile::Unrevealed.symbol().to_string();
        };
        let pos = Point3::new(x, y, z);

        if me.check_hit(pos) {
            return me.symbol.clone();
        }
        if me.attack_pos() == Some(pos) {
            return ATTACK_SYMBOL.to_string();
        }
        if !dungeon.is_unrevealed(x, y, z) {
            if self.attacker_at(pos).is_some() {
                return ATTACK_SYMBOL.to_string();
            }
            if let Some(actor) = self.other_at(pos) {
                return actor.symbol.clone();
            }
        }
        dungeon.tile_at(x, y, z).symbol().to_string()
    }

    pub fn get_color(&self, x: i32, y: i32, z: i32) -> u32 {
        let (Some(me), Some(dungeon)) = (self.me.as_ref(), self.dungeon.as_ref()) else {
            return UNREVEALED_COLOR;
        };
        let pos = Point3::new(x, y, z);

        if me.check_hit(pos) || me.attack_pos() == Some(pos) {
            return me.color;
        }
        if self.is_unrevealed(pos) {
            return UNREVEALED_COLOR;
        }
        if let Some(attacker) = self.attacker_at(pos) {
            return attacker.color;
        }
        if let Some(actor) = self.other_at(pos) {
            return actor.color;
        }
        if dungeon.is_stair_up(x, y, z) || dungeon.is_stair_down(x, y, z) {
            return STAIR_COLOR;
        }
        DEFAULT_COLOR
    }

    /// Text rendering of the floor we are on, one string per row.
    pub fn render_floor(&self) -> Vec<String> {
        let (Some(me), Some(dungeon)) = (self.me.as_ref(), self.dungeon.as_ref()) else {
            return Vec::new();
        };
        (0..dungeon.rows())
            .map(|y| {
                (0..dungeon.columns())
                    .map(|x| self.get_symbol(x, y, me.pos.z))
                    .collect()
            })
            .collect()
    }

    fn occupied(&self, pos: Point3) -> bool {
        self.other_at(pos).is_some()
    }

    /// Whether the server would plausibly accept this step. Nothing changes.
    pub fn attempt_move(&self, dx: i32, dy: i32) -> bool {
        let (Some(me), Some(dungeon)) = (self.me.as_ref(), self.dungeon.as_ref()) else {
            return false;
        };
        if me.is_attacking() {
            return false;
        }
        let target = me.pos.offset(Point3::planar(dx, dy));
        dungeon.walkable_tile(target) && !self.occupied(target)
    }

    /// Whether the server would plausibly accept this attack. Nothing changes.
    pub fn attempt_attack(&self, dx: i32, dy: i32) -> bool {
        let (Some(me), Some(dungeon)) = (self.me.as_ref(), self.dungeon.as_ref()) else {
            return false;
        };
        if me.is_attacking() {
            return false;
        }
        let target = me.pos.offset(Point3::planar(dx, dy));
        dungeon.valid_point(target)
            && (dungeon.is_empty_floor(target.x, target.y, target.z) || self.occupied(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{FieldChange, VISIBILITY_RADIUS};

    const ME: ActorId = 1;

    fn room() -> Dungeon {
        Dungeon::from_fn(|p| {
            if p.x == 6 && p.y == 6 && p.z == 0 {
                Tile::StairUp
            } else if (1..=30).contains(&p.x) && (1..=10).contains(&p.y) {
                Tile::Floor
            } else {
                Tile::Wall
            }
        })
    }

    fn packet(payload: Payload) -> Packet {
        Packet::new(0, payload)
    }

    fn joined_at(pos: Point3) -> ClientGameState {
        let mut game = ClientGameState::new("me");
        game.apply(packet(Payload::Welcome {
            player_id: ME,
            dungeon: room(),
        }));
        game.apply(packet(Payload::Actor(Actor::player(ME, "me", pos))));
        game
    }

    #[test]
    fn test_ready_after_welcome_and_own_actor() {
        let mut game = ClientGameState::new("me");
        assert!(!game.is_ready());
        game.apply(packet(Payload::Welcome {
            player_id: ME,
            dungeon: room(),
        }));
        assert!(!game.is_ready());
        game.apply(packet(Payload::Actor(Actor::player(ME, "me", Point3::new(3, 3, 0)))));
        assert!(game.is_ready());
        assert_eq!(game.score_lines(), vec!["0/0-me"]);
    }

    #[test]
    fn test_fog_reveals_around_me() {
        let game = joined_at(Point3::new(3, 3, 0));
        let dungeon = game.dungeon().unwrap();
        assert!(!dungeon.is_unrevealed(3, 3, 0));
        assert!(dungeon.is_unrevealed(3 + VISIBILITY_RADIUS + 1, 3, 0));
        assert_eq!(game.get_color(3 + VISIBILITY_RADIUS + 1, 3, 0), UNREVEALED_COLOR);
        assert_eq!(game.get_symbol(3 + VISIBILITY_RADIUS + 1, 3, 0), " ");
    }

    #[test]
    fn test_own_move_extends_fog() {
        let mut game = joined_at(Point3::new(3, 3, 0));
        let far = 3 + VISIBILITY_RADIUS + 2;
        assert!(game.dungeon().unwrap().is_unrevealed(far, 3, 0));

        game.apply(packet(Payload::Update(
            ActorUpdate::new(ME).with(FieldChange::X(5)),
        )));
        assert_eq!(game.me().unwrap().pos, Point3::new(5, 3, 0));
        assert!(!game.dungeon().unwrap().is_unrevealed(far, 3, 0));
    }

    #[test]
    fn test_symbol_precedence() {
        let mut game = joined_at(Point3::new(3, 3, 0));
        let mut other = Actor::player(2, "bob", Point3::new(5, 3, 0));
        other
            .player_state_mut()
            .unwrap()
            .set_attacking(true, -1, 0, 0);
        game.apply(packet(Payload::Actor(other)));
        game.apply(packet(Payload::Actor(Actor::potion(3, Point3::new(3, 5, 0)))));

        assert_eq!(game.get_symbol(3, 3, 0), "@");
        assert_eq!(game.get_symbol(4, 3, 0), ATTACK_SYMBOL);
        assert_eq!(game.get_symbol(5, 3, 0), "@");
        assert_eq!(game.get_symbol(3, 5, 0), shared::actor::POTION_SYMBOL);
        assert_eq!(game.get_symbol(6, 6, 0), "<");
        assert_eq!(game.get_symbol(2, 2, 0), ".");
        assert_eq!(game.get_symbol(0, 0, 0), "#");
    }

    #[test]
    fn test_own_swing_beats_everything() {
        let mut game = joined_at(Point3::new(3, 3, 0));
        game.apply(packet(Payload::Actor(Actor::potion(3, Point3::new(4, 3, 0)))));
        game.apply(packet(Payload::Update(ActorUpdate::attacking(
            ME,
            true,
            Point3::planar(1, 0),
        ))));

        assert_eq!(game.get_symbol(4, 3, 0), ATTACK_SYMBOL);
        assert_eq!(game.get_color(4, 3, 0), game.me().unwrap().color);
    }

    #[test]
    fn test_hidden_actors_are_not_drawn() {
        let mut game = joined_at(Point3::new(3, 3, 0));
        game.apply(packet(Payload::Actor(Actor::player(2, "bob", Point3::new(25, 8, 0)))));

        assert_eq!(game.get_symbol(25, 8, 0), " ");
        assert_eq!(game.get_color(25, 8, 0), UNREVEALED_COLOR);
    }

    #[test]
    fn test_colors() {
        let mut game = joined_at(Point3::new(3, 3, 0));
        game.apply(packet(Payload::Actor(Actor::potion(3, Point3::new(3, 5, 0)))));

        assert_eq!(game.get_color(3, 5, 0), shared::actor::POTION_COLOR);
        assert_eq!(game.get_color(6, 6, 0), STAIR_COLOR);
        assert_eq!(game.get_color(2, 2, 0), DEFAULT_COLOR);
    }

    #[test]
    fn test_tombstones() {
        let mut game = joined_at(Point3::new(3, 3, 0));
        game.apply(packet(Payload::Actor(Actor::player(2, "bob", Point3::new(5, 3, 0)))));
        assert_eq!(game.score_lines().len(), 2);

        game.apply(packet(Payload::Update(ActorUpdate::remove(2))));
        assert!(game.actor(2).is_none());
        assert_eq!(game.score_lines(), vec!["0/0-me"]);
        assert!(!game.should_quit());

        game.apply(packet(Payload::Update(ActorUpdate::remove(ME))));
        assert!(game.should_quit());
        assert_eq!(game.me().unwrap().health, 0);
    }

    #[test]
    fn test_potions_stay_off_the_score_table() {
        let mut game = joined_at(Point3::new(3, 3, 0));
        game.apply(packet(Payload::Actor(Actor::potion(3, Point3::new(3, 5, 0)))));
        assert_eq!(game.score_lines(), vec!["0/0-me"]);
    }

    #[test]
    fn test_scores_rank_by_kills() {
        let mut game = joined_at(Point3::new(3, 3, 0));
        game.apply(packet(Payload::Score {
            name: "bob".to_string(),
            kills: 6,
            deaths: 0,
        }));
        assert_eq!(game.score_lines(), vec!["2/0-bob", "0/0-me"]);
    }

    #[test]
    fn test_messages_expire_and_dedupe() {
        let mut game = ClientGameState::new("me");
        game.apply(packet(Payload::Message {
            text: "A k B".to_string(),
        }));
        game.add_message("A k B".to_string());

        assert_eq!(game.messages(), vec!["A k B"]);
        for _ in 2..MESSAGE_TIMEOUT {
            assert_eq!(game.messages().len(), 1);
        }
        assert!(game.messages().is_empty());
    }

    #[test]
    fn test_attempts_do_not_mutate() {
        let mut game = joined_at(Point3::new(1, 1, 0));
        game.apply(packet(Payload::Actor(Actor::player(2, "bob", Point3::new(2, 1, 0)))));

        assert!(!game.attempt_move(-1, 0));
        assert!(!game.attempt_move(1, 0));
        assert!(game.attempt_move(0, 1));
        assert!(game.attempt_attack(1, 0));
        assert!(game.attempt_attack(1, 1));
        assert!(!game.attempt_attack(-1, -1));
        assert!(!game.me().unwrap().is_attacking());
        assert_eq!(game.me().unwrap().pos, Point3::new(1, 1, 0));
    }

    #[test]
    fn test_attempts_blocked_while_swinging() {
        let mut game = joined_at(Point3::new(3, 3, 0));
        game.apply(packet(Payload::Update(ActorUpdate::attacking(
            ME,
            true,
            Point3::planar(0, 1),
        ))));
        assert!(!game.attempt_move(1, 0));
        assert!(!game.attempt_attack(1, 0));

        game.apply(packet(Payload::Update(ActorUpdate::attacking(
            ME,
            false,
            Point3::default(),
        ))));
        assert!(game.attempt_move(1, 0));
    }

    #[test]
    fn test_rejection_sets_quit() {
        let mut game = ClientGameState::new("me");
        game.apply(packet(Payload::Rejected {
            reason: "server full".to_string(),
        }));
        assert!(game.should_quit());
        assert_eq!(game.rejection(), Some("server full"));
    }

    #[test]
    fn test_render_floor_dimensions() {
        let game = joined_at(Point3::new(3, 3, 0));
        let rows = game.render_floor();
        assert_eq!(rows.len(), shared::ROWS as usize);
        assert!(rows.iter().all(|row| row.chars().count() == shared::COLUMNS as usize));
        assert_eq!(rows[3].chars().nth(3), Some('@'));
    }
}
