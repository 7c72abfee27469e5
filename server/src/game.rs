//! Authoritative world state and the rules that mutate it.

use crate::ai::{AiPolicy, Wanderer};
use crate::config::ServerConfig;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    format_score, Actor, ActorId, ActorUpdate, Capabilities, Dungeon, FieldChange, GameError,
    IdAllocator, Packet, Payload, Point3, ScoreBoard, Tile, COLUMNS, FLOORS,
    JOIN_PLACEMENT_ATTEMPTS, POTION_HEAL, POTION_PLACEMENT_ATTEMPTS, ROWS,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct GameState {
    pub tick: u64,
    dungeon: Dungeon,
    actors: BTreeMap<ActorId, Actor>,
    policies: BTreeMap<ActorId, Box<dyn AiPolicy>>,
    scores: ScoreBoard,
    actor_ids: IdAllocator,
    packet_ids: IdAllocator,
    outgoing: Vec<Packet>,
    rng: StdRng,
    windup_ticks: u64,
}

impl GameState {
    /// Generates a dungeon and populates it with the configured potions and
    /// AI actors.
    pub fn new(config: &ServerConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let dungeon = Dungeon::generate(&mut rng);
        let mut state = Self::from_parts(dungeon, config.attack_windup_ticks, rng);

        for z in 0..FLOORS {
            for _ in 0..config.potions_per_floor {
                if let Err(e) = state.spawn_potion(z) {
                    warn!("Could not place potion on floor {}: {}", z, e);
                }
            }
        }
        for _ in 0..config.ai_count {
            if let Err(e) = state.spawn_ai() {
                warn!("Could not place AI actor: {}", e);
            }
        }

        // Nobody is connected yet; late joiners get a full snapshot instead.
        state.outgoing.clear();
        info!(
            "World ready: {} actors, windup {} ticks",
            state.actors.len(),
            state.windup_ticks
        );
        state
    }

    /// Empty world on a given dungeon.
    pub fn with_dungeon(dungeon: Dungeon, windup_ticks: u64, seed: u64) -> Self {
        Self::from_parts(dungeon, windup_ticks, StdRng::seed_from_u64(seed))
    }

    fn from_parts(mut dungeon: Dungeon, windup_ticks: u64, rng: StdRng) -> Self {
        dungeon.reveal_all();
        Self {
            tick: 0,
            dungeon,
            actors: BTreeMap::new(),
            policies: BTreeMap::new(),
            scores: ScoreBoard::new(),
            actor_ids: IdAllocator::new(),
            packet_ids: IdAllocator::new(),
            outgoing: Vec::new(),
            rng,
            // A zero windup would expire before the tick could resolve it.
            windup_ticks: windup_ticks.max(1),
        }
    }

    pub fn dungeon(&self) -> &Dungeon {
        &self.dungeon
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub fn player_count(&self) -> usize {
        self.actors.values().filter(|a| a.is_player()).count()
    }

    pub fn scores(&self) -> &ScoreBoard {
        &self.scores
    }

    pub fn windup_ticks(&self) -> u64 {
        self.windup_ticks
    }

    /// Wraps `payload` with the next outgoing packet id.
    pub fn stamp(&self, payload: Payload) -> Packet {
        Packet::stamped(&self.packet_ids, payload)
    }

    fn emit(&mut self, payload: Payload) {
        let packet = self.stamp(payload);
        self.outgoing.push(packet);
    }

    fn emit_update(&mut self, update: ActorUpdate) {
        self.emit(Payload::Update(update));
    }

    /// Packets queued since the last drain, in the order they were produced.
    pub fn drain_outgoing(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outgoing)
    }

    /// One `Score` packet per table entry, in table order.
    pub fn score_packets(&self) -> Vec<Packet> {
        self.scores
            .iter()
            .map(|(name, score)| {
                self.stamp(Payload::Score {
                    name: name.to_string(),
                    kills: score.kills,
                    deaths: score.deaths,
                })
            })
            .collect()
    }

    /// `Actor` snapshots of everything currently in the world.
    pub fn snapshot_packets(&self) -> Vec<Packet> {
        self.actors
            .values()
            .map(|actor| self.stamp(Payload::Actor(actor.clone())))
            .collect()
    }

    fn is_occupied(&self, pos: Point3) -> bool {
        self.actors.values().any(|a| a.check_hit(pos))
    }

    fn live_player(&self, id: ActorId) -> Result<&Actor, GameError> {
        self.actors
            .get(&id)
            .filter(|a| a.is_player())
            .ok_or(GameError::RejectedIntent("unknown player"))
    }

    /// Tries `attempts` random cells that satisfy `accept` and are free.
    fn random_free_cell(
        &mut self,
        floor: Option<i32>,
        attempts: usize,
        accept: fn(&Dungeon, Point3) -> bool,
    ) -> Option<Point3> {
        for _ in 0..attempts {
            let z = floor.unwrap_or_else(|| self.rng.gen_range(0..FLOORS));
            let pos = Point3::new(
                self.rng.gen_range(0..COLUMNS),
                self.rng.gen_range(0..ROWS),
                z,
            );
            if accept(&self.dungeon, pos) && !self.is_occupied(pos) {
                return Some(pos);
            }
        }
        None
    }

    /// Places a new player and announces it. No id is spent when there is no
    /// room.
    pub fn add_player(&mut self, name: &str) -> Result<ActorId, GameError> {
        if self
            .actors
            .values()
            .any(|a| a.is_player() && a.name == name)
        {
            return Err(GameError::RejectedIntent("name already in use"));
        }

        let pos = match self.random_free_cell(None, JOIN_PLACEMENT_ATTEMPTS, |d, p| d.walkable_tile(p)) {
            Some(pos) => pos,
            None => self.dungeon.find_first_walkable_point(self.actors.values())?,
        };

        let id = self.actor_ids.next_id();
        let player = Actor::player(id, name, pos);
        info!("Added player {}", player);
        self.actors.insert(id, player.clone());
        self.scores.ensure(name);

        self.emit(Payload::Actor(player));
        let scores = self.score_packets();
        self.outgoing.extend(scores);
        Ok(id)
    }

    /// Removes a live player, drops their score and broadcasts a tombstone.
    /// Unknown ids are ignored.
    pub fn remove_player(&mut self, id: ActorId) {
        if !self.actors.get(&id).is_some_and(Actor::is_player) {
            debug!("remove_player({}) ignored: not live", id);
            return;
        }
        if let Some(player) = self.actors.remove(&id) {
            self.scores.remove(&player.name);
            info!("Removed player {}", player);
            self.emit_update(ActorUpdate::remove(id));
        }
    }

    /// Clears the score of a name that no longer has a live player behind it.
    pub fn forget_score(&mut self, name: &str) {
        let live = self
            .actors
            .values()
            .any(|a| a.is_player() && a.name == name);
        if !live && self.scores.remove(name).is_some() {
            debug!("Forgot score for {}", name);
        }
    }

    pub fn spawn_potion(&mut self, z: i32) -> Result<ActorId, GameError> {
        let pos = match self.random_free_cell(Some(z), POTION_PLACEMENT_ATTEMPTS, |d, p| {
            d.is_empty_floor(p.x, p.y, p.z)
        }) {
            Some(pos) => pos,
            None => self
                .dungeon
                .find_first_walkable_on_floor(z, self.actors.values())?,
        };

        let id = self.actor_ids.next_id();
        let potion = Actor::potion(id, pos);
        debug!("Spawned {}", potion);
        self.actors.insert(id, potion.clone());
        self.emit(Payload::Actor(potion));
        Ok(id)
    }

    pub fn spawn_ai(&mut self) -> Result<ActorId, GameError> {
        let pos = match self.random_free_cell(None, JOIN_PLACEMENT_ATTEMPTS, |d, p| {
            d.is_empty_floor(p.x, p.y, p.z)
        }) {
            Some(pos) => pos,
            None => self.dungeon.find_first_walkable_point(self.actors.values())?,
        };

        let id = self.actor_ids.next_id();
        let ai = Actor::ai(id, format!("goblin-{}", id), pos);
        debug!("Spawned {}", ai);
        self.actors.insert(id, ai.clone());
        self.policies.insert(id, Box::new(Wanderer::new(pos)));
        self.scores.ensure(&ai.name);
        self.emit(Payload::Actor(ai));
        Ok(id)
    }

    /// Applies one decoded client packet. Rejections leave the world as it
    /// was and queue nothing.
    pub fn handle_packet(&mut self, packet: Packet) -> Result<(), GameError> {
        match packet.payload {
            Payload::Movement { player_id, dx, dy } => self.process_movement(player_id, dx, dy),
            Payload::Attack { player_id, dx, dy } => {
                self.process_attack_intent(player_id, dx, dy)
            }
            Payload::Update(update) => self.process_update(update),
            other => {
                debug!("Ignoring {} packet {}", other.kind(), packet.id);
                Err(GameError::RejectedIntent("unexpected packet type"))
            }
        }
    }

    /// Where a step of `delta` from `from` would end up. Stairs carry the
    /// mover one floor up or down onto a free landing.
    pub fn validate_move(&self, from: Point3, delta: Point3) -> Result<Point3, GameError> {
        let candidate = from.offset(delta);
        if !self.dungeon.valid_point(candidate) {
            return Err(GameError::RejectedIntent("out of bounds"));
        }
        if self.is_occupied(candidate) {
            return Err(GameError::RejectedIntent("occupied"));
        }

        let landing = match self.dungeon.tile(candidate) {
            Some(Tile::Floor) => return Ok(candidate),
            Some(Tile::StairUp) => candidate.offset(Point3::new(0, 0, 1)),
            Some(Tile::StairDown) => candidate.offset(Point3::new(0, 0, -1)),
            _ => return Err(GameError::RejectedIntent("not walkable")),
        };

        if !self.dungeon.valid_point(landing) {
            return Err(GameError::RejectedIntent("stairs lead nowhere"));
        }
        if self.is_occupied(landing) {
            return Err(GameError::RejectedIntent("landing occupied"));
        }
        Ok(landing)
    }

    pub fn process_movement(&mut self, player_id: ActorId, dx: i32, dy: i32) -> Result<(), GameError> {
        let now = self.tick;
        let windup = self.windup_ticks;
        let from = self.live_player(player_id)?.pos;

        let mut cleared = false;
        if let Some(state) = self
            .actors
            .get_mut(&player_id)
            .and_then(Actor::player_state_mut)
        {
            if state.is_attacking() {
                if !state.attempt_attack_reset(now, windup) {
                    return Err(GameError::RejectedIntent("attack in flight"));
                }
                cleared = true;
            }
        }
        if cleared {
            self.emit_update(ActorUpdate::attacking(player_id, false, Point3::default()));
        }

        let target = self.validate_move(from, Point3::planar(dx, dy))?;
        if let Some(player) = self.actors.get_mut(&player_id) {
            player.pos = target;
        }
        debug!("Player {} moved {} -> {}", player_id, from, target);
        self.emit_update(ActorUpdate::position(player_id, target));
        Ok(())
    }

    pub fn process_attack_intent(&mut self, player_id: ActorId, dx: i32, dy: i32) -> Result<(), GameError> {
        let now = self.tick;
        let windup = self.windup_ticks;
        let target = self.live_player(player_id)?.pos.offset(Point3::planar(dx, dy));

        if !self.dungeon.valid_point(target) {
            return Err(GameError::RejectedIntent("out of bounds"));
        }
        let empty_floor = self.dungeon.is_empty_floor(target.x, target.y, target.z);
        if !empty_floor && !self.is_occupied(target) {
            return Err(GameError::RejectedIntent("nothing to attack"));
        }

        let accepted = self
            .actors
            .get_mut(&player_id)
            .and_then(Actor::player_state_mut)
            .is_some_and(|state| state.begin_attack(dx, dy, now, windup));
        if !accepted {
            return Err(GameError::RejectedIntent("attack in flight"));
        }
        debug!("Player {} winds up at {}", player_id, target);
        Ok(())
    }

    /// Client-sent sparse update for its own player. A tombstone leaves the
    /// game; anything else is applied and relayed.
    ///
    /// Attack state only changes through attack intents and the tick, so an
    /// update carrying an attack field is rejected whole. A position change
    /// must land on a free walkable cell.
    pub fn process_update(&mut self, update: ActorUpdate) -> Result<(), GameError> {
        let id = update.actor_id;
        self.live_player(id)?;

        if update.is_tombstone() {
            self.remove_player(id);
            return Ok(());
        }

        if update
            .changes
            .iter()
            .any(|change| matches!(change, FieldChange::Attack { .. }))
        {
            return Err(GameError::RejectedIntent("attack state is server-owned"));
        }

        let from = self.live_player(id)?.pos;
        let pos = update.resulting_position(self.live_player(id)?);
        if !self.dungeon.valid_point(pos) {
            return Err(GameError::InvalidPacket(format!(
                "update moves {} out of bounds to {}",
                id, pos
            )));
        }
        if pos != from {
            if !self.dungeon.walkable_tile(pos) {
                return Err(GameError::RejectedIntent("not walkable"));
            }
            if self.is_occupied(pos) {
                return Err(GameError::RejectedIntent("occupied"));
            }
        }

        let now = self.tick;
        if let Some(actor) = self.actors.get_mut(&id) {
            update.apply_to(actor, now);
        }
        self.emit_update(update);
        Ok(())
    }

    /// Advances the world by one tick: pending attacks resolve, finished
    /// windups expire, then AI actors move.
    pub fn tick(&mut self) {
        self.tick += 1;
        let now = self.tick;

        let players: Vec<ActorId> = self
            .actors
            .values()
            .filter(|a| a.capabilities().contains(Capabilities::ATTACKS))
            .map(Actor::id)
            .collect();

        for id in &players {
            let pending = self
                .actors
                .get_mut(id)
                .and_then(Actor::player_state_mut)
                .and_then(|state| state.take_pending_attack());
            if let Some(delta) = pending {
                self.resolve_attack(*id, delta);
            }
        }

        for id in &players {
            let windup = self.windup_ticks;
            let expired = self
                .actors
                .get_mut(id)
                .and_then(Actor::player_state_mut)
                .is_some_and(|state| state.attempt_attack_reset(now, windup));
            if expired {
                self.emit_update(ActorUpdate::attacking(*id, false, Point3::default()));
            }
        }

        self.advance_ai();
    }

    fn resolve_attack(&mut self, attacker_id: ActorId, delta: Point3) {
        let Some(attacker) = self.actors.get(&attacker_id) else {
            return;
        };
        let target = attacker.pos.offset(delta);
        self.emit_update(ActorUpdate::attacking(attacker_id, true, delta));

        let victims: Vec<ActorId> = self
            .actors
            .values()
            .filter(|a| a.id() != attacker_id && a.check_hit(target))
            .map(Actor::id)
            .collect();

        for victim_id in victims {
            let Some(mut victim) = self.actors.remove(&victim_id) else {
                continue;
            };
            let Some(attacker) = self.actors.get_mut(&attacker_id) else {
                self.actors.insert(victim_id, victim);
                return;
            };
            attacker.hit(&mut victim);

            if victim.is_potion() {
                attacker.heal(POTION_HEAL);
                let health = attacker.health;
                debug!("Player {} drank {}", attacker_id, victim);
                self.emit_update(ActorUpdate::health(attacker_id, health));
                self.emit_update(ActorUpdate::remove(victim_id));
            } else if victim.health <= 0 {
                let attacker_name = attacker.name.clone();
                self.on_kill(attacker_name, victim);
            } else {
                let health = victim.health;
                self.actors.insert(victim_id, victim);
                self.emit_update(ActorUpdate::health(victim_id, health));
            }
        }
    }

    /// The victim has already left `actors`.
    fn on_kill(&mut self, attacker_name: String, victim: Actor) {
        let victim_id = victim.id();
        self.policies.remove(&victim_id);
        info!("{} killed {}", attacker_name, victim);

        self.emit_update(ActorUpdate::remove(victim_id));
        self.emit(Payload::Message {
            text: format!("{} k {}", attacker_name, victim.name),
        });

        let (attacker_score, victim_score) = self.scores.record_kill(&attacker_name, &victim.name);
        debug!(
            "Scores now {} and {}",
            format_score(&attacker_name, attacker_score),
            format_score(&victim.name, victim_score)
        );
        self.emit(Payload::Score {
            name: attacker_name,
            kills: attacker_score.kills,
            deaths: attacker_score.deaths,
        });
        self.emit(Payload::Score {
            name: victim.name.clone(),
            kills: victim_score.kills,
            deaths: victim_score.deaths,
        });

        if let Err(e) = self.spawn_potion(victim.pos.z) {
            warn!("No room for a replacement potion on floor {}: {}", victim.pos.z, e);
        }
    }

    fn advance_ai(&mut self) {
        let ids: Vec<ActorId> = self.policies.keys().copied().collect();
        for id in ids {
            let (Some(mut policy), Some(me)) = (self.policies.remove(&id), self.actors.get(&id).cloned())
            else {
                continue;
            };
            let step = policy.next_step(&self.dungeon, &me, &mut self.rng);
            self.policies.insert(id, policy);

            let Some(delta) = step else {
                continue;
            };
            match self.validate_move(me.pos, delta) {
                Ok(target) => {
                    if let Some(actor) = self.actors.get_mut(&id) {
                        actor.pos = target;
                    }
                    self.emit_update(ActorUpdate::position(id, target));
                }
                Err(e) => debug!("AI {} step rejected: {}", id, e),
            }
        }
    }
}

/// The single access path to the world. Every logical operation runs inside
/// one `with` call.
#[derive(Clone)]
pub struct SharedGame {
    inner: Arc<Mutex<GameState>>,
}

impl SharedGame {
    pub fn new(state: GameState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn with<R>(&self, f: impl FnOnce(&mut GameState) -> R) -> R {
        let mut state = self.inner.lock().await;
        f(&mut state)
    }

    pub async fn add_player(&self, name: &str) -> Result<ActorId, GameError> {
        self.with(|game| game.add_player(name)).await
    }

    pub async fn remove_player(&self, id: ActorId) {
        self.with(|game| game.remove_player(id)).await
    }
}
