//! Behaviour of autonomous actors.
//!
//! The game loop owns one policy per AI actor and asks it for a step once per
//! tick. Steps go through the same movement validation as player intents.

use rand::{Rng, RngCore};
use shared::{Actor, Dungeon, Point3};

const DIRECTIONS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

pub trait AiPolicy: Send {
    /// Proposes a single-step delta for `me`, or `None` to stay put.
    fn next_step(&mut self, dungeon: &Dungeon, me: &Actor, rng: &mut dyn RngCore) -> Option<Point3>;
}

/// Random walk on plain floor, kept within a radius of where the actor
/// spawned. Never takes stairs.
#[derive(Debug, Clone)]
pub struct Wanderer {
    home: Point3,
    radius: i32,
    idle_chance: f64,
}

impl Wanderer {
    pub fn new(home: Point3) -> Self {
        Self {
            home,
            radius: 6,
            idle_chance: 0.5,
        }
    }

    pub fn with_radius(mut self, radius: i32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_idle_chance(mut self, idle_chance: f64) -> Self {
        self.idle_chance = idle_chance.clamp(0.0, 1.0);
        self
    }

    fn within_range(&self, pos: Point3) -> bool {
        self.home
            .planar_distance(&pos)
            .is_some_and(|distance| distance <= self.radius)
    }
}

impl AiPolicy for Wanderer {
    fn next_step(&mut self, dungeon: &Dungeon, me: &Actor, rng: &mut dyn RngCore) -> Option<Point3> {
        if rng.gen_bool(self.idle_chance) {
            return None;
        }

        let options: Vec<Point3> = DIRECTIONS
            .iter()
            .map(|&(dx, dy)| Point3::planar(dx, dy))
            .filter(|delta| {
                let target = me.pos.offset(*delta);
                dungeon.is_empty_floor(target.x, target.y, target.z) && self.within_range(target)
            })
            .collect();

        if options.is_empty() {
            None
        } else {
            Some(options[rng.gen_range(0..options.len())])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::Tile;

    fn open_floor() -> Dungeon {
        Dungeon::from_fn(|p| {
            if p.x == 0 || p.y == 0 || p.x == shared::COLUMNS - 1 || p.y == shared::ROWS - 1 {
                Tile::Wall
            } else {
                Tile::Floor
            }
        })
    }

    #[test]
    fn test_wanderer_steps_are_single_cells_on_floor() {
        let dungeon = open_floor();
        let mut rng = StdRng::seed_from_u64(11);
        let mut policy = Wanderer::new(Point3::new(10, 10, 0)).with_idle_chance(0.0);
        let mut me = Actor::ai(1, "goblin", Point3::new(10, 10, 0));

        for _ in 0..200 {
            let delta = policy.next_step(&dungeon, &me, &mut rng).unwrap();
            assert!(delta.x.abs() <= 1 && delta.y.abs() <= 1 && delta.z == 0);
            assert_ne!(delta, Point3::default());
            me.move_by(delta);
            assert!(dungeon.is_empty_floor(me.pos.x, me.pos.y, me.pos.z));
            assert!(Point3::new(10, 10, 0).planar_distance(&me.pos).unwrap() <= 6);
        }
    }

    #[test]
    fn test_wanderer_boxed_in_stays_put() {
        let dungeon = Dungeon::from_fn(|p| {
            if p == Point3::new(5, 5, 0) {
                Tile::Floor
            } else {
                Tile::Wall
            }
        });
        let mut rng = StdRng::seed_from_u64(2);
        let mut policy = Wanderer::new(Point3::new(5, 5, 0)).with_idle_chance(0.0);
        let me = Actor::ai(1, "goblin", Point3::new(5, 5, 0));

        assert_eq!(policy.next_step(&dungeon, &me, &mut rng), None);
    }

    #[test]
    fn test_wanderer_zero_radius_never_leaves_home() {
        let dungeon = open_floor();
        let mut rng = StdRng::seed_from_u64(3);
        let mut policy = Wanderer::new(Point3::new(10, 10, 0))
            .with_radius(0)
            .with_idle_chance(0.0);
        let me = Actor::ai(1, "goblin", Point3::new(10, 10, 0));

        assert_eq!(policy.next_step(&dungeon, &me, &mut rng), None);
    }
}
