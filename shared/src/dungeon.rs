//! Multi-floor tile grid, stair pairing and per-observer fog.

use crate::actor::Actor;
use crate::error::GameError;
use crate::point::Point3;
use crate::{COLUMNS, FLOORS, ROWS, VISIBILITY_RADIUS};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const MIN_ROOMS: usize = 4;
const MAX_ROOMS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tile {
    Wall,
    Floor,
    StairUp,
    StairDown,
    Unrevealed,
}

impl Tile {
    pub fn symbol(self) -> char {
        match self {
            Tile::Wall => '#',
            Tile::Floor => '.',
            Tile::StairUp => '<',
            Tile::StairDown => '>',
            Tile::Unrevealed => ' ',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Tile> {
        match symbol {
            '#' => Some(Tile::Wall),
            '.' => Some(Tile::Floor),
            '<' => Some(Tile::StairUp),
            '>' => Some(Tile::StairDown),
            ' ' => Some(Tile::Unrevealed),
            _ => None,
        }
    }

    pub fn is_walkable(self) -> bool {
        matches!(self, Tile::Floor | Tile::StairUp | Tile::StairDown)
    }
}

/// Textual wire form of a dungeon: one string per row, one list of rows per
/// floor. Only the authoritative tiles travel; fog is always local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DungeonLayout {
    pub floors: Vec<Vec<String>>,
}

/// The dungeon grid.
///
/// Dimensions are fixed at `COLUMNS` x `ROWS` x `FLOORS`. Alongside the tiles
/// it carries a revealed mask that forms the fog overlay; fog only ever
/// shrinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DungeonLayout", into = "DungeonLayout")]
pub struct Dungeon {
    tiles: Vec<Tile>,
    revealed: Vec<bool>,
}

#[derive(Debug, Clone, Copy)]
struct Room {
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
}

impl Room {
    fn around(x: i32, y: i32) -> Self {
        Room {
            x0: x - 1,
            y0: y - 1,
            x1: x + 1,
            y1: y + 1,
        }
    }

    fn center(&self) -> (i32, i32) {
        ((self.x0 + self.x1) / 2, (self.y0 + self.y1) / 2)
    }

    /// Cells whose eight neighbours all belong to the room.
    fn interior(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (self.y0 + 1..self.y1)
            .flat_map(move |y| (self.x0 + 1..self.x1).map(move |x| (x, y)))
    }
}

fn index(x: i32, y: i32, z: i32) -> usize {
    ((z * ROWS + y) * COLUMNS + x) as usize
}

fn in_bounds(x: i32, y: i32, z: i32) -> bool {
    (0..COLUMNS).contains(&x) && (0..ROWS).contains(&y) && (0..FLOORS).contains(&z)
}

impl Dungeon {
    const CELLS: usize = (COLUMNS * ROWS * FLOORS) as usize;

    /// Builds a grid by asking `f` for every cell. Everything starts hidden.
    pub fn from_fn(mut f: impl FnMut(Point3) -> Tile) -> Self {
        let mut tiles = Vec::with_capacity(Self::CELLS);
        for z in 0..FLOORS {
            for y in 0..ROWS {
                for x in 0..COLUMNS {
                    tiles.push(f(Point3::new(x, y, z)));
                }
            }
        }
        Self {
            tiles,
            revealed: vec![false; Self::CELLS],
        }
    }

    /// Generates rooms and corridors on every floor.
    ///
    /// Each floor is fully connected. For every adjacent pair of floors there is
    /// exactly one stair-up on the lower floor and one stair-down on the upper
    /// floor, at the same column and row. Stairs sit on room interior cells so
    /// they never split a corridor.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut dungeon = Self::from_fn(|_| Tile::Wall);
        let mut arrival: Option<(i32, i32)> = None;

        for z in 0..FLOORS {
            let rooms = dungeon.carve_floor(rng, z, arrival);

            if let Some((x, y)) = arrival {
                dungeon.set(x, y, z, Tile::StairDown);
            }

            arrival = if z + 1 < FLOORS {
                let (x, y) = pick_stair(rng, &rooms, arrival);
                dungeon.set(x, y, z, Tile::StairUp);
                Some((x, y))
            } else {
                None
            };
        }

        dungeon
    }

    fn carve_floor<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        z: i32,
        arrival: Option<(i32, i32)>,
    ) -> Vec<Room> {
        let mut rooms = Vec::new();
        if let Some((x, y)) = arrival {
            rooms.push(Room::around(x, y));
        }

        let target = rooms.len() + rng.gen_range(MIN_ROOMS..=MAX_ROOMS);
        while rooms.len() < target {
            let w = rng.gen_range(4..=12);
            let h = rng.gen_range(3..=6);
            let x0 = rng.gen_range(1..=COLUMNS - 1 - w);
            let y0 = rng.gen_range(1..=ROWS - 1 - h);
            rooms.push(Room {
                x0,
                y0,
                x1: x0 + w - 1,
                y1: y0 + h - 1,
            });
        }

        for room in &rooms {
            for y in room.y0..=room.y1 {
                for x in room.x0..=room.x1 {
                    self.set(x, y, z, Tile::Floor);
                }
            }
        }

        for pair in rooms.windows(2) {
            let (ax, ay) = pair[0].center();
            let (bx, by) = pair[1].center();
            if rng.gen_bool(0.5) {
                self.carve_row(ax, bx, ay, z);
                self.carve_column(ay, by, bx, z);
            } else {
                self.carve_column(ay, by, ax, z);
                self.carve_row(ax, bx, by, z);
            }
        }

        rooms
    }

    fn carve_row(&mut self, from: i32, to: i32, y: i32, z: i32) {
        for x in from.min(to)..=from.max(to) {
            self.set(x, y, z, Tile::Floor);
        }
    }

    fn carve_column(&mut self, from: i32, to: i32, x: i32, z: i32) {
        for y in from.min(to)..=from.max(to) {
            self.set(x, y, z, Tile::Floor);
        }
    }

    fn set(&mut self, x: i32, y: i32, z: i32, tile: Tile) {
        if in_bounds(x, y, z) {
            self.tiles[index(x, y, z)] = tile;
        }
    }

    pub fn columns(&self) -> i32 {
        COLUMNS
    }

    pub fn rows(&self) -> i32 {
        ROWS
    }

    pub fn floors(&self) -> i32 {
        FLOORS
    }

    /// Authoritative tile, ignoring fog.
    pub fn tile(&self, pos: Point3) -> Option<Tile> {
        if self.valid_point(pos) {
            Some(self.tiles[index(pos.x, pos.y, pos.z)])
        } else {
            None
        }
    }

    /// Tile as seen through the fog overlay.
    pub fn tile_at(&self, x: i32, y: i32, z: i32) -> Tile {
        if !in_bounds(x, y, z) || !self.revealed[index(x, y, z)] {
            return Tile::Unrevealed;
        }
        self.tiles[index(x, y, z)]
    }

    fn is(&self, x: i32, y: i32, z: i32, tile: Tile) -> bool {
        in_bounds(x, y, z) && self.tiles[index(x, y, z)] == tile
    }

    pub fn is_empty_floor(&self, x: i32, y: i32, z: i32) -> bool {
        self.is(x, y, z, Tile::Floor)
    }

    pub fn is_stair_up(&self, x: i32, y: i32, z: i32) -> bool {
        self.is(x, y, z, Tile::StairUp)
    }

    pub fn is_stair_down(&self, x: i32, y: i32, z: i32) -> bool {
        self.is(x, y, z, Tile::StairDown)
    }

    pub fn is_unrevealed(&self, x: i32, y: i32, z: i32) -> bool {
        in_bounds(x, y, z) && !self.revealed[index(x, y, z)]
    }

    pub fn walkable_tile(&self, pos: Point3) -> bool {
        self.tile(pos).is_some_and(Tile::is_walkable)
    }

    /// Bounds check only; occupancy is not considered.
    pub fn valid_point(&self, pos: Point3) -> bool {
        in_bounds(pos.x, pos.y, pos.z)
    }

    /// First walkable cell not occupied by any of `excluded`, scanning each
    /// floor row-major before moving to the next floor.
    pub fn find_first_walkable_point<'a, I>(&self, excluded: I) -> Result<Point3, GameError>
    where
        I: IntoIterator<Item = &'a Actor>,
    {
        let taken: HashSet<Point3> = excluded.into_iter().map(|a| a.pos).collect();
        (0..FLOORS)
            .find_map(|z| self.first_free_on_floor(z, &taken))
            .ok_or(GameError::NoSpaceAvailable)
    }

    /// Same scan as `find_first_walkable_point`, limited to one floor.
    pub fn find_first_walkable_on_floor<'a, I>(
        &self,
        z: i32,
        excluded: I,
    ) -> Result<Point3, GameError>
    where
        I: IntoIterator<Item = &'a Actor>,
    {
        let taken: HashSet<Point3> = excluded.into_iter().map(|a| a.pos).collect();
        self.first_free_on_floor(z, &taken)
            .ok_or(GameError::NoSpaceAvailable)
    }

    fn first_free_on_floor(&self, z: i32, taken: &HashSet<Point3>) -> Option<Point3> {
        if !(0..FLOORS).contains(&z) {
            return None;
        }
        (0..ROWS)
            .flat_map(|y| (0..COLUMNS).map(move |x| Point3::new(x, y, z)))
            .find(|p| self.walkable_tile(*p) && !taken.contains(p))
    }

    /// Reveals the cells within `VISIBILITY_RADIUS` of the observer on the
    /// observer's floor. Previously revealed cells stay revealed.
    pub fn update_visible_dungeon(&mut self, observer: &Actor) {
        self.reveal_around(observer.pos);
    }

    pub fn reveal_around(&mut self, center: Point3) {
        if !self.valid_point(center) {
            return;
        }
        for y in center.y - VISIBILITY_RADIUS..=center.y + VISIBILITY_RADIUS {
            for x in center.x - VISIBILITY_RADIUS..=center.x + VISIBILITY_RADIUS {
                if in_bounds(x, y, center.z) {
                    self.revealed[index(x, y, center.z)] = true;
                }
            }
        }
    }

    pub fn reveal_all(&mut self) {
        self.revealed.fill(true);
    }

    /// Locations of the stair pair joining `z` and `z + 1`.
    pub fn stairs_between(&self, z: i32) -> Option<(Point3, Point3)> {
        let up = (0..ROWS)
            .flat_map(|y| (0..COLUMNS).map(move |x| Point3::new(x, y, z)))
            .find(|p| self.is_stair_up(p.x, p.y, p.z))?;
        let down = Point3::new(up.x, up.y, z + 1);
        self.is_stair_down(down.x, down.y, down.z)
            .then_some((up, down))
    }
}

fn pick_stair<R: Rng + ?Sized>(rng: &mut R, rooms: &[Room], avoid: Option<(i32, i32)>) -> (i32, i32) {
    let candidates: Vec<(i32, i32)> = rooms
        .iter()
        .flat_map(Room::interior)
        .filter(|cell| Some(*cell) != avoid)
        .collect();
    // Generated rooms are at least 4x3, so their interiors are never empty.
    candidates[rng.gen_range(0..candidates.len())]
}

impl From<Dungeon> for DungeonLayout {
    fn from(dungeon: Dungeon) -> Self {
        let floors = (0..FLOORS)
            .map(|z| {
                (0..ROWS)
                    .map(|y| {
                        (0..COLUMNS)
                            .map(|x| dungeon.tiles[index(x, y, z)].symbol())
                            .collect()
                    })
                    .collect()
            })
            .collect();
        DungeonLayout { floors }
    }
}

impl TryFrom<DungeonLayout> for Dungeon {
    type Error = GameError;

    fn try_from(layout: DungeonLayout) -> Result<Self, Self::Error> {
        if layout.floors.len() != FLOORS as usize {
            return Err(GameError::InvalidPacket(format!(
                "dungeon has {} floors, expected {}",
                layout.floors.len(),
                FLOORS
            )));
        }

        let mut tiles = Vec::with_capacity(Self::CELLS);
        for (z, floor) in layout.floors.iter().enumerate() {
            if floor.len() != ROWS as usize {
                return Err(GameError::InvalidPacket(format!(
                    "floor {} has {} rows, expected {}",
                    z,
                    floor.len(),
                    ROWS
                )));
            }
            for row in floor {
                if row.chars().count() != COLUMNS as usize {
                    return Err(GameError::InvalidPacket(format!(
                        "row of width {} on floor {}",
                        row.chars().count(),
                        z
                    )));
                }
                for symbol in row.chars() {
                    match Tile::from_symbol(symbol) {
                        Some(Tile::Unrevealed) | None => {
                            return Err(GameError::InvalidPacket(format!(
                                "unknown tile symbol {:?}",
                                symbol
                            )))
                        }
                        Some(tile) => tiles.push(tile),
                    }
                }
            }
        }

        Ok(Self {
            tiles,
            revealed: vec![false; Self::CELLS],
        })
    }
}
