use serde::{Deserialize, Serialize};
use std::fmt;

/// A cell coordinate (column, row, floor). Also used as a movement delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Point3 {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// A same-floor delta.
    pub const fn planar(dx: i32, dy: i32) -> Self {
        Self { x: dx, y: dy, z: 0 }
    }

    pub fn offset(&self, delta: Point3) -> Point3 {
        Point3 {
            x: self.x + delta.x,
            y: self.y + delta.y,
            z: self.z + delta.z,
        }
    }

    pub fn translate(&mut self, delta: Point3) {
        *self = self.offset(delta);
    }

    /// Chebyshev distance on the same floor, `None` across floors.
    pub fn planar_distance(&self, other: &Point3) -> Option<i32> {
        if self.z != other.z {
            return None;
        }
        Some((self.x - other.x).abs().max((self.y - other.y).abs()))
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
