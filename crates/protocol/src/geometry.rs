//! Integer world-space geometry.
//!
//! Positions are plain integer pairs on the wire. Arithmetic is done through
//! glam's integer and double vectors.

use glam::IVec2;
use serde::{Deserialize, Serialize};
use std::ops::Add;

/// A 2-D integer position or offset in world units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vector {
    pub x: i32,
    pub y: i32,
}

impl Vector {
    pub const ZERO: Self = Self::new(0, 0);

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn as_ivec2(self) -> IVec2 {
        IVec2::new(self.x, self.y)
    }

    /// Euclidean distance between two positions.
    #[inline]
    pub fn distance(self, other: Vector) -> f64 {
        self.as_ivec2().as_dvec2().distance(other.as_ivec2().as_dvec2())
    }

    /// Returns this position moved by `(dx, dy)`.
    #[inline]
    pub fn translate(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Take one step towards `target`.
    ///
    /// Each axis of the raw delta is clamped to `step` independently, so a
    /// diagonal step covers more ground than a straight one. The step never
    /// overshoots the target.
    #[inline]
    pub fn step_towards(self, target: Vector, step: i32) -> Self {
        let step = step.abs();
        let delta = target.as_ivec2() - self.as_ivec2();
        let clamped = delta.clamp(IVec2::splat(-step), IVec2::splat(step));
        (self.as_ivec2() + clamped).into()
    }
}

impl From<IVec2> for Vector {
    fn from(v: IVec2) -> Self {
        Self::new(v.x, v.y)
    }
}

impl Add for Vector {
    type Output = Vector;

    fn add(self, rhs: Vector) -> Vector {
        (self.as_ivec2() + rhs.as_ivec2()).into()
    }
}

/// Current and maximum hitpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Hitpoints {
    pub current: i32,
    pub max: i32,
}

impl Hitpoints {
    pub const fn full(max: i32) -> Self {
        Self { current: max, max }
    }

    #[inline]
    pub fn is_depleted(&self) -> bool {
        self.current <= 0
    }

    /// Subtract `amount`, never going below zero.
    pub fn take_damage(&mut self, amount: i32) {
        self.current = (self.current - amount).max(0);
    }

    pub fn restore(&mut self) {
        self.current = self.max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Vector::new(0, 0);
        let b = Vector::new(3, 4);
        assert_eq!(a.distance(b), 5.0);
        assert_eq!(b.distance(a), 5.0);
    }

    #[test]
    fn test_step_clamps_each_axis() {
        let from = Vector::new(0, 0);
        assert_eq!(from.step_towards(Vector::new(100, 10), 25), Vector::new(25, 10));
        assert_eq!(from.step_towards(Vector::new(-100, -100), 25), Vector::new(-25, -25));
    }

    #[test]
    fn test_step_never_overshoots() {
        let from = Vector::new(10, 10);
        assert_eq!(from.step_towards(Vector::new(20, 5), 25), Vector::new(20, 5));
        assert_eq!(from.step_towards(from, 25), from);
    }

    #[test]
    fn test_hitpoints_floor_at_zero() {
        let mut hp = Hitpoints::full(50);
        hp.take_damage(70);
        assert_eq!(hp.current, 0);
        assert!(hp.is_depleted());
        hp.restore();
        assert_eq!(hp, Hitpoints::full(50));
    }
}
