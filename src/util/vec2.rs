use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Sub};

/// 2D position/vector in simulation map coordinates
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        self.length_sq().sqrt()
    }

    #[inline]
    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Squared distance; prefer this for comparisons against a radius
    #[inline]
    pub fn distance_sq_to(&self, other: Vec2) -> f32 {
        (*self - other).length_sq()
    }

    /// True if `other` lies within `radius` (inclusive)
    #[inline]
    pub fn within(&self, other: Vec2, radius: f32) -> bool {
        self.distance_sq_to(other) <= radius * radius
    }

    /// Point `distance` units from `self` along the direction to `target`
    /// (never overshoots the target)
    pub fn towards(&self, target: Vec2, distance: f32) -> Self {
        let delta = target - *self;
        let len = delta.length();
        if len <= distance || len == 0.0 {
            target
        } else {
            *self + delta * (distance / len)
        }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Arithmetic mean of a set of points, `None` if the set is empty
    pub fn centroid<I>(points: I) -> Option<Vec2>
    where
        I: IntoIterator<Item = Vec2>,
    {
        let mut sum = Vec2::ZERO;
        let mut count = 0u32;
        for p in points {
            sum += p;
            count += 1;
        }
        if count == 0 {
            None
        } else {
            Some(sum / count as f32)
        }
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl Div<f32> for Vec2 {
    type Output = Self;
    fn div(self, rhs: f32) -> Self {
        Self {
            x: self.x / rhs,
            y: self.y / rhs,
        }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_length() {
        let v = Vec2::new(3.0, 4.0);
        assert!(approx_eq(v.length(), 5.0));
        assert!(approx_eq(v.length_sq(), 25.0));
    }

    #[test]
    fn test_distance() {
        let a = Vec2::new(1.0, 1.0);
        let b = Vec2::new(4.0, 5.0);
        assert!(approx_eq(a.distance_sq_to(b), 25.0));
    }

    #[test]
    fn test_within_is_inclusive() {
        let a = Vec2::ZERO;
        assert!(a.within(Vec2::new(3.0, 4.0), 5.0));
        assert!(!a.within(Vec2::new(3.0, 4.1), 5.0));
    }

    #[test]
    fn test_towards_stops_at_target() {
        let start = Vec2::ZERO;
        let target = Vec2::new(10.0, 0.0);
        assert_eq!(start.towards(target, 4.0), Vec2::new(4.0, 0.0));
        assert_eq!(start.towards(target, 40.0), target);
    }

    #[test]
    fn test_centroid() {
        let points = [Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0), Vec2::new(2.0, 6.0)];
        let c = Vec2::centroid(points).unwrap();
        assert!(approx_eq(c.x, 2.0));
        assert!(approx_eq(c.y, 2.0));
    }

    #[test]
    fn test_centroid_empty() {
        assert_eq!(Vec2::centroid(std::iter::empty()), None);
    }
}
