use glam::*;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Axis-aligned bounding box stored as per-axis min/max corners.
///
/// A freshly created box is the inverted sentinel (min > max): it contains
/// nothing, never intersects a ray and has zero area.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

/// Capability set the builder needs from a primitive: a bounding box and a
/// centroid for split-axis comparisons.
pub trait Bounds {
    fn bounds(&self) -> Aabb;

    fn centroid(&self) -> Vec3 {
        self.bounds().center()
    }
}

impl Display for Aabb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (min, max) = self.points();

        write!(
            f,
            "(min: ({}, {}, {}), max: ({}, {}, {}))",
            min.x, min.y, min.z, max.x, max.y, max.z,
        )
    }
}

impl Aabb {
    pub fn new() -> Aabb {
        Aabb {
            min: [1e34; 3],
            max: [-1e34; 3],
        }
    }

    pub fn from_points(min: Vec3, max: Vec3) -> Aabb {
        Aabb {
            min: min.into(),
            max: max.into(),
        }
    }

    /// Slab test against a ray with precomputed inverse direction.
    /// Returns the near/far distances when the box is hit before `t`.
    pub fn intersect(&self, origin: Vec3, dir_inverse: Vec3, t: f32) -> Option<(f32, f32)> {
        let (min, max) = self.points();

        let t1 = (min - origin) * dir_inverse;
        let t2 = (max - origin) * dir_inverse;

        let t_min = t1.min(t2);
        let t_max = t1.max(t2);

        let t_min = t_min.x.max(t_min.y.max(t_min.z));
        let t_max = t_max.x.min(t_max.y.min(t_max.z));

        if t_max > t_min && t_min < t {
            return Some((t_min, t_max));
        }

        None
    }

    pub fn grow(&mut self, pos: Vec3) {
        let (min, max) = self.points();

        self.min = min.min(pos).into();
        self.max = max.max(pos).into();
    }

    pub fn grow_bb(&mut self, aabb: &Aabb) {
        let (min, max) = self.points();
        let (b_min, b_max) = aabb.points();
        self.min = min.min(b_min).into();
        self.max = max.max(b_max).into();
    }

    pub fn union_of(&self, aabb: &Aabb) -> Aabb {
        let (min, max) = self.points();
        let (b_min, b_max) = aabb.points();
        Aabb {
            min: min.min(b_min).into(),
            max: max.max(b_max).into(),
        }
    }

    /// Finite with min <= max on every axis. The inverted sentinel is not
    /// valid; a grown box always is.
    pub fn is_valid(&self) -> bool {
        (0..3).all(|i| {
            self.min[i].is_finite() && self.max[i].is_finite() && self.min[i] <= self.max[i]
        })
    }

    pub fn contains_bb(&self, aabb: &Aabb) -> bool {
        (0..3).all(|i| self.min[i] <= aabb.min[i] && self.max[i] >= aabb.max[i])
    }

    pub fn center(&self) -> Vec3 {
        let (min, max) = self.points();
        (min + max) * 0.5
    }

    /// Surface area, clamped to zero so a never-grown box (negative extents)
    /// cannot contribute a negative or NaN split cost.
    pub fn area(&self) -> f32 {
        let e = self.lengths();
        let value: f32 = 2.0 * (e.x * e.y + e.x * e.z + e.y * e.z);

        0.0_f32.max(value)
    }

    /// SAH cost of keeping `count` primitives under this box. An empty box
    /// with count 0 costs 0.
    pub fn sah_cost(&self, count: usize) -> f32 {
        self.area() * count as f32
    }

    pub fn lengths(&self) -> Vec3 {
        Vec3::from(self.max) - Vec3::from(self.min)
    }

    pub fn extend(&self, axis: usize) -> f32 {
        self.max[axis] - self.min[axis]
    }

    pub fn longest_axis(&self) -> usize {
        let mut a: usize = 0;
        if self.extend(1) > self.extend(0) {
            a = 1;
        }
        if self.extend(2) > self.extend(a) {
            a = 2
        }
        a
    }

    pub fn points(&self) -> (Vec3, Vec3) {
        (self.min.into(), self.max.into())
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new()
    }
}
