use glam::*;
use serde::{Deserialize, Serialize};

use crate::aabb::{Aabb, Bounds};

/// Sphere primitive in the stride-8 scene layout: center, radius and a
/// simple diffuse material (color + roughness).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Sphere {
    pub center: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
    pub roughness: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Sphere {
        assert!(radius >= 0.0, "sphere radius must be non-negative: {}", radius);
        Sphere {
            center: center.into(),
            radius,
            color: [1.0; 3],
            roughness: 1.0,
        }
    }

    pub fn with_material(mut self, color: Vec3, roughness: f32) -> Sphere {
        self.color = color.into();
        self.roughness = roughness;
        self
    }

    /// Nearest intersection distance within (t_min, t_max), if any.
    pub fn intersect(&self, origin: Vec3, dir: Vec3, t_min: f32, t_max: f32) -> Option<f32> {
        let oc = origin - Vec3::from(self.center);
        let a = dir.dot(dir);
        let half_b = oc.dot(dir);
        let c = oc.dot(oc) - self.radius * self.radius;

        let discriminant = half_b * half_b - a * c;
        if discriminant < 0.0 {
            return None;
        }

        let sqrt_d = discriminant.sqrt();
        let mut root = (-half_b - sqrt_d) / a;
        if root <= t_min || root >= t_max {
            root = (-half_b + sqrt_d) / a;
            if root <= t_min || root >= t_max {
                return None;
            }
        }

        Some(root)
    }
}

impl Bounds for Sphere {
    fn bounds(&self) -> Aabb {
        let center = Vec3::from(self.center);
        let extent = Vec3::splat(self.radius);
        Aabb::from_points(center - extent, center + extent)
    }

    fn centroid(&self) -> Vec3 {
        self.center.into()
    }
}

/// Triangle primitive: three corners and a color. The centroid is the
/// corner average, not the bounding-box center.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Triangle {
    pub vertices: [[f32; 3]; 3],
    pub color: [f32; 3],
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Triangle {
        Triangle {
            vertices: [v0.into(), v1.into(), v2.into()],
            color: [1.0; 3],
        }
    }

    pub fn with_color(mut self, color: Vec3) -> Triangle {
        self.color = color.into();
        self
    }

    pub fn corners(&self) -> (Vec3, Vec3, Vec3) {
        (
            self.vertices[0].into(),
            self.vertices[1].into(),
            self.vertices[2].into(),
        )
    }

    /// Möller–Trumbore ray/triangle test within (t_min, t_max).
    pub fn intersect(&self, origin: Vec3, dir: Vec3, t_min: f32, t_max: f32) -> Option<f32> {
        let (v0, v1, v2) = self.corners();
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        let h = dir.cross(edge2);
        let a = edge1.dot(h);
        if a.abs() < 1e-8 {
            return None;
        }

        let f = 1.0 / a;
        let s = origin - v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * dir.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(q);
        if t > t_min && t < t_max {
            Some(t)
        } else {
            None
        }
    }
}

impl Bounds for Triangle {
    fn bounds(&self) -> Aabb {
        let (v0, v1, v2) = self.corners();
        Aabb::from_points(v0.min(v1).min(v2), v0.max(v1).max(v2))
    }

    fn centroid(&self) -> Vec3 {
        let (v0, v1, v2) = self.corners();
        (v0 + v1 + v2) / 3.0
    }
}

/// Tagged union over the supported primitive kinds so heterogeneous scenes
/// can share one index array.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    Sphere(Sphere),
    Triangle(Triangle),
}

impl Primitive {
    pub fn intersect(&self, origin: Vec3, dir: Vec3, t_min: f32, t_max: f32) -> Option<f32> {
        match self {
            Primitive::Sphere(sphere) => sphere.intersect(origin, dir, t_min, t_max),
            Primitive::Triangle(triangle) => triangle.intersect(origin, dir, t_min, t_max),
        }
    }
}

impl Bounds for Primitive {
    fn bounds(&self) -> Aabb {
        match self {
            Primitive::Sphere(sphere) => sphere.bounds(),
            Primitive::Triangle(triangle) => triangle.bounds(),
        }
    }

    fn centroid(&self) -> Vec3 {
        match self {
            Primitive::Sphere(sphere) => sphere.centroid(),
            Primitive::Triangle(triangle) => triangle.centroid(),
        }
    }
}

impl From<Sphere> for Primitive {
    fn from(sphere: Sphere) -> Self {
        Primitive::Sphere(sphere)
    }
}

impl From<Triangle> for Primitive {
    fn from(triangle: Triangle) -> Self {
        Primitive::Triangle(triangle)
    }
}
