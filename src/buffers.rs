//! GPU-uploadable buffer layouts. All records are `repr(C)` and `Pod`, so a
//! renderer can hand `bytemuck::cast_slice` output straight to its buffer
//! uploads; the index array (`Bvh::prim_indices`) is uploaded as-is.

use bytemuck::{Pod, Zeroable};

use crate::bvh::Bvh;
use crate::primitive::{Sphere, Triangle};

/// Stride 8 floats: `[center.xyz, radius, color.rgb, roughness]`.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuSphere {
    pub center: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
    pub roughness: f32,
}

/// Stride 16 floats: three padded corners followed by a padded color.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuTriangle {
    pub v0: [f32; 3],
    _pad0: f32,
    pub v1: [f32; 3],
    _pad1: f32,
    pub v2: [f32; 3],
    _pad2: f32,
    pub color: [f32; 3],
    _pad3: f32,
}

/// Stride 8 floats: `[min.xyz, count, max.xyz, contents]` where `contents`
/// is the left-child index when `count == 0` and the first index-array
/// offset otherwise.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuNode {
    pub min: [f32; 3],
    pub count: f32,
    pub max: [f32; 3],
    pub contents: f32,
}

pub fn pack_spheres(spheres: &[Sphere]) -> Vec<GpuSphere> {
    spheres
        .iter()
        .map(|sphere| GpuSphere {
            center: sphere.center,
            radius: sphere.radius,
            color: sphere.color,
            roughness: sphere.roughness,
        })
        .collect()
}

pub fn pack_triangles(triangles: &[Triangle]) -> Vec<GpuTriangle> {
    triangles
        .iter()
        .map(|triangle| GpuTriangle {
            v0: triangle.vertices[0],
            _pad0: 0.0,
            v1: triangle.vertices[1],
            _pad1: 0.0,
            v2: triangle.vertices[2],
            _pad2: 0.0,
            color: triangle.color,
            _pad3: 0.0,
        })
        .collect()
}

pub fn pack_nodes(bvh: &Bvh) -> Vec<GpuNode> {
    bvh.nodes
        .iter()
        .map(|node| GpuNode {
            min: node.bounds.min,
            count: node.count as f32,
            max: node.bounds.max,
            contents: node.left_first as f32,
        })
        .collect()
}
