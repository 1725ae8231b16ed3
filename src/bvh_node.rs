use glam::*;
use serde::{Deserialize, Serialize};

use crate::Aabb;

/// One node of the hierarchy, packable to a stride-8 GPU record.
///
/// A node is a leaf iff `count > 0`; `left_first` is then the offset of its
/// first primitive in the index array. An internal node has `count == 0` and
/// `left_first` pointing at its first child (children are allocated as an
/// adjacent pair). The single node of an empty hierarchy has `count == 0`
/// and `left_first == 0`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct BvhNode {
    pub bounds: Aabb,
    pub left_first: u32,
    pub count: u32,
}

impl BvhNode {
    pub fn new() -> BvhNode {
        BvhNode {
            bounds: Aabb::new(),
            left_first: 0,
            count: 0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }

    pub fn has_children(&self) -> bool {
        self.count == 0 && self.left_first > 0
    }

    pub fn left_child(&self) -> u32 {
        self.left_first
    }

    pub fn right_child(&self) -> u32 {
        self.left_first + 1
    }

    /// Ordered stack traversal reporting the closest accepted hit.
    ///
    /// `intersection_test(prim_id, t_min, t)` returns the new hit distance
    /// and payload when the primitive is hit closer than `t`.
    ///
    /// The traversal stack holds 64 entries, so trees deeper than 64 levels
    /// are not supported. Cost-based subdivision keeps real trees far
    /// shallower; the limit is asserted in debug builds.
    pub fn traverse<I, R>(
        tree: &[BvhNode],
        prim_indices: &[u32],
        origin: Vec3,
        dir: Vec3,
        t_min: f32,
        t_max: f32,
        mut intersection_test: I,
    ) -> Option<R>
    where
        I: FnMut(usize, f32, f32) -> Option<(f32, R)>,
        R: Copy,
    {
        let mut t = t_max;
        let mut hit_record = None;

        let dir_inverse = Vec3::ONE / dir;
        if tree.is_empty() || tree[0].bounds.intersect(origin, dir_inverse, t).is_none() {
            return None;
        }

        let mut hit_stack = [0_u32; 64];
        let mut stack_ptr: i32 = 0;

        while stack_ptr >= 0 {
            let node = &tree[hit_stack[stack_ptr as usize] as usize];
            stack_ptr -= 1;

            if node.is_leaf() {
                for i in 0..node.count {
                    let prim_id = prim_indices[(node.left_first + i) as usize];
                    if let Some((new_t, new_hit)) = intersection_test(prim_id as usize, t_min, t) {
                        t = new_t;
                        hit_record = Some(new_hit);
                    }
                }
            } else if node.has_children() {
                let hit_left = tree[node.left_child() as usize]
                    .bounds
                    .intersect(origin, dir_inverse, t);
                let hit_right = tree[node.right_child() as usize]
                    .bounds
                    .intersect(origin, dir_inverse, t);
                stack_ptr = Self::sort_nodes(
                    hit_left,
                    hit_right,
                    hit_stack.as_mut(),
                    stack_ptr,
                    node.left_first,
                );
            }
        }

        hit_record
    }

    /// Like [`traverse`](Self::traverse) but only tracks the hit distance.
    pub fn traverse_t<I>(
        tree: &[BvhNode],
        prim_indices: &[u32],
        origin: Vec3,
        dir: Vec3,
        t_min: f32,
        t_max: f32,
        mut intersection_test: I,
    ) -> Option<f32>
    where
        I: FnMut(usize, f32, f32) -> Option<f32>,
    {
        let mut t = t_max;

        let dir_inverse = Vec3::ONE / dir;
        if tree.is_empty() || tree[0].bounds.intersect(origin, dir_inverse, t).is_none() {
            return None;
        }

        let mut hit_stack = [0_u32; 64];
        let mut stack_ptr: i32 = 0;

        while stack_ptr >= 0 {
            let node = &tree[hit_stack[stack_ptr as usize] as usize];
            stack_ptr -= 1;

            if node.is_leaf() {
                for i in 0..node.count {
                    let prim_id = prim_indices[(node.left_first + i) as usize];
                    if let Some(new_t) = intersection_test(prim_id as usize, t_min, t) {
                        t = new_t;
                    }
                }
            } else if node.has_children() {
                let hit_left = tree[node.left_child() as usize]
                    .bounds
                    .intersect(origin, dir_inverse, t);
                let hit_right = tree[node.right_child() as usize]
                    .bounds
                    .intersect(origin, dir_inverse, t);
                stack_ptr = Self::sort_nodes(
                    hit_left,
                    hit_right,
                    hit_stack.as_mut(),
                    stack_ptr,
                    node.left_first,
                );
            }
        }

        if t < t_max {
            Some(t)
        } else {
            None
        }
    }

    /// Early-out occlusion traversal for shadow rays.
    pub fn occludes<I>(
        tree: &[BvhNode],
        prim_indices: &[u32],
        origin: Vec3,
        dir: Vec3,
        t_min: f32,
        t_max: f32,
        mut intersection_test: I,
    ) -> bool
    where
        I: FnMut(usize, f32, f32) -> bool,
    {
        let dir_inverse = Vec3::ONE / dir;
        if tree.is_empty() || tree[0].bounds.intersect(origin, dir_inverse, t_max).is_none() {
            return false;
        }

        let mut hit_stack = [0_u32; 64];
        let mut stack_ptr: i32 = 0;

        while stack_ptr >= 0 {
            let node = &tree[hit_stack[stack_ptr as usize] as usize];
            stack_ptr -= 1;

            if node.is_leaf() {
                for i in 0..node.count {
                    let prim_id = prim_indices[(node.left_first + i) as usize];
                    if intersection_test(prim_id as usize, t_min, t_max) {
                        return true;
                    }
                }
            } else if node.has_children() {
                let hit_left = tree[node.left_child() as usize].bounds.intersect(
                    origin,
                    dir_inverse,
                    t_max,
                );
                let hit_right = tree[node.right_child() as usize].bounds.intersect(
                    origin,
                    dir_inverse,
                    t_max,
                );
                stack_ptr = Self::sort_nodes(
                    hit_left,
                    hit_right,
                    hit_stack.as_mut(),
                    stack_ptr,
                    node.left_first,
                );
            }
        }

        false
    }

    // Push hit children, near child on top of the stack.
    fn sort_nodes(
        left: Option<(f32, f32)>,
        right: Option<(f32, f32)>,
        hit_stack: &mut [u32],
        mut stack_ptr: i32,
        left_first: u32,
    ) -> i32 {
        debug_assert!(
            stack_ptr < hit_stack.len() as i32 - 2,
            "traversal stack exhausted at depth {}",
            stack_ptr
        );

        match (left, right) {
            (Some((t_near_left, _)), Some((t_near_right, _))) => {
                if t_near_left < t_near_right {
                    stack_ptr += 1;
                    hit_stack[stack_ptr as usize] = left_first + 1;
                    stack_ptr += 1;
                    hit_stack[stack_ptr as usize] = left_first;
                } else {
                    stack_ptr += 1;
                    hit_stack[stack_ptr as usize] = left_first;
                    stack_ptr += 1;
                    hit_stack[stack_ptr as usize] = left_first + 1;
                }
            }
            (Some(_), None) => {
                stack_ptr += 1;
                hit_stack[stack_ptr as usize] = left_first;
            }
            (None, Some(_)) => {
                stack_ptr += 1;
                hit_stack[stack_ptr as usize] = left_first + 1;
            }
            (None, None) => {}
        }

        stack_ptr
    }
}

impl Default for BvhNode {
    fn default() -> Self {
        Self::new()
    }
}
