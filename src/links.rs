use glam::*;
use serde::{Deserialize, Serialize};

use crate::bvh_node::BvhNode;

/// Traversal terminates when a link points here.
pub const LINK_TERMINATE: i32 = -1;

/// Per-node jump targets for stackless traversal.
///
/// `hit` is where to go after this node's box is intersected: the left
/// child for internal nodes, the next node in depth-first pre-order for
/// leaves (identical to `miss` there). `miss` skips the node's subtree:
/// the right sibling of the nearest ancestor whose left subtree contains
/// this node, or [`LINK_TERMINATE`] from the root.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct NodeLinks {
    pub hit: i32,
    pub miss: i32,
}

/// Computes hit/miss links for every node. Pure with respect to bounds and
/// leaf contents; called once after construction.
pub fn build_links(nodes: &[BvhNode], parents: &[u32]) -> Vec<NodeLinks> {
    assert_eq!(nodes.len(), parents.len());

    nodes
        .iter()
        .enumerate()
        .map(|(id, node)| {
            let miss = miss_link(nodes, parents, id);
            let hit = if node.has_children() {
                node.left_child() as i32
            } else {
                miss
            };
            NodeLinks { hit, miss }
        })
        .collect()
}

// Walk up the parent indices until the node sits in a left subtree, then
// jump to that ancestor's right child.
fn miss_link(nodes: &[BvhNode], parents: &[u32], mut id: usize) -> i32 {
    while id != 0 {
        let parent = parents[id] as usize;
        if id as u32 == nodes[parent].left_child() {
            return nodes[parent].right_child() as i32;
        }
        id = parent;
    }
    LINK_TERMINATE
}

/// Stackless loop traversal over precomputed links. Visits the same leaf
/// primitives as the stack-based walk and reports the same nearest hit;
/// the closure contract matches [`BvhNode::traverse`].
pub fn traverse_links<I, R>(
    nodes: &[BvhNode],
    links: &[NodeLinks],
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
    if nodes.is_empty() {
        return None;
    }

    let dir_inverse = Vec3::ONE / dir;
    let mut t = t_max;
    let mut hit_record = None;
    let mut current: i32 = 0;

    while current != LINK_TERMINATE {
        let node = &nodes[current as usize];
        let link = links[current as usize];

        current = if node.bounds.intersect(origin, dir_inverse, t).is_some() {
            if node.is_leaf() {
                for i in 0..node.count {
                    let prim_id = prim_indices[(node.left_first + i) as usize];
                    if let Some((new_t, new_hit)) = intersection_test(prim_id as usize, t_min, t) {
                        t = new_t;
                        hit_record = Some(new_hit);
                    }
                }
            }
            link.hit
        } else {
            link.miss
        };
    }

    hit_record
}
