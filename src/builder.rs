use rayon::prelude::*;

use crate::aabb::{Aabb, Bounds};
use crate::bvh_node::BvhNode;

/// Everything a build produces: the node table (truncated to the used
/// count), the permuted index array and the per-node parent indices.
#[derive(Debug, Clone)]
pub struct BvhResult {
    pub nodes: Vec<BvhNode>,
    pub prim_indices: Vec<u32>,
    pub parents: Vec<u32>,
}

pub trait BvhBuilder {
    fn build<T: Bounds + Sync>(&self, prims: &[T]) -> BvhResult;
}

/// Top-down builder driven by the surface area heuristic.
///
/// Nodes with fewer primitives than `sweep_threshold` search every centroid
/// coordinate on the longest axis exhaustively; larger nodes use a binned
/// approximation with `bins` buckets. A node is only split when the best
/// split costs strictly less than leaving it a leaf, so degenerate input
/// (coincident primitives) terminates in a single leaf.
#[derive(Debug, Copy, Clone)]
pub struct SahBuilder {
    bins: usize,
    sweep_threshold: usize,
}

impl Default for SahBuilder {
    fn default() -> Self {
        Self::new(32, 64)
    }
}

/// Best split candidate on an axis: partition plane and SAH cost.
#[derive(Debug, Copy, Clone)]
struct SplitCandidate {
    position: f32,
    cost: f32,
}

impl SahBuilder {
    pub fn new(bins: usize, sweep_threshold: usize) -> Self {
        assert!(bins >= 2, "need at least 2 bins, got {}", bins);
        Self {
            bins,
            sweep_threshold,
        }
    }

    /// Builds into caller-owned, pre-sized storage and returns the number of
    /// nodes used.
    ///
    /// `prim_indices` must hold the identity permutation, `nodes` must have
    /// room for the `2n + 1` worst case and `parents` must match `nodes` in
    /// length. Violating these preconditions, or passing invalid
    /// (non-finite or inverted) primitive bounds, is a caller bug and
    /// panics. An empty primitive set is valid and yields a single node
    /// with `count == 0` and the inverted sentinel box.
    pub fn build_into(
        &self,
        aabbs: &[Aabb],
        centroids: &[[f32; 3]],
        prim_indices: &mut [u32],
        nodes: &mut [BvhNode],
        parents: &mut [u32],
    ) -> usize {
        let prim_count = aabbs.len();
        assert_eq!(centroids.len(), prim_count);
        assert_eq!(prim_indices.len(), prim_count);
        assert_eq!(parents.len(), nodes.len());
        assert!(!nodes.is_empty(), "node table must hold at least one node");
        assert!(
            nodes.len() >= 2 * prim_count + 1,
            "node table holds {} nodes, worst case needs {}",
            nodes.len(),
            2 * prim_count + 1
        );
        for (i, aabb) in aabbs.iter().enumerate() {
            assert!(aabb.is_valid(), "primitive {} has invalid bounds {}", i, aabb);
        }

        nodes[0] = BvhNode::new();
        parents[0] = 0;
        if prim_count == 0 {
            return 1;
        }

        nodes[0].left_first = 0;
        nodes[0].count = prim_count as u32;

        let mut pool_ptr = 1;
        self.subdivide(0, aabbs, centroids, prim_indices, nodes, parents, &mut pool_ptr);
        pool_ptr
    }

    fn subdivide(
        &self,
        node_id: usize,
        aabbs: &[Aabb],
        centroids: &[[f32; 3]],
        prim_indices: &mut [u32],
        nodes: &mut [BvhNode],
        parents: &mut [u32],
        pool_ptr: &mut usize,
    ) {
        Self::update_bounds(node_id, aabbs, prim_indices, nodes);

        let node = nodes[node_id];
        if node.count < 2 {
            return;
        }

        let first = node.left_first as usize;
        let count = node.count as usize;
        let axis = node.bounds.longest_axis();

        let candidate = if count < self.sweep_threshold {
            Self::sweep_split(aabbs, centroids, &prim_indices[first..first + count], axis)
        } else {
            self.binned_split(
                aabbs,
                centroids,
                &prim_indices[first..first + count],
                axis,
                &node.bounds,
            )
        };

        let candidate = match candidate {
            Some(candidate) => candidate,
            None => return,
        };

        // The split has to pay for itself.
        if candidate.cost >= node.bounds.sah_cost(count) {
            return;
        }

        let mut i = first;
        let mut j = first + count - 1;
        while i <= j {
            if centroids[prim_indices[i] as usize][axis] < candidate.position {
                i += 1;
            } else {
                prim_indices.swap(i, j);
                if j == 0 {
                    break;
                }
                j -= 1;
            }
        }

        let left_count = i - first;
        if left_count == 0 || left_count == count {
            // One-sided partition, keep the node as a leaf.
            return;
        }

        let left_child = *pool_ptr;
        *pool_ptr += 2;

        nodes[left_child] = BvhNode {
            bounds: Aabb::new(),
            left_first: first as u32,
            count: left_count as u32,
        };
        nodes[left_child + 1] = BvhNode {
            bounds: Aabb::new(),
            left_first: i as u32,
            count: (count - left_count) as u32,
        };
        parents[left_child] = node_id as u32;
        parents[left_child + 1] = node_id as u32;

        nodes[node_id].left_first = left_child as u32;
        nodes[node_id].count = 0;

        self.subdivide(left_child, aabbs, centroids, prim_indices, nodes, parents, pool_ptr);
        self.subdivide(left_child + 1, aabbs, centroids, prim_indices, nodes, parents, pool_ptr);
    }

    fn update_bounds(node_id: usize, aabbs: &[Aabb], prim_indices: &[u32], nodes: &mut [BvhNode]) {
        let node = nodes[node_id];
        let mut aabb = Aabb::new();
        for i in 0..node.count {
            let prim_id = prim_indices[(node.left_first + i) as usize];
            aabb.grow_bb(&aabbs[prim_id as usize]);
        }
        nodes[node_id].bounds = aabb;
    }

    /// Exhaustive O(n^2) search: every centroid coordinate on the axis is a
    /// candidate plane. Candidates are scanned in increasing coordinate
    /// order and only a strictly lower cost replaces the incumbent, so ties
    /// resolve to the first candidate and trees are reproducible.
    fn sweep_split(
        aabbs: &[Aabb],
        centroids: &[[f32; 3]],
        prim_indices: &[u32],
        axis: usize,
    ) -> Option<SplitCandidate> {
        let mut candidates: Vec<f32> = prim_indices
            .iter()
            .map(|&id| centroids[id as usize][axis])
            .collect();
        candidates.sort_by(f32::total_cmp);

        let mut best: Option<SplitCandidate> = None;
        for position in candidates {
            let mut left_box = Aabb::new();
            let mut right_box = Aabb::new();
            let mut left_count = 0;
            let mut right_count = 0;

            for &id in prim_indices {
                let id = id as usize;
                if centroids[id][axis] < position {
                    left_box.grow_bb(&aabbs[id]);
                    left_count += 1;
                } else {
                    right_box.grow_bb(&aabbs[id]);
                    right_count += 1;
                }
            }

            let cost = left_box.sah_cost(left_count) + right_box.sah_cost(right_count);
            if best.map_or(true, |best| cost < best.cost) {
                best = Some(SplitCandidate { position, cost });
            }
        }

        best
    }

    /// Binned O(n) search: bucket centroids along the axis, then evaluate
    /// cumulative left/right bounds and counts at every bin boundary,
    /// scanning boundaries in increasing coordinate order with the same
    /// strict-improvement tie-break as the sweep.
    fn binned_split(
        &self,
        aabbs: &[Aabb],
        centroids: &[[f32; 3]],
        prim_indices: &[u32],
        axis: usize,
        node_bounds: &Aabb,
    ) -> Option<SplitCandidate> {
        let axis_min = node_bounds.min[axis];
        let extent = node_bounds.extend(axis);
        if extent < 1e-6 {
            // All centroids coincide on the split axis.
            return None;
        }

        let bins = self.bins;
        let scale = bins as f32 / extent;

        let mut bin_bounds = vec![Aabb::new(); bins];
        let mut bin_counts = vec![0_usize; bins];

        for &id in prim_indices {
            let id = id as usize;
            let bin = (((centroids[id][axis] - axis_min) * scale) as usize).min(bins - 1);
            bin_counts[bin] += 1;
            bin_bounds[bin].grow_bb(&aabbs[id]);
        }

        let mut left_area = vec![0.0_f32; bins];
        let mut left_count = vec![0_usize; bins];
        let mut right_area = vec![0.0_f32; bins];
        let mut right_count = vec![0_usize; bins];

        let mut current_box = Aabb::new();
        let mut current_sum = 0;
        for i in 0..bins {
            current_sum += bin_counts[i];
            current_box.grow_bb(&bin_bounds[i]);
            left_area[i] = current_box.area();
            left_count[i] = current_sum;
        }

        let mut current_box = Aabb::new();
        let mut current_sum = 0;
        for i in (0..bins).rev() {
            current_sum += bin_counts[i];
            current_box.grow_bb(&bin_bounds[i]);
            right_area[i] = current_box.area();
            right_count[i] = current_sum;
        }

        let mut best: Option<SplitCandidate> = None;
        for i in 0..(bins - 1) {
            if left_count[i] == 0 || right_count[i + 1] == 0 {
                continue;
            }
            let cost = left_area[i] * left_count[i] as f32
                + right_area[i + 1] * right_count[i + 1] as f32;
            if best.map_or(true, |best| cost < best.cost) {
                let position = axis_min + extent * (i + 1) as f32 / bins as f32;
                best = Some(SplitCandidate { position, cost });
            }
        }

        best
    }
}

impl BvhBuilder for SahBuilder {
    fn build<T: Bounds + Sync>(&self, prims: &[T]) -> BvhResult {
        let aabbs: Vec<Aabb> = prims.par_iter().map(|prim| prim.bounds()).collect();
        let centroids: Vec<[f32; 3]> = prims
            .par_iter()
            .map(|prim| prim.centroid().into())
            .collect();

        let capacity = 2 * prims.len() + 1;
        let mut nodes = vec![BvhNode::new(); capacity];
        let mut parents = vec![0_u32; capacity];
        let mut prim_indices: Vec<u32> = (0..prims.len() as u32).collect();

        let used = self.build_into(
            &aabbs,
            &centroids,
            &mut prim_indices,
            &mut nodes,
            &mut parents,
        );
        nodes.truncate(used);
        parents.truncate(used);

        BvhResult {
            nodes,
            prim_indices,
            parents,
        }
    }
}
