use glam::*;
use serde::{Deserialize, Serialize};

use crate::aabb::{Aabb, Bounds};
use crate::builder::{BvhBuilder, BvhResult, SahBuilder};
use crate::bvh_node::BvhNode;
use crate::links::{self, NodeLinks};

/// A built hierarchy: flat node table plus the permuted primitive index
/// array. Construction mutates both exclusively; afterwards the whole
/// structure is read-only and can be shared freely between traversal
/// readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bvh {
    pub nodes: Vec<BvhNode>,
    pub prim_indices: Vec<u32>,
    parents: Vec<u32>,
}

impl Bvh {
    /// Hierarchy over nothing: one sentinel node that misses every ray.
    pub fn empty() -> Bvh {
        Bvh {
            nodes: vec![BvhNode::new()],
            prim_indices: Vec::new(),
            parents: vec![0],
        }
    }

    pub fn construct<T: Bounds + Sync>(prims: &[T]) -> Self {
        Self::construct_with(&SahBuilder::default(), prims)
    }

    pub fn construct_with<B: BvhBuilder, T: Bounds + Sync>(builder: &B, prims: &[T]) -> Self {
        let instant = std::time::Instant::now();
        let result = builder.build(prims);
        log::debug!(
            "built bvh over {} primitives: {} nodes in {} ms",
            prims.len(),
            result.nodes.len(),
            instant.elapsed().as_millis()
        );

        Self::from(result)
    }

    pub fn prim_count(&self) -> usize {
        self.prim_indices.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn parents(&self) -> &[u32] {
        &self.parents
    }

    /// Refreshes node bounds bottom-up after primitives move, without
    /// re-partitioning. Children always live at higher node indices than
    /// their parent, so a reverse scan sees children first.
    pub fn refit<T: Bounds>(&mut self, prims: &[T]) {
        if self.prim_indices.is_empty() {
            return;
        }

        for i in (0..self.nodes.len()).rev() {
            let node = self.nodes[i];

            let aabb = if node.is_leaf() {
                let mut aabb = Aabb::new();
                for j in 0..node.count {
                    let prim_id = self.prim_indices[(node.left_first + j) as usize];
                    aabb.grow_bb(&prims[prim_id as usize].bounds());
                }
                aabb
            } else if node.has_children() {
                self.nodes[node.left_child() as usize]
                    .bounds
                    .union_of(&self.nodes[node.right_child() as usize].bounds)
            } else {
                Aabb::new()
            };

            self.nodes[i].bounds = aabb;
        }
    }

    /// Hit/miss links for stackless traversal, computed from the parent
    /// indices recorded during construction.
    pub fn build_links(&self) -> Vec<NodeLinks> {
        links::build_links(&self.nodes, &self.parents)
    }

    #[inline(always)]
    pub fn traverse<I, R>(
        &self,
        origin: &[f32; 3],
        direction: &[f32; 3],
        t_min: f32,
        t_max: f32,
        intersection_test: I,
    ) -> Option<R>
    where
        I: FnMut(usize, f32, f32) -> Option<(f32, R)>,
        R: Copy,
    {
        BvhNode::traverse(
            self.nodes.as_slice(),
            self.prim_indices.as_slice(),
            Vec3::from(*origin),
            Vec3::from(*direction),
            t_min,
            t_max,
            intersection_test,
        )
    }

    #[inline(always)]
    pub fn traverse_t<I>(
        &self,
        origin: &[f32; 3],
        direction: &[f32; 3],
        t_min: f32,
        t_max: f32,
        intersection_test: I,
    ) -> Option<f32>
    where
        I: FnMut(usize, f32, f32) -> Option<f32>,
    {
        BvhNode::traverse_t(
            self.nodes.as_slice(),
            self.prim_indices.as_slice(),
            Vec3::from(*origin),
            Vec3::from(*direction),
            t_min,
            t_max,
            intersection_test,
        )
    }

    #[inline(always)]
    pub fn occludes<I>(
        &self,
        origin: &[f32; 3],
        direction: &[f32; 3],
        t_min: f32,
        t_max: f32,
        intersection_test: I,
    ) -> bool
    where
        I: FnMut(usize, f32, f32) -> bool,
    {
        BvhNode::occludes(
            self.nodes.as_slice(),
            self.prim_indices.as_slice(),
            Vec3::from(*origin),
            Vec3::from(*direction),
            t_min,
            t_max,
            intersection_test,
        )
    }

    /// Stackless counterpart of [`traverse`](Self::traverse) over links
    /// from [`build_links`](Self::build_links).
    #[inline(always)]
    pub fn traverse_linked<I, R>(
        &self,
        links: &[NodeLinks],
        origin: &[f32; 3],
        direction: &[f32; 3],
        t_min: f32,
        t_max: f32,
        intersection_test: I,
    ) -> Option<R>
    where
        I: FnMut(usize, f32, f32) -> Option<(f32, R)>,
        R: Copy,
    {
        links::traverse_links(
            self.nodes.as_slice(),
            links,
            self.prim_indices.as_slice(),
            Vec3::from(*origin),
            Vec3::from(*direction),
            t_min,
            t_max,
            intersection_test,
        )
    }
}

impl From<BvhResult> for Bvh {
    fn from(result: BvhResult) -> Self {
        Bvh {
            nodes: result.nodes,
            prim_indices: result.prim_indices,
            parents: result.parents,
        }
    }
}

impl Bounds for Bvh {
    fn bounds(&self) -> Aabb {
        self.nodes[0].bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::Sphere;
    use glam::Vec3;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_spheres(n: usize, seed: u64) -> Vec<Sphere> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let center = Vec3::new(
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                );
                Sphere::new(center, rng.gen_range(0.1..2.0))
            })
            .collect()
    }

    // Primitive ids referenced by the leaves below `node_id`.
    fn subtree_prims(bvh: &Bvh, node_id: usize) -> Vec<u32> {
        let node = bvh.nodes[node_id];
        if node.is_leaf() {
            (0..node.count)
                .map(|i| bvh.prim_indices[(node.left_first + i) as usize])
                .collect()
        } else if node.has_children() {
            let mut prims = subtree_prims(bvh, node.left_child() as usize);
            prims.extend(subtree_prims(bvh, node.right_child() as usize));
            prims
        } else {
            Vec::new()
        }
    }

    #[test]
    fn index_array_stays_a_permutation() {
        for seed in 0..4 {
            let spheres = random_spheres(200, seed);
            let bvh = Bvh::construct(&spheres);

            let mut sorted = bvh.prim_indices.clone();
            sorted.sort_unstable();
            let expected: Vec<u32> = (0..spheres.len() as u32).collect();
            assert_eq!(sorted, expected);
        }
    }

    #[test]
    fn every_node_contains_its_subtree() {
        let spheres = random_spheres(300, 7);
        let bvh = Bvh::construct(&spheres);

        for node_id in 0..bvh.node_count() {
            let bounds = bvh.nodes[node_id].bounds;
            for prim_id in subtree_prims(&bvh, node_id) {
                assert!(
                    bounds.contains_bb(&spheres[prim_id as usize].bounds()),
                    "node {} does not contain primitive {}",
                    node_id,
                    prim_id
                );
            }
        }
    }

    #[test]
    fn leaf_ranges_cover_all_primitives_without_overlap() {
        let spheres = random_spheres(250, 11);
        let bvh = Bvh::construct(&spheres);

        let mut ranges: Vec<(u32, u32)> = bvh
            .nodes
            .iter()
            .filter(|node| node.is_leaf())
            .map(|node| (node.left_first, node.left_first + node.count))
            .collect();
        ranges.sort_unstable();

        let mut expected_start = 0;
        for (start, end) in ranges {
            assert_eq!(start, expected_start, "gap or overlap at offset {}", start);
            expected_start = end;
        }
        assert_eq!(expected_start as usize, spheres.len());
    }

    #[test]
    fn construction_is_deterministic() {
        let spheres = random_spheres(150, 3);

        let first = Bvh::construct(&spheres);
        let second = Bvh::construct(&spheres);

        assert_eq!(first.nodes, second.nodes);
        assert_eq!(first.prim_indices, second.prim_indices);
        assert_eq!(first.parents, second.parents);
    }

    #[test]
    fn stack_and_linked_traversal_agree() {
        let spheres = random_spheres(200, 19);
        let bvh = Bvh::construct(&spheres);
        let links = bvh.build_links();

        let mut rng = SmallRng::seed_from_u64(99);
        for _ in 0..50 {
            let origin = Vec3::new(
                rng.gen_range(-80.0..80.0),
                rng.gen_range(-80.0..80.0),
                -120.0,
            );
            let target = Vec3::new(
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
            );
            let dir = (target - origin).normalize();
            let origin: [f32; 3] = origin.into();
            let direction: [f32; 3] = dir.into();

            // Same visited leaf set when the callback never shortens the ray.
            let mut stack_visited = Vec::new();
            let _: Option<usize> =
                bvh.traverse(&origin, &direction, 1e-4, 1e34, |prim_id, _, _| {
                    stack_visited.push(prim_id);
                    None
                });
            let mut linked_visited = Vec::new();
            let _: Option<usize> =
                bvh.traverse_linked(&links, &origin, &direction, 1e-4, 1e34, |prim_id, _, _| {
                    linked_visited.push(prim_id);
                    None
                });
            stack_visited.sort_unstable();
            linked_visited.sort_unstable();
            assert_eq!(stack_visited, linked_visited);

            // Same nearest hit with a real intersection test.
            let hit_test = |prim_id: usize, t_min: f32, t: f32| {
                spheres[prim_id]
                    .intersect(Vec3::from(origin), dir, t_min, t)
                    .map(|new_t| (new_t, (prim_id, new_t)))
            };
            let stack_hit = bvh.traverse(&origin, &direction, 1e-4, 1e34, hit_test);
            let linked_hit = bvh.traverse_linked(&links, &origin, &direction, 1e-4, 1e34, hit_test);

            match (stack_hit, linked_hit) {
                (None, None) => {}
                (Some((stack_prim, stack_t)), Some((linked_prim, linked_t))) => {
                    assert_eq!(stack_prim, linked_prim);
                    assert!((stack_t - linked_t).abs() < 1e-5);
                }
                (stack_hit, linked_hit) => {
                    panic!("traversals disagree: {:?} vs {:?}", stack_hit, linked_hit)
                }
            }

            // And the brute force answer matches both.
            let mut naive: Option<(usize, f32)> = None;
            for (prim_id, sphere) in spheres.iter().enumerate() {
                let t_max = naive.map_or(1e34, |(_, t)| t);
                if let Some(t) = sphere.intersect(Vec3::from(origin), dir, 1e-4, t_max) {
                    naive = Some((prim_id, t));
                }
            }
            match (stack_hit, naive) {
                (None, None) => {}
                (Some((stack_prim, stack_t)), Some((naive_prim, naive_t))) => {
                    assert_eq!(stack_prim, naive_prim);
                    assert!((stack_t - naive_t).abs() < 1e-5);
                }
                (stack_hit, naive) => {
                    panic!("bvh vs naive disagree: {:?} vs {:?}", stack_hit, naive)
                }
            }
        }
    }

    #[test]
    fn tree_depth_fits_the_traversal_stack() {
        let spheres = random_spheres(1000, 41);
        let bvh = Bvh::construct(&spheres);

        let parents = bvh.parents();
        for node_id in 1..bvh.node_count() {
            let mut depth = 1;
            let mut id = node_id;
            while id != 0 {
                id = parents[id] as usize;
                depth += 1;
            }
            assert!(depth < 64, "node {} nested {} levels deep", node_id, depth);
        }
    }

    #[test]
    fn traverse_t_reports_nearest_distance() {
        let spheres = vec![
            Sphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0),
            Sphere::new(Vec3::new(0.0, 0.0, 20.0), 1.0),
        ];
        let bvh = Bvh::construct(&spheres);

        let t = bvh
            .traverse_t(&[0.0, 0.0, 0.0], &[0.0, 0.001, 1.0], 1e-4, 1e34, |prim_id, t_min, t| {
                spheres[prim_id].intersect(Vec3::ZERO, Vec3::new(0.0, 0.001, 1.0), t_min, t)
            })
            .expect("ray should hit the near sphere");
        assert!((t - 9.0).abs() < 1e-2);
    }

    #[test]
    fn occludes_early_out() {
        let mut spheres = random_spheres(64, 23);
        // One occluder guaranteed to sit on the ray path.
        spheres.push(Sphere::new(Vec3::ZERO, 5.0));
        let bvh = Bvh::construct(&spheres);

        let origin = [0.0, 0.0, -200.0];
        let toward = [0.001, 0.001, 1.0];
        let away = [0.001, 0.001, -1.0];

        let hit_test = |prim_id: usize, t_min: f32, t_max: f32| {
            spheres[prim_id]
                .intersect(Vec3::from(origin), Vec3::from(toward), t_min, t_max)
                .is_some()
        };
        assert!(bvh.occludes(&origin, &toward, 1e-4, 1e34, hit_test));

        let miss_test = |prim_id: usize, t_min: f32, t_max: f32| {
            spheres[prim_id]
                .intersect(Vec3::from(origin), Vec3::from(away), t_min, t_max)
                .is_some()
        };
        assert!(!bvh.occludes(&origin, &away, 1e-4, 1e34, miss_test));
    }

    #[test]
    fn refit_restores_containment_after_motion() {
        let spheres = random_spheres(120, 31);
        let mut bvh = Bvh::construct(&spheres);

        let moved: Vec<Sphere> = spheres
            .iter()
            .map(|sphere| {
                let center = Vec3::from(sphere.center) + Vec3::new(5.0, -3.0, 12.0);
                Sphere::new(center, sphere.radius)
            })
            .collect();
        bvh.refit(&moved);

        for node_id in 0..bvh.node_count() {
            let bounds = bvh.nodes[node_id].bounds;
            for prim_id in subtree_prims(&bvh, node_id) {
                assert!(bounds.contains_bb(&moved[prim_id as usize].bounds()));
            }
        }
    }

    #[test]
    fn mixed_primitive_scene_traverses_both_kinds() {
        use crate::primitive::{Primitive, Triangle};

        let prims = vec![
            Primitive::from(Sphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0)),
            Primitive::from(Triangle::new(
                Vec3::new(-4.0, -4.0, 20.0),
                Vec3::new(4.0, -4.0, 20.0),
                Vec3::new(0.0, 6.0, 20.0),
            )),
            Primitive::from(Sphere::new(Vec3::new(30.0, 0.0, 10.0), 1.0)),
        ];
        let bvh = Bvh::construct(&prims);

        let origin = Vec3::new(0.0, 0.0, 0.0);
        // Aim past the sphere so the triangle behind it is the nearest hit.
        let dir = Vec3::new(0.0, 3.0, 20.0).normalize();
        let hit = bvh.traverse(
            &origin.into(),
            &dir.into(),
            1e-4,
            1e34,
            |prim_id, t_min, t| {
                prims[prim_id]
                    .intersect(origin, dir, t_min, t)
                    .map(|t| (t, prim_id))
            },
        );
        assert_eq!(hit, Some(1));

        // Straight ahead the sphere is hit first.
        let dir = Vec3::new(0.0, 0.001, 1.0).normalize();
        let hit = bvh.traverse(
            &origin.into(),
            &dir.into(),
            1e-4,
            1e34,
            |prim_id, t_min, t| {
                prims[prim_id]
                    .intersect(origin, dir, t_min, t)
                    .map(|t| (t, prim_id))
            },
        );
        assert_eq!(hit, Some(0));
    }

    #[test]
    fn empty_bvh_misses_everything() {
        let bvh = Bvh::empty();
        assert_eq!(bvh.node_count(), 1);
        assert_eq!(bvh.prim_count(), 0);

        let hit: Option<usize> = bvh.traverse(
            &[0.0, 0.0, -5.0],
            &[0.1, 0.2, 1.0],
            1e-4,
            1e34,
            |_, _, _| panic!("no primitive should ever be tested"),
        );
        assert!(hit.is_none());

        let constructed = Bvh::construct::<Sphere>(&[]);
        assert_eq!(constructed.nodes, bvh.nodes);
    }
}
