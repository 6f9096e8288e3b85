//! N-ary BVH over cluster groups
//!
//! Every group becomes one leaf; node `i` is the leaf of group `i`. Leaves of
//! each LOD level are organized into their own subtree, and the per-level
//! subtrees are joined under a single root.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tessera_core::math::{Aabb, BoundingSphere};

use crate::cluster::Cluster;
use crate::dag::ClusterGroup;

/// Leaf or interior payload of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BvhNodeKind {
    Leaf { group: u32 },
    Interior { children: Vec<u32> },
}

/// BVH node with aggregated bounds and LOD information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BvhNode {
    pub kind: BvhNodeKind,
    /// Union of the subtree's group bounds
    pub bounds: Aabb,
    pub sphere: BoundingSphere,
    /// Smallest group error in the subtree
    pub min_error: f32,
    /// Largest group error in the subtree
    pub max_error: f32,
    /// Highest LOD level in the subtree
    pub lod_level: u32,
}

impl BvhNode {
    fn leaf(index: u32, group: &ClusterGroup) -> Self {
        Self {
            kind: BvhNodeKind::Leaf { group: index },
            bounds: group.bounds,
            sphere: group.sphere,
            min_error: group.error,
            max_error: group.error,
            lod_level: group.lod_level,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, BvhNodeKind::Leaf { .. })
    }

    /// Child node indices, empty for leaves
    pub fn children(&self) -> &[u32] {
        match &self.kind {
            BvhNodeKind::Leaf { .. } => &[],
            BvhNodeKind::Interior { children } => children,
        }
    }
}

/// Finished hierarchy together with the DAG it indexes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NaniteBvh {
    pub nodes: Vec<BvhNode>,
    /// Root node, `None` when there are no groups
    pub root: Option<u32>,
    pub groups: Vec<ClusterGroup>,
    pub clusters: Vec<Cluster>,
}

impl NaniteBvh {
    /// Number of nodes on the longest root-to-leaf path, 0 when empty
    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[BvhNode], node: u32) -> usize {
            1 + nodes[node as usize]
                .children()
                .iter()
                .map(|&child| depth_of(nodes, child))
                .max()
                .unwrap_or(0)
        }
        self.root.map_or(0, |root| depth_of(&self.nodes, root))
    }

    /// Groups reachable from the root, in depth-first order
    pub fn reachable_groups(&self) -> Vec<u32> {
        let mut groups = Vec::new();
        let mut stack: Vec<u32> = self.root.into_iter().collect();
        while let Some(node) = stack.pop() {
            match &self.nodes[node as usize].kind {
                BvhNodeKind::Leaf { group } => groups.push(*group),
                BvhNodeKind::Interior { children } => stack.extend(children.iter().rev()),
            }
        }
        groups
    }
}

/// Top-down BVH builder with a fixed power-of-two fan-out
#[derive(Debug, Clone)]
pub struct BvhBuilder {
    fanout: usize,
}

impl Default for BvhBuilder {
    fn default() -> Self {
        Self { fanout: tessera_core::config::BVH_FANOUT }
    }
}

impl BvhBuilder {
    /// `fanout` is rounded up to a power of two, at least 2
    pub fn new(fanout: usize) -> Self {
        Self {
            fanout: fanout.max(2).next_power_of_two(),
        }
    }

    /// Build the hierarchy over `groups`, taking ownership of the DAG arenas
    pub fn build(&self, groups: Vec<ClusterGroup>, clusters: Vec<Cluster>) -> NaniteBvh {
        let mut nodes: Vec<BvhNode> = groups
            .iter()
            .enumerate()
            .map(|(i, group)| BvhNode::leaf(i as u32, group))
            .collect();

        let mut by_level: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for (i, group) in groups.iter().enumerate() {
            by_level.entry(group.lod_level).or_default().push(i as u32);
        }

        let mut level_roots: Vec<u32> = by_level
            .into_values()
            .map(|mut leaves| self.build_top_down(&mut nodes, &mut leaves, true))
            .collect();

        let root = if level_roots.is_empty() {
            None
        } else {
            Some(self.build_top_down(&mut nodes, &mut level_roots, false))
        };

        log::debug!("BVH: {} nodes over {} groups", nodes.len(), groups.len());
        NaniteBvh {
            nodes,
            root,
            groups,
            clusters,
        }
    }

    /// Child subset sizes for `len` elements.
    ///
    /// Children hold between `top / F` and `top` elements, where `top` is the
    /// largest power of the fan-out not exceeding `len / F`; the excess over
    /// the minimum is handed out from the last child backwards.
    fn child_sizes(&self, len: usize) -> Vec<usize> {
        let fanout = self.fanout;
        let mut top = fanout;
        while top * fanout <= len {
            top *= fanout;
        }

        let small = top / fanout;
        let max_excess = top - small;
        let mut excess = len - top;
        let mut sizes = vec![small; fanout];
        for size in sizes.iter_mut().rev() {
            let extra = excess.min(max_excess);
            *size += extra;
            excess -= extra;
        }
        sizes
    }

    fn build_top_down(&self, nodes: &mut Vec<BvhNode>, elements: &mut [u32], sort: bool) -> u32 {
        if elements.len() == 1 {
            return elements[0];
        }

        let index = nodes.len() as u32;
        if elements.len() <= self.fanout {
            let node = interior(nodes, elements.to_vec());
            nodes.push(node);
            return index;
        }

        // reserve the slot so the parent precedes its children
        let placeholder = interior(nodes, Vec::new());
        nodes.push(placeholder);

        let sizes = self.child_sizes(elements.len());
        if sort {
            self.sort_elements(nodes, elements, &sizes);
        }

        let mut children = Vec::with_capacity(self.fanout);
        let mut offset = 0;
        for size in sizes {
            children.push(self.build_top_down(nodes, &mut elements[offset..offset + size], sort));
            offset += size;
        }

        let node = interior(nodes, children);
        nodes[index as usize] = node;
        index
    }

    /// Order elements so each child's slice is spatially coherent.
    ///
    /// Runs `log2(F)` rounds of bisection; every bucket tries all three axes
    /// and keeps the one whose two halves have the smallest summed extents.
    fn sort_elements(&self, nodes: &[BvhNode], elements: &mut [u32], sizes: &[usize]) {
        let rounds = self.fanout.trailing_zeros();
        for round in 0..rounds {
            let buckets = 1usize << round;
            let per_bucket = self.fanout >> round;
            let half = per_bucket / 2;

            let mut start = 0;
            for bucket in 0..buckets {
                let first = bucket * per_bucket;
                let left: usize = sizes[first..first + half].iter().sum();
                let right: usize = sizes[first + half..first + per_bucket].iter().sum();
                let slice = &mut elements[start..start + left + right];
                start += left + right;

                let sort_by_axis = |slice: &mut [u32], axis: usize| {
                    slice.sort_by(|&a, &b| {
                        let ca = nodes[a as usize].bounds.center()[axis];
                        let cb = nodes[b as usize].bounds.center()[axis];
                        ca.total_cmp(&cb)
                    });
                };

                let mut best = (f32::INFINITY, 0);
                for axis in 0..3 {
                    sort_by_axis(slice, axis);
                    let cost = extent_cost(nodes, &slice[..left]) + extent_cost(nodes, &slice[left..]);
                    if cost < best.0 {
                        best = (cost, axis);
                    }
                }
                if best.1 != 2 {
                    sort_by_axis(slice, best.1);
                }
            }
        }
    }
}

fn extent_cost(nodes: &[BvhNode], elements: &[u32]) -> f32 {
    elements
        .iter()
        .fold(Aabb::EMPTY, |bounds, &e| bounds.merge(&nodes[e as usize].bounds))
        .extent_sum()
}

/// Interior node aggregating `children`
fn interior(nodes: &[BvhNode], children: Vec<u32>) -> BvhNode {
    let mut bounds = Aabb::EMPTY;
    let mut sphere: Option<BoundingSphere> = None;
    let mut min_error = f32::INFINITY;
    let mut max_error = f32::NEG_INFINITY;
    let mut lod_level = 0;

    for &child in &children {
        let node = &nodes[child as usize];
        bounds = bounds.merge(&node.bounds);
        sphere = Some(sphere.map_or(node.sphere, |s| s.merge(&node.sphere)));
        min_error = min_error.min(node.min_error);
        max_error = max_error.max(node.max_error);
        lod_level = lod_level.max(node.lod_level);
    }
    if children.is_empty() {
        min_error = 0.0;
        max_error = 0.0;
    }

    BvhNode {
        kind: BvhNodeKind::Interior { children },
        bounds,
        sphere: sphere.unwrap_or_default(),
        min_error,
        max_error,
        lod_level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::math::Vec3;

    fn group(x: f32, lod_level: u32, error: f32) -> ClusterGroup {
        let bounds = Aabb::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0));
        ClusterGroup {
            children: Vec::new(),
            bounds,
            sphere: BoundingSphere::from_aabb(&bounds),
            error,
            lod_level,
            coarsened: false,
            parents: 0..0,
        }
    }

    fn check_node(bvh: &NaniteBvh, node: u32, fanout: usize) {
        let n = &bvh.nodes[node as usize];
        if let BvhNodeKind::Interior { children } = &n.kind {
            assert!((2..=fanout).contains(&children.len()), "node {} has {} children", node, children.len());
            for &child in children {
                let c = &bvh.nodes[child as usize];
                assert!(n.bounds.contains_aabb(&c.bounds));
                assert!(n.sphere.contains_sphere(&c.sphere));
                assert!(n.min_error <= c.min_error && n.max_error >= c.max_error);
                assert!(n.lod_level >= c.lod_level);
                check_node(bvh, child, fanout);
            }
        }
    }

    #[test]
    fn test_child_sizes() {
        let builder = BvhBuilder::new(4);
        assert_eq!(builder.child_sizes(5), vec![1, 1, 1, 2]);
        assert_eq!(builder.child_sizes(16), vec![4, 4, 4, 4]);
        assert_eq!(builder.child_sizes(17), vec![4, 4, 4, 5]);
        assert_eq!(builder.child_sizes(40), vec![4, 4, 16, 16]);
        assert_eq!(builder.child_sizes(64), vec![16, 16, 16, 16]);
    }

    #[test]
    fn test_empty_and_single() {
        let builder = BvhBuilder::default();
        let empty = builder.build(Vec::new(), Vec::new());
        assert_eq!(empty.root, None);
        assert_eq!(empty.depth(), 0);

        let single = builder.build(vec![group(0.0, 0, 0.0)], Vec::new());
        assert_eq!(single.root, Some(0));
        assert!(single.nodes[0].is_leaf());
        assert_eq!(single.depth(), 1);
    }

    #[test]
    fn test_every_group_reachable_once() {
        let groups: Vec<ClusterGroup> = (0..37)
            .map(|i| group(i as f32 * 1.5, (i % 3) as u32, i as f32 * 0.1))
            .collect();
        let bvh = BvhBuilder::new(4).build(groups, Vec::new());

        let mut reached = bvh.reachable_groups();
        reached.sort_unstable();
        assert_eq!(reached, (0..37).collect::<Vec<u32>>());

        let root = bvh.root.unwrap();
        check_node(&bvh, root, 4);
        assert_eq!(bvh.nodes[root as usize].lod_level, 2);
        assert_eq!(bvh.nodes[root as usize].min_error, 0.0);
    }

    #[test]
    fn test_levels_are_separate_subtrees() {
        let groups: Vec<ClusterGroup> = (0..8).map(|i| group(i as f32, (i / 4) as u32, 0.0)).collect();
        let bvh = BvhBuilder::new(2).build(groups, Vec::new());
        let root = &bvh.nodes[bvh.root.unwrap() as usize];

        assert_eq!(root.children().len(), 2);
        for (level, &child) in root.children().iter().enumerate() {
            let mut stack = vec![child];
            while let Some(node) = stack.pop() {
                let n = &bvh.nodes[node as usize];
                match &n.kind {
                    BvhNodeKind::Leaf { group } => assert_eq!(bvh.groups[*group as usize].lod_level, level as u32),
                    BvhNodeKind::Interior { children } => stack.extend(children),
                }
            }
        }
    }

    #[test]
    fn test_sorting_keeps_neighbors_together() {
        // 16 boxes along x: each child of the root covers 4 consecutive boxes
        let groups: Vec<ClusterGroup> = (0..16).rev().map(|i| group(i as f32 * 2.0, 0, 0.0)).collect();
        let bvh = BvhBuilder::new(4).build(groups, Vec::new());
        let root = &bvh.nodes[bvh.root.unwrap() as usize];
        for &child in root.children() {
            let extent = bvh.nodes[child as usize].bounds.size().x;
            assert!((extent - 7.0).abs() < 1e-5, "child spans {}", extent);
        }
    }
}
