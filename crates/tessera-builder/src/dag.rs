//! LOD DAG construction
//!
//! Levels are built one after another. The clusters of a level are grouped,
//! each group's geometry is merged, simplified to half its triangles and cut
//! into new clusters one level up. Clusters and groups live in append-only
//! arenas and refer to each other by index only.

use std::ops::Range;

use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use tessera_core::hash::position_key;
use tessera_core::math::{Aabb, BoundingSphere};
use tessera_core::partition::Partitioner;
use tessera_core::{BuildConfig, BuildResult, Diagnostic, Diagnostics, MeshInputData};

use crate::cluster::{Cluster, Clusterer, cluster_graph, link_clusters};
use crate::simplify::{SimplifyError, Simplifier};

/// Set of clusters of one level that were simplified together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterGroup {
    /// Member cluster guids
    pub children: Vec<u32>,
    /// Union of the members' bounds
    pub bounds: Aabb,
    pub sphere: BoundingSphere,
    /// Error of the group's simplification, never below a member's error
    pub error: f32,
    /// LOD level of the member clusters
    pub lod_level: u32,
    /// Whether the members were simplified into a parent level
    pub coarsened: bool,
    /// Guids of the clusters produced from this group
    pub parents: Range<u32>,
}

impl ClusterGroup {
    fn new(arena: &[Cluster], children: Vec<u32>, error: f32, coarsened: bool, parents: Range<u32>) -> Self {
        let mut bounds = Aabb::EMPTY;
        let mut sphere: Option<BoundingSphere> = None;
        let mut lod_level = 0;
        for &child in &children {
            let cluster = &arena[child as usize];
            bounds = bounds.merge(&cluster.bounds);
            sphere = Some(sphere.map_or(cluster.sphere, |s| s.merge(&cluster.sphere)));
            lod_level = lod_level.max(cluster.lod_level);
        }
        Self {
            children,
            bounds,
            sphere: sphere.unwrap_or_default(),
            error,
            lod_level,
            coarsened,
            parents,
        }
    }
}

/// Cluster and group arenas of a finished build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LodDag {
    pub clusters: Vec<Cluster>,
    pub groups: Vec<ClusterGroup>,
    /// Cluster guid range of each level, level 0 first
    pub levels: Vec<Range<u32>>,
}

impl LodDag {
    /// Clusters of one level
    pub fn level(&self, level: usize) -> &[Cluster] {
        match self.levels.get(level) {
            Some(range) => &self.clusters[range.start as usize..range.end as usize],
            None => &[],
        }
    }

    /// Group that owns each cluster
    pub fn cluster_owners(&self) -> Vec<Option<u32>> {
        let mut owners = vec![None; self.clusters.len()];
        for (group, g) in self.groups.iter().enumerate() {
            for &child in &g.children {
                owners[child as usize] = Some(group as u32);
            }
        }
        owners
    }
}

/// Merge clusters into one mesh, welding vertices with bit-identical positions.
///
/// The first occurrence of a position keeps its normal and UV. The merged mesh
/// has a single submesh with the first member's material.
pub fn merge_clusters(arena: &[Cluster], members: &[u32]) -> MeshInputData {
    let mut merged = MeshInputData::default();
    let mut welded: AHashMap<[u32; 3], u32> = AHashMap::new();

    for &member in members {
        let cluster = &arena[member as usize];
        merged.lod_level = merged.lod_level.max(cluster.lod_level);
        for &local in &cluster.indices {
            let l = local as usize;
            let position = cluster.positions[l];
            let index = *welded.entry(position_key(position)).or_insert_with(|| {
                merged.positions.push(position);
                merged.normals.push(cluster.normals[l]);
                merged.uvs.push(cluster.uvs[l]);
                (merged.positions.len() - 1) as u32
            });
            merged.indices.push(index);
        }
    }

    merged.triangle_counts = vec![merged.triangle_count() as u32];
    merged.material_indices = vec![members.first().map_or(0, |&m| arena[m as usize].material_index)];
    merged
}

/// Vertices of `merged` on edges the group shares with clusters outside it
fn group_border_mask(arena: &[Cluster], members: &[u32], merged: &MeshInputData) -> Vec<bool> {
    let inside: AHashSet<u32> = members.iter().copied().collect();
    let mut border: AHashSet<[u32; 3]> = AHashSet::new();
    for &member in members {
        let cluster = &arena[member as usize];
        for edge in cluster.external_edges.iter().filter(|e| !inside.contains(&e.neighbor)) {
            border.insert(position_key(cluster.positions[edge.v0 as usize]));
            border.insert(position_key(cluster.positions[edge.v1 as usize]));
        }
    }
    merged.positions.iter().map(|&p| border.contains(&position_key(p))).collect()
}

/// Outcome of simplifying and re-clustering one group
struct GroupOutcome {
    members: Vec<u32>,
    error: f32,
    /// New clusters with guids relative to 0, `None` when simplification failed
    parents: Option<Vec<Cluster>>,
    diagnostics: Vec<Diagnostic>,
}

/// Level-synchronous DAG builder
pub struct DagBuilder<'a> {
    config: &'a BuildConfig,
    partitioner: &'a dyn Partitioner,
    simplifier: Simplifier,
}

impl<'a> DagBuilder<'a> {
    pub fn new(config: &'a BuildConfig, partitioner: &'a dyn Partitioner) -> Self {
        Self {
            config,
            partitioner,
            simplifier: Simplifier::new(config.simplify.clone()),
        }
    }

    fn clusterer(&self) -> Clusterer<'a> {
        Clusterer::new(self.config.cluster_size, self.partitioner)
    }

    /// Build every level of the DAG for `mesh`
    pub fn build(&self, mesh: &MeshInputData, diagnostics: &mut Diagnostics) -> BuildResult<LodDag> {
        mesh.validate()?;
        for (submesh, triangle) in mesh.degenerate_triangles() {
            diagnostics.push(Diagnostic::DegenerateGeometry { submesh, triangle });
        }

        let mut dag = LodDag::default();
        self.build_level_zero(mesh, &mut dag, diagnostics);

        let mut level_offset = 0usize;
        loop {
            let level_len = dag.clusters.len() - level_offset;
            if level_len < 2 {
                break;
            }

            let groups = self.group_level(&dag.clusters[level_offset..], level_offset as u32, diagnostics);
            log::info!(
                "LOD level {}: {} clusters in {} groups",
                dag.levels.len() - 1,
                level_len,
                groups.len()
            );

            let outcomes: Vec<GroupOutcome> = if self.config.parallel {
                groups
                    .into_par_iter()
                    .map(|members| self.process_group(&dag.clusters, members))
                    .collect()
            } else {
                groups
                    .into_iter()
                    .map(|members| self.process_group(&dag.clusters, members))
                    .collect()
            };

            let next_offset = dag.clusters.len();
            for outcome in outcomes {
                self.append_group(&mut dag, outcome, diagnostics);
            }
            link_clusters(&mut dag.clusters[next_offset..]);

            level_offset = next_offset;
            if dag.clusters.len() > level_offset {
                dag.levels.push(level_offset as u32..dag.clusters.len() as u32);
            }
        }

        // the top cluster is never grouped by the loop
        if dag.clusters.len() - level_offset == 1 {
            let top = level_offset as u32;
            let error = dag.clusters[level_offset].lod_error;
            let root = ClusterGroup::new(&dag.clusters, vec![top], error, false, top + 1..top + 1);
            dag.groups.push(root);
        }

        Ok(dag)
    }

    fn build_level_zero(&self, mesh: &MeshInputData, dag: &mut LodDag, diagnostics: &mut Diagnostics) {
        let clusterer = self.clusterer();
        let submeshes = 0..mesh.submesh_count();
        let results: Vec<(Vec<Cluster>, Vec<Diagnostic>)> = if self.config.parallel {
            submeshes
                .into_par_iter()
                .map(|submesh| clusterer.cluster_submesh(mesh, submesh, 0))
                .collect()
        } else {
            submeshes
                .map(|submesh| clusterer.cluster_submesh(mesh, submesh, 0))
                .collect()
        };

        for (mut clusters, submesh_diagnostics) in results {
            diagnostics.extend(submesh_diagnostics);
            let offset = dag.clusters.len() as u32;
            for cluster in &mut clusters {
                cluster.rebase(offset);
            }
            dag.clusters.append(&mut clusters);
        }
        link_clusters(&mut dag.clusters);

        dag.levels.push(0..dag.clusters.len() as u32);
        log::debug!(
            "Level 0: {} triangles in {} clusters",
            mesh.triangle_count(),
            dag.clusters.len()
        );
    }

    /// Split a level into groups of member guids
    fn group_level(&self, level: &[Cluster], first_guid: u32, diagnostics: &mut Diagnostics) -> Vec<Vec<u32>> {
        if level.len() <= self.config.max_group_size {
            return vec![(first_guid..first_guid + level.len() as u32).collect()];
        }

        let graph = cluster_graph(level, first_guid);
        let partition = self
            .partitioner
            .partition(&graph, level.len().div_ceil(self.config.min_group_size));
        diagnostics.extend(partition.diagnostics.iter().cloned());

        partition
            .parts()
            .into_iter()
            .map(|part| part.into_iter().map(|slot| slot + first_guid).collect())
            .collect()
    }

    /// Merge, simplify and re-cluster one group. Runs on the rayon pool.
    fn process_group(&self, arena: &[Cluster], members: Vec<u32>) -> GroupOutcome {
        let child_error = members
            .iter()
            .map(|&m| arena[m as usize].lod_error)
            .fold(0.0f32, f32::max);

        let merged = merge_clusters(arena, &members);
        let locked = self
            .config
            .lock_group_borders
            .then(|| group_border_mask(arena, &members, &merged));
        let target = merged.triangle_count() / 2;

        match self.simplifier.simplify(&merged, target, locked.as_deref()) {
            Ok(simplified) => {
                let error = simplified.error.max(child_error);
                let mut coarse = simplified.mesh;
                coarse.lod_level = merged.lod_level + 1;

                let material = coarse.material_index(0);
                let (mut clusters, diagnostics) =
                    self.clusterer().cluster_triangles(&coarse, 0..coarse.triangle_count(), material, 0);
                for cluster in &mut clusters {
                    cluster.lod_error = error;
                }

                log::debug!(
                    "Group of {} clusters: {} -> {} triangles, error {:.5}",
                    members.len(),
                    merged.triangle_count(),
                    coarse.triangle_count(),
                    error
                );
                GroupOutcome {
                    members,
                    error,
                    parents: Some(clusters),
                    diagnostics,
                }
            }
            Err(err) => {
                let achieved = match err {
                    SimplifyError::DidNotConverge { achieved, .. } => achieved,
                    SimplifyError::EmptyMesh => 0,
                };
                GroupOutcome {
                    members,
                    error: child_error,
                    parents: None,
                    diagnostics: vec![Diagnostic::SimplificationDidNotConverge {
                        group: 0,
                        target: target as u32,
                        achieved,
                    }],
                }
            }
        }
    }

    /// Append a group and its parent clusters in arena order
    fn append_group(&self, dag: &mut LodDag, outcome: GroupOutcome, diagnostics: &mut Diagnostics) {
        let group_index = dag.groups.len() as u32;
        let first = dag.clusters.len() as u32;

        for diagnostic in outcome.diagnostics {
            diagnostics.push(match diagnostic {
                Diagnostic::SimplificationDidNotConverge { target, achieved, .. } => {
                    Diagnostic::SimplificationDidNotConverge {
                        group: group_index,
                        target,
                        achieved,
                    }
                }
                other => other,
            });
        }

        let coarsened = outcome.parents.is_some();
        if let Some(mut parents) = outcome.parents {
            for cluster in &mut parents {
                cluster.rebase(first);
            }
            dag.clusters.append(&mut parents);
        }

        let parents = first..dag.clusters.len() as u32;
        let group = ClusterGroup::new(&dag.clusters, outcome.members, outcome.error, coarsened, parents);
        dag.groups.push(group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::mesh::primitives;
    use tessera_core::math::Vec3;
    use tessera_core::RecursiveBisection;

    fn build(mesh: &MeshInputData, config: &BuildConfig) -> (LodDag, Diagnostics) {
        let partitioner = RecursiveBisection::default();
        let mut diagnostics = Diagnostics::new();
        let dag = DagBuilder::new(config, &partitioner).build(mesh, &mut diagnostics).unwrap();
        (dag, diagnostics)
    }

    #[test]
    fn test_merge_welds_shared_positions() {
        let config = BuildConfig::default();
        let partitioner = RecursiveBisection::default();
        let mesh = primitives::grid(16, 8);
        let (clusters, _) = Clusterer::new(config.cluster_size, &partitioner).cluster_submesh(&mesh, 0, 0);

        let merged = merge_clusters(&clusters, &[0, 1]);
        assert_eq!(merged.triangle_count(), 256);
        assert_eq!(merged.vertex_count(), mesh.vertex_count());
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn test_border_mask_marks_outside_edges() {
        let partitioner = RecursiveBisection::default();
        let mesh = primitives::grid(16, 8);
        let (clusters, _) = Clusterer::new(128, &partitioner).cluster_submesh(&mesh, 0, 0);

        let merged = merge_clusters(&clusters, &[0]);
        let mask = group_border_mask(&clusters, &[0], &merged);
        let seam: Vec<Vec3> = clusters[0]
            .external_edges
            .iter()
            .flat_map(|e| [e.v0, e.v1])
            .map(|v| clusters[0].positions[v as usize])
            .collect();
        for (p, locked) in merged.positions.iter().zip(&mask) {
            assert_eq!(*locked, seam.contains(p));
        }

        // both clusters together have no outside neighbors
        let merged = merge_clusters(&clusters, &[0, 1]);
        assert!(group_border_mask(&clusters, &[0, 1], &merged).iter().all(|l| !l));
    }

    #[test]
    fn test_single_cluster_gets_root_group() {
        let (dag, diagnostics) = build(&primitives::cube(), &BuildConfig::default());
        assert_eq!(dag.clusters.len(), 1);
        assert_eq!(dag.groups.len(), 1);
        assert_eq!(dag.groups[0].children, vec![0]);
        assert!(!dag.groups[0].coarsened);
        assert_eq!(dag.levels, vec![0..1]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_levels_reduce_to_one_cluster() {
        let config = BuildConfig {
            cluster_size: 32,
            ..BuildConfig::default()
        };
        let (dag, _) = build(&primitives::uv_sphere(32, 16), &config);

        assert!(dag.levels.len() > 2);
        assert_eq!(dag.levels.last().map(|r| r.len()), Some(1));
        let owners = dag.cluster_owners();
        assert!(owners.iter().all(Option::is_some));

        for group in &dag.groups {
            let bounds = group
                .children
                .iter()
                .fold(Aabb::EMPTY, |b, &c| b.merge(&dag.clusters[c as usize].bounds));
            assert_eq!(group.bounds, bounds);
            for &child in &group.children {
                assert!(group.error >= dag.clusters[child as usize].lod_error);
            }
            for parent in group.parents.clone() {
                assert_eq!(dag.clusters[parent as usize].lod_level, group.lod_level + 1);
                assert_eq!(dag.clusters[parent as usize].lod_error, group.error);
            }
        }
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let mesh = primitives::uv_sphere(24, 12);
        let parallel = BuildConfig { cluster_size: 24, ..BuildConfig::default() };
        let sequential = BuildConfig { parallel: false, ..parallel.clone() };
        assert_eq!(build(&mesh, &parallel).0, build(&mesh, &sequential).0);
    }
}
