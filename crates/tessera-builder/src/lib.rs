//! # Tessera Builder
//!
//! Offline builder for virtualized geometry.
//!
//! Turns a dense triangle mesh into a hierarchy of bounded clusters:
//! - **Clusters**: balanced min-cut splits of at most 128 triangles
//! - **Simplifier**: quadric edge collapse with error-bound relaxation
//! - **DAG**: grouped, merged and simplified levels up to a single root cluster
//! - **BVH**: N-ary hierarchy over the DAG's cluster groups, one subtree per LOD level
//! - **OBJ export**: debug output for meshes, clusters and whole levels

pub mod bvh;
pub mod cluster;
pub mod dag;
pub mod obj;
pub mod simplify;

use std::fmt;

use serde::{Deserialize, Serialize};

use tessera_core::partition::{Partitioner, RecursiveBisection};
use tessera_core::{BuildConfig, BuildResult, Diagnostics, MeshInputData};

pub use bvh::{BvhBuilder, BvhNode, BvhNodeKind, NaniteBvh};
pub use cluster::{Cluster, Clusterer, ExternalEdge};
pub use dag::{ClusterGroup, DagBuilder, LodDag};
pub use simplify::{SimplifyError, Simplified, Simplifier};

/// Per-level summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelStats {
    pub lod_level: u32,
    pub clusters: usize,
    pub triangles: usize,
    /// Groups formed from this level's clusters
    pub groups: usize,
    /// Groups of this level that failed to simplify
    pub unconverged_groups: usize,
}

/// Summary of a finished build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    pub levels: Vec<LevelStats>,
    pub clusters: usize,
    pub groups: usize,
    pub bvh_nodes: usize,
    pub bvh_depth: usize,
}

impl BuildStats {
    fn collect(dag: &LodDag, diagnostics: &Diagnostics) -> Self {
        let mut levels: Vec<LevelStats> = dag
            .levels
            .iter()
            .enumerate()
            .map(|(level, range)| {
                let clusters = &dag.clusters[range.start as usize..range.end as usize];
                LevelStats {
                    lod_level: level as u32,
                    clusters: clusters.len(),
                    triangles: clusters.iter().map(Cluster::triangle_count).sum(),
                    ..LevelStats::default()
                }
            })
            .collect();

        for group in &dag.groups {
            if let Some(level) = levels.get_mut(group.lod_level as usize) {
                level.groups += 1;
            }
        }
        for group in diagnostics.unconverged_groups() {
            let lod_level = dag.groups[group as usize].lod_level as usize;
            if let Some(level) = levels.get_mut(lod_level) {
                level.unconverged_groups += 1;
            }
        }

        Self {
            levels,
            clusters: dag.clusters.len(),
            groups: dag.groups.len(),
            ..Self::default()
        }
    }
}

impl fmt::Display for BuildStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>5} {:>9} {:>10} {:>7}", "level", "clusters", "triangles", "groups")?;
        for level in &self.levels {
            writeln!(
                f,
                "{:>5} {:>9} {:>10} {:>7}",
                level.lod_level, level.clusters, level.triangles, level.groups
            )?;
        }
        write!(
            f,
            "{} clusters, {} groups, {} BVH nodes (depth {})",
            self.clusters, self.groups, self.bvh_nodes, self.bvh_depth
        )
    }
}

/// Result of a successful build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutput {
    pub bvh: NaniteBvh,
    pub diagnostics: Diagnostics,
    pub stats: BuildStats,
}

/// Build the cluster DAG and BVH for `mesh` with the default partitioner
pub fn build(mesh: &MeshInputData, config: &BuildConfig) -> BuildResult<BuildOutput> {
    build_with_partitioner(mesh, config, &RecursiveBisection::default())
}

/// Build the cluster DAG and BVH for `mesh` with a custom partitioner
pub fn build_with_partitioner(
    mesh: &MeshInputData,
    config: &BuildConfig,
    partitioner: &dyn Partitioner,
) -> BuildResult<BuildOutput> {
    config.validate()?;

    let mut diagnostics = Diagnostics::new();
    let dag = DagBuilder::new(config, partitioner).build(mesh, &mut diagnostics)?;
    let mut stats = BuildStats::collect(&dag, &diagnostics);

    let bvh = BvhBuilder::new(config.bvh_fanout).build(dag.groups, dag.clusters);
    stats.bvh_nodes = bvh.nodes.len();
    stats.bvh_depth = bvh.depth();

    log::info!(
        "Built {} LOD levels: {} clusters, {} groups, {} BVH nodes, {} diagnostics",
        stats.levels.len(),
        stats.clusters,
        stats.groups,
        stats.bvh_nodes,
        diagnostics.len()
    );

    Ok(BuildOutput {
        bvh,
        diagnostics,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::mesh::primitives;
    use tessera_core::BuildError;

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = BuildConfig {
            bvh_fanout: 6,
            ..BuildConfig::default()
        };
        let result = build(&primitives::cube(), &config);
        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let result = build(&MeshInputData::default(), &BuildConfig::default());
        assert!(matches!(result, Err(BuildError::EmptyInput)));
    }

    #[test]
    fn test_stats_match_output() {
        let config = BuildConfig {
            cluster_size: 32,
            ..BuildConfig::default()
        };
        let output = build(&primitives::uv_sphere(16, 8), &config).unwrap();
        let stats = &output.stats;

        assert_eq!(stats.levels[0].triangles, 16 * 14);
        assert_eq!(stats.clusters, output.bvh.clusters.len());
        assert_eq!(stats.groups, output.bvh.groups.len());
        assert_eq!(stats.bvh_nodes, output.bvh.nodes.len());
        assert_eq!(stats.levels.iter().map(|l| l.clusters).sum::<usize>(), stats.clusters);
        assert!(stats.to_string().contains("BVH nodes"));
    }
}
