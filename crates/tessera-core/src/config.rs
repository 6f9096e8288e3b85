//! Build configuration

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};

/// Maximum triangles per cluster
pub const CLUSTER_SIZE: usize = 128;
/// Smallest number of clusters the partitioner aims for per group
pub const MIN_GROUP_SIZE: usize = 8;
/// Largest level that is grouped as a whole without partitioning
pub const MAX_GROUP_SIZE: usize = 32;
/// Default BVH fan-out
pub const BVH_FANOUT: usize = 4;
/// Simplification retries before a group is abandoned
pub const MAX_ITERATIONS: u32 = 10;

/// Simplifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifyConfig {
    /// First error bound, relative to the mesh diagonal
    pub initial_error: f32,
    /// Multiplier applied to the bound after each unconverged attempt
    pub error_growth: f32,
    /// Cap on the bound, relative to the mesh diagonal
    pub max_error: f32,
    /// Attempts before giving up
    pub max_iterations: u32,
    /// Accepted overshoot of the triangle budget (1.1 = 10%)
    pub convergence_slack: f32,
    /// Penalty weight for collapsing across differing normals
    pub normal_weight: f32,
    /// Penalty weight for collapsing across differing UVs
    pub uv_weight: f32,
}

impl Default for SimplifyConfig {
    fn default() -> Self {
        Self {
            initial_error: 0.1,
            error_growth: 1.5,
            max_error: 3.0,
            max_iterations: MAX_ITERATIONS,
            convergence_slack: 1.1,
            normal_weight: 1.0,
            uv_weight: 1.0,
        }
    }
}

/// Build configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Maximum triangles per cluster
    pub cluster_size: usize,
    /// Target cluster count per group when a level is partitioned
    pub min_group_size: usize,
    /// Levels up to this many clusters form a single group
    pub max_group_size: usize,
    /// BVH node fan-out (power of two)
    pub bvh_fanout: usize,
    /// Keep vertices on a group's outer border fixed during simplification
    pub lock_group_borders: bool,
    /// Process submeshes and groups on the rayon pool
    pub parallel: bool,
    /// Simplifier settings
    pub simplify: SimplifyConfig,
}

impl BuildConfig {
    /// Settings for quick previews: looser error bounds, fewer retries
    pub fn preview() -> Self {
        Self {
            lock_group_borders: false,
            simplify: SimplifyConfig {
                initial_error: 0.5,
                error_growth: 2.0,
                max_iterations: 4,
                ..SimplifyConfig::default()
            },
            ..Self::default()
        }
    }

    /// Check that the settings describe a buildable configuration
    pub fn validate(&self) -> BuildResult<()> {
        if self.cluster_size == 0 {
            return Err(BuildError::InvalidConfig("cluster_size must be at least 1".into()));
        }
        if self.min_group_size < 2 {
            return Err(BuildError::InvalidConfig("min_group_size must be at least 2".into()));
        }
        if self.max_group_size < self.min_group_size {
            return Err(BuildError::InvalidConfig(format!(
                "max_group_size ({}) is smaller than min_group_size ({})",
                self.max_group_size, self.min_group_size
            )));
        }
        if self.bvh_fanout < 2 || !self.bvh_fanout.is_power_of_two() {
            return Err(BuildError::InvalidConfig(format!(
                "bvh_fanout must be a power of two >= 2, got {}",
                self.bvh_fanout
            )));
        }

        let simplify = &self.simplify;
        if simplify.max_iterations == 0 {
            return Err(BuildError::InvalidConfig("max_iterations must be at least 1".into()));
        }
        if !(simplify.initial_error > 0.0) || simplify.max_error < simplify.initial_error {
            return Err(BuildError::InvalidConfig(
                "error bounds must satisfy 0 < initial_error <= max_error".into(),
            ));
        }
        if !(simplify.error_growth > 1.0) {
            return Err(BuildError::InvalidConfig("error_growth must be greater than 1".into()));
        }
        if !(simplify.convergence_slack >= 1.0) {
            return Err(BuildError::InvalidConfig("convergence_slack must be at least 1".into()));
        }
        if simplify.normal_weight < 0.0 || simplify.uv_weight < 0.0 {
            return Err(BuildError::InvalidConfig("attribute weights must not be negative".into()));
        }
        Ok(())
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cluster_size: CLUSTER_SIZE,
            min_group_size: MIN_GROUP_SIZE,
            max_group_size: MAX_GROUP_SIZE,
            bvh_fanout: BVH_FANOUT,
            lock_group_borders: true,
            parallel: true,
            simplify: SimplifyConfig::default(),
        }
    }
}
