//! # Tessera Core
//!
//! Geometry foundations for the Tessera virtualized-geometry builder.
//!
//! This crate provides the pieces the builder stacks on top of each other:
//! - **Math**: bounding boxes and spheres over glam vectors
//! - **Mesh**: multi-submesh triangle input with validation and procedural shapes
//! - **Hashing**: exact position welding and directed edge keys
//! - **Adjacency**: shared-edge graphs between edges, triangles and clusters
//! - **Partitioning**: balanced min-cut k-way partitioning behind a trait
//! - **Errors**: fatal build errors and accumulated diagnostics
//! - **Config**: build settings with presets

pub mod adjacency;
pub mod config;
pub mod error;
pub mod hash;
pub mod math;
pub mod mesh;
pub mod partition;

pub use adjacency::{AdjacencyGraph, build_edge_adjacency, triangle_adjacency};
pub use config::{BuildConfig, SimplifyConfig, CLUSTER_SIZE, MAX_GROUP_SIZE, MIN_GROUP_SIZE};
pub use error::{BuildError, BuildResult, Diagnostic, Diagnostics};
pub use hash::PositionHashIndex;
pub use math::{Aabb, BoundingSphere};
pub use mesh::MeshInputData;
pub use partition::{Partition, Partitioner, RecursiveBisection};
