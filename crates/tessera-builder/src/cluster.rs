//! Triangle clusters
//!
//! A cluster is a small, independently renderable patch of at most
//! `cluster_size` triangles with its own vertex buffer. Clusters of one level
//! know which clusters they share edges with, and through which of their own
//! local edges.

use std::ops::Range;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use tessera_core::adjacency::{AdjacencyGraph, triangle_adjacency};
use tessera_core::hash::PositionHashIndex;
use tessera_core::math::{Aabb, BoundingSphere, Vec2, Vec3};
use tessera_core::partition::Partitioner;
use tessera_core::{Diagnostic, MeshInputData};

/// Edge shared with another cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEdge {
    /// First local vertex of the edge
    pub v0: u32,
    /// Second local vertex of the edge
    pub v1: u32,
    /// Guid of the cluster on the other side
    pub neighbor: u32,
}

/// Bounded patch of triangles with a local vertex buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Index of the cluster in the build's cluster arena
    pub guid: u32,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    /// Local triangle list
    pub indices: Vec<u32>,
    pub bounds: Aabb,
    pub sphere: BoundingSphere,
    /// LOD level, 0 for clusters cut from the input mesh
    pub lod_level: u32,
    /// Error of the group simplification that produced this cluster
    pub lod_error: f32,
    pub material_index: u32,
    /// `(neighbor guid, shared edge count)`, sorted by guid
    pub links: Vec<(u32, u32)>,
    /// Edges shared with other clusters
    pub external_edges: Vec<ExternalEdge>,
}

impl Cluster {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Corner positions of a local triangle
    pub fn triangle_positions(&self, triangle: usize) -> [Vec3; 3] {
        let base = triangle * 3;
        [0, 1, 2].map(|k| self.positions[self.indices[base + k] as usize])
    }

    /// Shared edge count with another cluster, 0 if not linked
    pub fn link_weight(&self, neighbor: u32) -> u32 {
        self.links
            .binary_search_by_key(&neighbor, |&(guid, _)| guid)
            .map_or(0, |i| self.links[i].1)
    }

    /// Cluster geometry as a single-submesh mesh
    pub fn to_mesh(&self) -> MeshInputData {
        MeshInputData {
            positions: self.positions.clone(),
            normals: self.normals.clone(),
            uvs: self.uvs.clone(),
            indices: self.indices.clone(),
            triangle_counts: vec![self.triangle_count() as u32],
            material_indices: vec![self.material_index],
            lod_level: self.lod_level,
        }
    }

    /// Shift the guid and every guid reference by `offset`
    pub fn rebase(&mut self, offset: u32) {
        self.guid += offset;
        for link in &mut self.links {
            link.0 += offset;
        }
        for edge in &mut self.external_edges {
            edge.neighbor += offset;
        }
    }

    /// Copy the given triangles of `mesh` into a new cluster.
    ///
    /// Vertices are deduplicated by source index, in order of first use.
    fn from_triangles(mesh: &MeshInputData, triangles: &[u32], guid: u32, material_index: u32) -> Self {
        let mut remap: AHashMap<u32, u32> = AHashMap::with_capacity(triangles.len() * 2);
        let mut cluster = Cluster {
            guid,
            positions: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            indices: Vec::with_capacity(triangles.len() * 3),
            bounds: Aabb::EMPTY,
            sphere: BoundingSphere::default(),
            lod_level: mesh.lod_level,
            lod_error: 0.0,
            material_index,
            links: Vec::new(),
            external_edges: Vec::new(),
        };

        for &triangle in triangles {
            for source in mesh.triangle(triangle as usize) {
                let local = *remap.entry(source).or_insert_with(|| {
                    let s = source as usize;
                    cluster.positions.push(mesh.positions[s]);
                    cluster.normals.push(mesh.normals[s]);
                    cluster.uvs.push(mesh.uvs[s]);
                    (cluster.positions.len() - 1) as u32
                });
                cluster.indices.push(local);
            }
        }

        cluster.bounds = Aabb::from_points(cluster.positions.iter().copied());
        cluster.sphere = BoundingSphere::from_aabb(&cluster.bounds);
        cluster
    }
}

/// Splits triangle ranges into bounded clusters
pub struct Clusterer<'a> {
    cluster_size: usize,
    partitioner: &'a dyn Partitioner,
}

impl<'a> Clusterer<'a> {
    pub fn new(cluster_size: usize, partitioner: &'a dyn Partitioner) -> Self {
        Self {
            cluster_size: cluster_size.max(1),
            partitioner,
        }
    }

    /// Cluster one submesh of `mesh`.
    ///
    /// Guids are assigned from `first_guid` upward and the returned clusters
    /// are linked among themselves. An empty submesh yields no clusters and an
    /// [`Diagnostic::EmptySubmesh`].
    pub fn cluster_submesh(
        &self,
        mesh: &MeshInputData,
        submesh: usize,
        first_guid: u32,
    ) -> (Vec<Cluster>, Vec<Diagnostic>) {
        let range = mesh.submesh_ranges()[submesh].clone();
        if range.is_empty() {
            return (Vec::new(), vec![Diagnostic::EmptySubmesh { submesh: submesh as u32 }]);
        }
        self.cluster_triangles(mesh, range, mesh.material_index(submesh), first_guid)
    }

    /// Cluster a range of triangles with `ceil(len / cluster_size)` balanced parts.
    ///
    /// An empty range yields nothing; `cluster_submesh` reports empty submeshes.
    pub fn cluster_triangles(
        &self,
        mesh: &MeshInputData,
        triangles: Range<usize>,
        material_index: u32,
        first_guid: u32,
    ) -> (Vec<Cluster>, Vec<Diagnostic>) {
        let count = triangles.len();
        if count == 0 {
            log::debug!("No triangles to cluster at guid {}", first_guid);
            return (Vec::new(), Vec::new());
        }

        let parts = count.div_ceil(self.cluster_size);
        let (members, diagnostics) = if parts == 1 {
            (vec![triangles.map(|t| t as u32).collect::<Vec<_>>()], Vec::new())
        } else {
            let corners: Vec<[Vec3; 3]> =
                triangles.clone().map(|t| mesh.triangle_positions(t)).collect();
            let graph = triangle_adjacency(&corners);
            let partition = self.partitioner.partition(&graph, parts);

            let start = triangles.start as u32;
            let members = partition
                .parts()
                .into_iter()
                .map(|part| part.into_iter().map(|t| t + start).collect())
                .collect();
            (members, partition.diagnostics)
        };

        let mut clusters: Vec<Cluster> = members
            .iter()
            .enumerate()
            .map(|(i, tris)| Cluster::from_triangles(mesh, tris, first_guid + i as u32, material_index))
            .collect();
        link_clusters(&mut clusters);

        log::debug!(
            "Clustered {} triangles into {} clusters (first guid {})",
            count,
            clusters.len(),
            first_guid
        );
        (clusters, diagnostics)
    }
}

/// Recompute links and external edges among `clusters`.
///
/// Only connections inside the slice are recorded; earlier links are
/// discarded.
pub fn link_clusters(clusters: &mut [Cluster]) {
    let edge_count: usize = clusters.iter().map(|c| c.indices.len()).sum();
    let mut index = PositionHashIndex::with_capacity(edge_count);
    // (cluster slot, local v0, local v1) per inserted edge
    let mut owners: Vec<(u32, u32, u32)> = Vec::with_capacity(edge_count);
    let mut shared: Vec<(u32, u32)> = Vec::new();

    for (slot, cluster) in clusters.iter().enumerate() {
        for triangle in cluster.indices.chunks_exact(3) {
            for k in 0..3 {
                let (v0, v1) = (triangle[k], triangle[(k + 1) % 3]);
                let (id, opposite) = index.insert_edge(
                    cluster.positions[v0 as usize],
                    cluster.positions[v1 as usize],
                );
                owners.push((slot as u32, v0, v1));
                shared.extend(opposite.into_iter().map(|other| (id, other)));
            }
        }
    }

    let guids: Vec<u32> = clusters.iter().map(|c| c.guid).collect();
    let mut links: Vec<AHashMap<u32, u32>> = vec![AHashMap::new(); clusters.len()];
    for cluster in clusters.iter_mut() {
        cluster.links.clear();
        cluster.external_edges.clear();
    }

    for (a, b) in shared {
        let (slot_a, a0, a1) = owners[a as usize];
        let (slot_b, b0, b1) = owners[b as usize];
        if slot_a == slot_b {
            continue;
        }
        let (guid_a, guid_b) = (guids[slot_a as usize], guids[slot_b as usize]);

        clusters[slot_a as usize].external_edges.push(ExternalEdge { v0: a0, v1: a1, neighbor: guid_b });
        clusters[slot_b as usize].external_edges.push(ExternalEdge { v0: b0, v1: b1, neighbor: guid_a });
        *links[slot_a as usize].entry(guid_b).or_default() += 1;
        *links[slot_b as usize].entry(guid_a).or_default() += 1;
    }

    for (cluster, map) in clusters.iter_mut().zip(links) {
        cluster.links = map.into_iter().collect();
        cluster.links.sort_unstable();
        cluster.external_edges.sort_unstable_by_key(|e| (e.neighbor, e.v0, e.v1));
    }
}

/// Adjacency between the clusters of one level, indexed by position in `level`.
///
/// `level` must be a contiguous arena slice starting at guid `first_guid`.
pub fn cluster_graph(level: &[Cluster], first_guid: u32) -> AdjacencyGraph {
    let end = first_guid + level.len() as u32;
    let mut graph = AdjacencyGraph::new(level.len());
    for (slot, cluster) in level.iter().enumerate() {
        for &(neighbor, weight) in &cluster.links {
            if neighbor >= first_guid && neighbor < end && (slot as u32) < neighbor - first_guid {
                graph.add_edge(slot as u32, neighbor - first_guid, weight);
            }
        }
    }
    graph
}
