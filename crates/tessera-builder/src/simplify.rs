//! Quadric error edge-collapse simplification
//!
//! Each vertex accumulates the area-weighted planes of its triangles plus
//! heavily weighted constraint planes along open boundaries. Edges collapse
//! cheapest first until the triangle budget is met; collapses whose geometric
//! error exceeds the current bound are skipped. When a pass falls short of the
//! budget, the bound is relaxed and the pass rerun from the input.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::AHashMap;
use smallvec::SmallVec;
use thiserror::Error;

use tessera_core::config::SimplifyConfig;
use tessera_core::math::{DVec3, Vec2, Vec3};
use tessera_core::MeshInputData;

/// Relative weight of boundary constraint planes
const BOUNDARY_WEIGHT: f64 = 10.0;

/// Simplification failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimplifyError {
    #[error("Mesh has no triangles to simplify")]
    EmptyMesh,

    #[error("Could not reach {target} triangles after {iterations} attempts (best {achieved})")]
    DidNotConverge {
        target: u32,
        achieved: u32,
        iterations: u32,
    },
}

/// Result type for simplification
pub type SimplifyResult<T> = Result<T, SimplifyError>;

/// Successful simplification
#[derive(Debug, Clone)]
pub struct Simplified {
    /// Compacted mesh, a single submesh
    pub mesh: MeshInputData,
    /// Largest geometric deviation introduced, in mesh units
    pub error: f32,
    /// Passes run, 0 when nothing had to be removed
    pub iterations: u32,
}

/// Symmetric 4x4 quadric stored as its upper triangle, with accumulated weight
#[derive(Debug, Clone, Copy, Default)]
struct Quadric {
    data: [f64; 10],
    weight: f64,
}

impl Quadric {
    /// Quadric of the plane `normal . p + d = 0` scaled by `weight`
    fn from_plane(normal: DVec3, d: f64, weight: f64) -> Self {
        let (a, b, c) = (normal.x, normal.y, normal.z);
        #[rustfmt::skip]
        let data = [
            a * a, a * b, a * c, a * d,
            b * b, b * c, b * d,
            c * c, c * d,
            d * d,
        ];
        Self {
            data: data.map(|x| x * weight),
            weight,
        }
    }

    fn add(&self, other: &Quadric) -> Quadric {
        let mut data = self.data;
        for (x, y) in data.iter_mut().zip(other.data) {
            *x += y;
        }
        Quadric {
            data,
            weight: self.weight + other.weight,
        }
    }

    /// Weighted mean squared distance of `p` to the accumulated planes
    fn error(&self, p: DVec3) -> f64 {
        let q = &self.data;
        let (x, y, z) = (p.x, p.y, p.z);
        let sum = q[0] * x * x + 2.0 * q[1] * x * y + 2.0 * q[2] * x * z + 2.0 * q[3] * x
            + q[4] * y * y + 2.0 * q[5] * y * z + 2.0 * q[6] * y
            + q[7] * z * z + 2.0 * q[8] * z
            + q[9];
        if self.weight > 0.0 {
            (sum / self.weight).max(0.0)
        } else {
            0.0
        }
    }
}

/// First directed use of an undirected edge and how many triangles use it
type EdgeUse = (u32, u32, usize, u32);

/// Candidate edge collapse, `from` merges into `into` at `position`
#[derive(Debug, Clone, Copy)]
struct Collapse {
    /// Ordering key: geometric error plus attribute penalty
    cost: f64,
    /// Geometric error alone, checked against the bound
    error: f64,
    into: u32,
    from: u32,
    position: DVec3,
    /// Source vertex of the kept attributes, `None` to average both
    attributes: Option<u32>,
    versions: (u32, u32),
}

impl PartialEq for Collapse {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Collapse {}

impl PartialOrd for Collapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Collapse {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap, then lowest vertex pair first
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| (other.into, other.from).cmp(&(self.into, self.from)))
    }
}

/// Quadric simplifier with iterative error-bound relaxation
#[derive(Debug, Clone, Default)]
pub struct Simplifier {
    config: SimplifyConfig,
}

impl Simplifier {
    pub fn new(config: SimplifyConfig) -> Self {
        Self { config }
    }

    /// Reduce `mesh` to at most `target` triangles (within the configured slack).
    ///
    /// `locked` marks vertices that must keep their position. Returns the
    /// compacted mesh and its error, or an error without any partial result.
    pub fn simplify(
        &self,
        mesh: &MeshInputData,
        target: usize,
        locked: Option<&[bool]>,
    ) -> SimplifyResult<Simplified> {
        if mesh.triangle_count() == 0 {
            return Err(SimplifyError::EmptyMesh);
        }

        if target >= mesh.triangle_count() {
            let positions = to_f64(&mesh.positions);
            return Ok(Simplified {
                mesh: compact(mesh, &live_triangles(mesh), &positions, &mesh.normals, &mesh.uvs),
                error: 0.0,
                iterations: 0,
            });
        }

        let extent = mesh.bounds().size().length() as f64;
        let accept = (target as f64 * self.config.convergence_slack as f64).floor() as usize;
        let mut bound = self.config.initial_error as f64;
        let mut best = mesh.triangle_count();

        for iteration in 1..=self.config.max_iterations {
            let limit = (bound * extent).powi(2);
            let mut pass = CollapsePass::new(mesh, locked, &self.config);
            let max_error = pass.run(target, limit);

            log::trace!(
                "Simplify pass {}: {} -> {} triangles (target {}, bound {:.3})",
                iteration,
                mesh.triangle_count(),
                pass.live,
                target,
                bound
            );

            if pass.live <= accept {
                return Ok(Simplified {
                    mesh: compact(mesh, &pass.triangles, &pass.positions, &pass.normals, &pass.uvs),
                    error: max_error.sqrt() as f32,
                    iterations: iteration,
                });
            }

            best = best.min(pass.live);
            bound = (bound * self.config.error_growth as f64).min(self.config.max_error as f64);
        }

        Err(SimplifyError::DidNotConverge {
            target: target as u32,
            achieved: best as u32,
            iterations: self.config.max_iterations,
        })
    }
}

fn to_f64(positions: &[Vec3]) -> Vec<DVec3> {
    positions.iter().map(|p| p.as_dvec3()).collect()
}

fn live_triangles(mesh: &MeshInputData) -> Vec<Option<[u32; 3]>> {
    (0..mesh.triangle_count()).map(|t| Some(mesh.triangle(t))).collect()
}

/// Build a mesh from the surviving triangles, dropping unreferenced vertices
fn compact(
    source: &MeshInputData,
    triangles: &[Option<[u32; 3]>],
    positions: &[DVec3],
    normals: &[Vec3],
    uvs: &[Vec2],
) -> MeshInputData {
    let mut remap = vec![u32::MAX; source.vertex_count()];
    let mut mesh = MeshInputData {
        lod_level: source.lod_level,
        ..MeshInputData::default()
    };

    for triangle in triangles.iter().flatten() {
        for &vertex in triangle {
            let v = vertex as usize;
            if remap[v] == u32::MAX {
                remap[v] = mesh.positions.len() as u32;
                mesh.positions.push(positions[v].as_vec3());
                mesh.normals.push(normals[v]);
                mesh.uvs.push(uvs[v]);
            }
            mesh.indices.push(remap[v]);
        }
    }

    mesh.triangle_counts = vec![mesh.triangle_count() as u32];
    mesh.material_indices = vec![source.material_index(0)];
    mesh
}

/// State of one collapse pass over a copy of the input
struct CollapsePass<'a> {
    config: &'a SimplifyConfig,
    locked: Option<&'a [bool]>,
    positions: Vec<DVec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    quadrics: Vec<Quadric>,
    triangles: Vec<Option<[u32; 3]>>,
    vertex_triangles: Vec<SmallVec<[u32; 8]>>,
    versions: Vec<u32>,
    removed: Vec<bool>,
    heap: BinaryHeap<Collapse>,
    live: usize,
}

impl<'a> CollapsePass<'a> {
    fn new(mesh: &MeshInputData, locked: Option<&'a [bool]>, config: &'a SimplifyConfig) -> Self {
        let positions = to_f64(&mesh.positions);
        let triangles = live_triangles(mesh);
        let mut quadrics = vec![Quadric::default(); positions.len()];
        let mut vertex_triangles = vec![SmallVec::new(); positions.len()];
        let mut edge_use: AHashMap<(u32, u32), EdgeUse> = AHashMap::new();

        for (t, triangle) in triangles.iter().enumerate() {
            let Some(tri) = triangle else { continue };
            let [a, b, c] = tri.map(|v| positions[v as usize]);
            let cross = (b - a).cross(c - a);
            let area = cross.length() * 0.5;

            if area > 0.0 {
                let normal = cross.normalize();
                let plane = Quadric::from_plane(normal, -normal.dot(a), area);
                for &v in tri {
                    quadrics[v as usize] = quadrics[v as usize].add(&plane);
                }
            }
            for k in 0..3 {
                let (v0, v1) = (tri[k], tri[(k + 1) % 3]);
                if !vertex_triangles[v0 as usize].contains(&(t as u32)) {
                    vertex_triangles[v0 as usize].push(t as u32);
                }
                edge_use.entry((v0.min(v1), v0.max(v1))).or_insert((v0, v1, t, 0)).3 += 1;
            }
        }

        let mut pass = Self {
            config,
            locked,
            positions,
            normals: mesh.normals.clone(),
            uvs: mesh.uvs.clone(),
            quadrics,
            triangles,
            vertex_triangles,
            versions: vec![0; mesh.vertex_count()],
            removed: vec![false; mesh.vertex_count()],
            heap: BinaryHeap::new(),
            live: mesh.triangle_count(),
        };

        // sorted so quadric sums and heap order do not depend on hash order
        let mut edges: Vec<((u32, u32), EdgeUse)> = edge_use.into_iter().collect();
        edges.sort_unstable_by_key(|&(key, _)| key);

        pass.add_boundary_planes(&edges);
        // repeated-index triangles yield (v, v) edges, which never collapse
        for &((a, b), _) in edges.iter().filter(|((a, b), _)| a != b) {
            pass.push_candidate(a, b);
        }
        pass
    }

    /// Constraint planes through open edges, perpendicular to their triangle
    fn add_boundary_planes(&mut self, edges: &[((u32, u32), EdgeUse)]) {
        for &(_, (v0, v1, t, uses)) in edges {
            if uses != 1 {
                continue;
            }
            let Some(tri) = self.triangles[t] else { continue };
            let [a, b, c] = tri.map(|v| self.positions[v as usize]);
            let face = (b - a).cross(c - a);
            let (p0, p1) = (self.positions[v0 as usize], self.positions[v1 as usize]);
            let edge = p1 - p0;
            let normal = edge.cross(face).normalize_or_zero();
            if normal == DVec3::ZERO {
                continue;
            }
            let plane = Quadric::from_plane(normal, -normal.dot(p0), BOUNDARY_WEIGHT * edge.length_squared());
            for v in [v0, v1] {
                self.quadrics[v as usize] = self.quadrics[v as usize].add(&plane);
            }
        }
    }

    fn is_locked(&self, vertex: u32) -> bool {
        self.locked.is_some_and(|mask| mask.get(vertex as usize).copied().unwrap_or(false))
    }

    fn push_candidate(&mut self, a: u32, b: u32) {
        if let Some(collapse) = self.evaluate(a, b) {
            self.heap.push(collapse);
        }
    }

    /// Cheapest way to collapse the edge `a - b`, `None` if both ends are locked
    fn evaluate(&self, a: u32, b: u32) -> Option<Collapse> {
        let (locked_a, locked_b) = (self.is_locked(a), self.is_locked(b));
        let (into, from) = match (locked_a, locked_b) {
            (true, true) => return None,
            (false, true) => (b, a),
            _ => (a, b),
        };

        let (pa, pb) = (self.positions[into as usize], self.positions[from as usize]);
        let quadric = self.quadrics[into as usize].add(&self.quadrics[from as usize]);

        let mut options: SmallVec<[(DVec3, Option<u32>); 3]> = SmallVec::new();
        options.push((pa, Some(into)));
        if !(locked_a || locked_b) {
            options.push((pb, Some(from)));
            options.push(((pa + pb) * 0.5, None));
        }

        let (position, attributes, geometric) = options
            .into_iter()
            .map(|(p, attr)| (p, attr, quadric.error(p)))
            .min_by(|x, y| x.2.total_cmp(&y.2))?;

        let (ia, ib) = (into as usize, from as usize);
        let normal_term = 1.0 - self.normals[ia].dot(self.normals[ib]) as f64;
        let uv_term = self.uvs[ia].distance_squared(self.uvs[ib]) as f64;
        let penalty = (pa - pb).length_squared()
            * (self.config.normal_weight as f64 * normal_term.max(0.0)
                + self.config.uv_weight as f64 * uv_term);

        Some(Collapse {
            cost: geometric + penalty,
            error: geometric,
            into,
            from,
            position,
            attributes,
            versions: (self.versions[ia], self.versions[ib]),
        })
    }

    /// Collapse cheapest first until `target` triangles remain, skipping
    /// collapses whose geometric error exceeds `limit`. Returns the largest
    /// accepted error.
    fn run(&mut self, target: usize, limit: f64) -> f64 {
        let mut max_error = 0.0f64;
        while self.live > target {
            let Some(collapse) = self.heap.pop() else { break };
            let (into, from) = (collapse.into as usize, collapse.from as usize);
            if self.removed[into]
                || self.removed[from]
                || (self.versions[into], self.versions[from]) != collapse.versions
            {
                continue;
            }
            if collapse.error > limit || !self.can_collapse(&collapse) {
                continue;
            }
            self.apply(&collapse);
            max_error = max_error.max(collapse.error);
        }
        max_error
    }

    fn neighbors(&self, vertex: u32) -> SmallVec<[u32; 16]> {
        let mut result = SmallVec::new();
        for &t in &self.vertex_triangles[vertex as usize] {
            if let Some(tri) = self.triangles[t as usize] {
                for v in tri {
                    if v != vertex && !result.contains(&v) {
                        result.push(v);
                    }
                }
            }
        }
        result
    }

    fn can_collapse(&self, collapse: &Collapse) -> bool {
        let (into, from) = (collapse.into, collapse.from);

        let shared: SmallVec<[u32; 4]> = self.vertex_triangles[from as usize]
            .iter()
            .copied()
            .filter(|&t| self.triangles[t as usize].is_some_and(|tri| tri.contains(&into)))
            .collect();
        if shared.is_empty() || self.live <= shared.len() {
            return false;
        }

        // link condition: common neighbors are exactly the apexes of the shared triangles
        let from_neighbors = self.neighbors(from);
        let common = self
            .neighbors(into)
            .into_iter()
            .filter(|v| from_neighbors.contains(v))
            .count();
        if common != shared.len() {
            return false;
        }

        for vertex in [into, from] {
            for &t in &self.vertex_triangles[vertex as usize] {
                let Some(tri) = self.triangles[t as usize] else { continue };
                if tri.contains(&into) && tri.contains(&from) {
                    continue;
                }
                let before = tri.map(|v| self.positions[v as usize]);
                let after = tri.map(|v| {
                    if v == into || v == from { collapse.position } else { self.positions[v as usize] }
                });
                let n0 = (before[1] - before[0]).cross(before[2] - before[0]);
                // zero-area triangles have no orientation to flip
                if n0 == DVec3::ZERO {
                    continue;
                }
                let n1 = (after[1] - after[0]).cross(after[2] - after[0]);
                if n1.length_squared() <= n0.length_squared() * 1e-12 || n0.dot(n1) <= 0.0 {
                    return false;
                }
            }
        }
        true
    }

    fn apply(&mut self, collapse: &Collapse) {
        let (into, from) = (collapse.into, collapse.from);
        let (ia, ib) = (into as usize, from as usize);

        self.positions[ia] = collapse.position;
        self.quadrics[ia] = self.quadrics[ia].add(&self.quadrics[ib]);
        match collapse.attributes {
            Some(source) => {
                let s = source as usize;
                self.normals[ia] = self.normals[s];
                self.uvs[ia] = self.uvs[s];
            }
            None => {
                self.normals[ia] = (self.normals[ia] + self.normals[ib]).normalize_or_zero();
                self.uvs[ia] = (self.uvs[ia] + self.uvs[ib]) * 0.5;
            }
        }

        let moved = std::mem::take(&mut self.vertex_triangles[ib]);
        for t in moved {
            let Some(tri) = self.triangles[t as usize].as_mut() else { continue };
            if tri.contains(&into) {
                self.triangles[t as usize] = None;
                self.live -= 1;
            } else {
                for v in tri.iter_mut() {
                    if *v == from {
                        *v = into;
                    }
                }
                self.vertex_triangles[ia].push(t);
            }
        }
        let triangles = &self.triangles;
        self.vertex_triangles[ia].retain(|t| triangles[*t as usize].is_some());

        self.removed[ib] = true;
        self.versions[ia] += 1;
        for neighbor in self.neighbors(into) {
            self.push_candidate(into, neighbor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::mesh::primitives;

    fn simplifier() -> Simplifier {
        Simplifier::new(SimplifyConfig::default())
    }

    #[test]
    fn test_flat_grid_halves_without_error() {
        let mesh = primitives::grid(8, 8);
        let result = simplifier().simplify(&mesh, 64, None).unwrap();

        assert!(result.mesh.triangle_count() <= 70);
        assert!(result.mesh.triangle_count() >= 1);
        assert!(result.error < 1e-3, "error {}", result.error);
        assert!(result.mesh.validate().is_ok());
        for p in &result.mesh.positions {
            assert!(p.y.abs() < 1e-5);
        }
    }

    #[test]
    fn test_sphere_reaches_target() {
        let mesh = primitives::uv_sphere(24, 12);
        let target = mesh.triangle_count() / 2;
        let result = simplifier().simplify(&mesh, target, None).unwrap();

        assert!(result.mesh.triangle_count() as f32 <= target as f32 * 1.1);
        assert!(result.error > 0.0);
        assert!(result.error < 1.0);
        assert_eq!(result.mesh.vertex_count(), result.mesh.normals.len());
        assert!(result.mesh.degenerate_triangles().is_empty());
    }

    #[test]
    fn test_target_zero_never_converges() {
        let mesh = primitives::cube();
        let result = simplifier().simplify(&mesh, 0, None);
        assert!(matches!(
            result,
            Err(SimplifyError::DidNotConverge { target: 0, iterations: 10, .. })
        ));
    }

    #[test]
    fn test_target_above_count_compacts() {
        let mut mesh = primitives::cube();
        mesh.positions.push(Vec3::splat(9.0));
        mesh.normals.push(Vec3::Y);
        mesh.uvs.push(Vec2::ZERO);

        let result = simplifier().simplify(&mesh, 100, None).unwrap();
        assert_eq!(result.iterations, 0);
        assert_eq!(result.error, 0.0);
        assert_eq!(result.mesh.triangle_count(), 12);
        assert_eq!(result.mesh.vertex_count(), 8);
    }

    #[test]
    fn test_empty_mesh() {
        let result = simplifier().simplify(&MeshInputData::default(), 4, None);
        assert_eq!(result.unwrap_err(), SimplifyError::EmptyMesh);
    }

    #[test]
    fn test_locked_vertices_stay_put() {
        let mesh = primitives::grid(8, 8);
        let locked: Vec<bool> = mesh
            .positions
            .iter()
            .map(|p| p.x == 0.0 || p.x == 8.0 || p.z == 0.0 || p.z == 8.0)
            .collect();
        let border: Vec<Vec3> = mesh
            .positions
            .iter()
            .zip(&locked)
            .filter(|&(_, &l)| l)
            .map(|(p, _)| *p)
            .collect();

        let result = simplifier().simplify(&mesh, 64, Some(&locked)).unwrap();
        for p in &border {
            assert!(result.mesh.positions.contains(p), "border vertex {:?} moved", p);
        }
    }

    fn surface_area(mesh: &MeshInputData) -> f32 {
        (0..mesh.triangle_count())
            .map(|t| {
                let [a, b, c] = mesh.triangle_positions(t);
                (b - a).cross(c - a).length() * 0.5
            })
            .sum()
    }

    #[test]
    fn test_quadric_measures_plane_distance() {
        let plane = Quadric::from_plane(DVec3::Y, -1.0, 2.0);
        assert_eq!(plane.error(DVec3::new(5.0, 1.0, -3.0)), 0.0);
        assert!((plane.error(DVec3::new(0.0, 3.0, 0.0)) - 4.0).abs() < 1e-12);
        assert_eq!(Quadric::default().error(DVec3::ONE), 0.0);
    }

    #[test]
    fn test_repeated_index_triangle_is_harmless() {
        // vertex 40 is the grid's center
        let mut mesh = primitives::grid(8, 8);
        mesh.indices.extend_from_slice(&[40, 40, 41]);
        mesh.triangle_counts[0] += 1;

        let result = simplifier().simplify(&mesh, 64, None).unwrap();
        assert!(result.mesh.triangle_count() <= 70);
        assert!((surface_area(&result.mesh) - 64.0).abs() < 1e-3);
        assert!(result.mesh.validate().is_ok());
    }

    #[test]
    fn test_fully_locked_mesh_fails() {
        let mesh = primitives::grid(2, 2);
        let locked = vec![true; mesh.vertex_count()];
        let result = simplifier().simplify(&mesh, 2, Some(&locked));
        assert!(matches!(result, Err(SimplifyError::DidNotConverge { achieved: 8, .. })));
    }
}
