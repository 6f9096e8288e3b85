//! Mesh input model
//!
//! Parallel vertex attribute arrays with a flattened triangle index buffer
//! split into submeshes. The same type carries the merged geometry of a
//! cluster group through simplification.

pub mod primitives;

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};
use crate::math::{Aabb, Vec2, Vec3};

/// Triangle mesh with per-vertex attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshInputData {
    /// Vertex positions
    pub positions: Vec<Vec3>,
    /// Vertex normals, parallel to `positions`
    pub normals: Vec<Vec3>,
    /// Texture coordinates, parallel to `positions`
    pub uvs: Vec<Vec2>,
    /// Three indices per triangle, submeshes laid out back to back
    pub indices: Vec<u32>,
    /// Triangle count of each submesh
    pub triangle_counts: Vec<u32>,
    /// Material index of each submesh
    pub material_indices: Vec<u32>,
    /// LOD level this geometry was produced at (0 for raw input)
    pub lod_level: u32,
}

impl MeshInputData {
    /// Single-submesh mesh with material 0
    pub fn new(positions: Vec<Vec3>, normals: Vec<Vec3>, uvs: Vec<Vec2>, indices: Vec<u32>) -> Self {
        let triangles = (indices.len() / 3) as u32;
        Self {
            positions,
            normals,
            uvs,
            indices,
            triangle_counts: vec![triangles],
            material_indices: vec![0],
            lod_level: 0,
        }
    }

    /// Append another mesh as additional submeshes
    pub fn append(&mut self, other: &MeshInputData) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.uvs.extend_from_slice(&other.uvs);
        self.indices.extend(other.indices.iter().map(|i| i + base));
        self.triangle_counts.extend_from_slice(&other.triangle_counts);
        self.material_indices.extend_from_slice(&other.material_indices);
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn submesh_count(&self) -> usize {
        self.triangle_counts.len()
    }

    /// Triangle ranges of each submesh, in triangle units
    pub fn submesh_ranges(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.triangle_counts
            .iter()
            .map(|&count| {
                let range = start..start + count as usize;
                start = range.end;
                range
            })
            .collect()
    }

    /// Vertex indices of a triangle
    pub fn triangle(&self, triangle: usize) -> [u32; 3] {
        let base = triangle * 3;
        [self.indices[base], self.indices[base + 1], self.indices[base + 2]]
    }

    /// Corner positions of a triangle
    pub fn triangle_positions(&self, triangle: usize) -> [Vec3; 3] {
        self.triangle(triangle).map(|i| self.positions[i as usize])
    }

    /// Bounds of every referenced vertex
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.indices.iter().map(|&i| self.positions[i as usize]))
    }

    /// Material of a submesh, 0 when none was assigned
    pub fn material_index(&self, submesh: usize) -> u32 {
        self.material_indices.get(submesh).copied().unwrap_or(0)
    }

    /// Check structural consistency.
    ///
    /// Degenerate triangles are not rejected here, see [`Self::degenerate_triangles`].
    pub fn validate(&self) -> BuildResult<()> {
        if self.indices.is_empty() {
            return Err(BuildError::EmptyInput);
        }
        if self.normals.len() != self.positions.len() || self.uvs.len() != self.positions.len() {
            return Err(BuildError::InvalidInput(format!(
                "attribute arrays differ in length: {} positions, {} normals, {} uvs",
                self.positions.len(),
                self.normals.len(),
                self.uvs.len()
            )));
        }
        if self.indices.len() % 3 != 0 {
            return Err(BuildError::InvalidInput(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        if self.material_indices.len() != self.triangle_counts.len() {
            return Err(BuildError::InvalidInput(format!(
                "{} material indices for {} submeshes",
                self.material_indices.len(),
                self.triangle_counts.len()
            )));
        }
        let listed: usize = self.triangle_counts.iter().map(|&c| c as usize).sum();
        if listed != self.triangle_count() {
            return Err(BuildError::InvalidInput(format!(
                "submesh triangle counts sum to {} but the index buffer holds {}",
                listed,
                self.triangle_count()
            )));
        }
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= self.positions.len()) {
            return Err(BuildError::InvalidInput(format!(
                "index {} out of range for {} vertices",
                index,
                self.positions.len()
            )));
        }
        Ok(())
    }

    /// Triangles with repeated corner positions or zero area, as
    /// `(submesh, triangle within submesh)`
    pub fn degenerate_triangles(&self) -> Vec<(u32, u32)> {
        let mut result = Vec::new();
        for (submesh, range) in self.submesh_ranges().into_iter().enumerate() {
            for (local, triangle) in range.enumerate() {
                let [a, b, c] = self.triangle_positions(triangle);
                let repeated = a == b || b == c || a == c;
                if repeated || (b - a).cross(c - a).length_squared() == 0.0 {
                    result.push((submesh as u32, local as u32));
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshInputData {
        MeshInputData::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![Vec3::Z; 4],
            vec![Vec2::ZERO; 4],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn test_mesh_counts() {
        let mesh = quad();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.submesh_ranges(), vec![0..2]);
        assert_eq!(mesh.triangle(1), [0, 2, 3]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_append_offsets_indices() {
        let mut mesh = quad();
        mesh.append(&quad());
        assert_eq!(mesh.submesh_count(), 2);
        assert_eq!(mesh.triangle(2), [4, 5, 6]);
        assert_eq!(mesh.submesh_ranges(), vec![0..2, 2..4]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert_eq!(MeshInputData::default().validate(), Err(BuildError::EmptyInput));

        let mut mesh = quad();
        mesh.indices[4] = 9;
        assert!(matches!(mesh.validate(), Err(BuildError::InvalidInput(_))));

        let mut mesh = quad();
        mesh.normals.pop();
        assert!(matches!(mesh.validate(), Err(BuildError::InvalidInput(_))));

        let mut mesh = quad();
        mesh.triangle_counts = vec![1];
        assert!(matches!(mesh.validate(), Err(BuildError::InvalidInput(_))));

        let mut mesh = quad();
        mesh.indices.push(0);
        assert!(matches!(mesh.validate(), Err(BuildError::InvalidInput(_))));
    }

    #[test]
    fn test_degenerate_triangles() {
        let mut mesh = quad();
        assert!(mesh.degenerate_triangles().is_empty());

        // collinear corners
        mesh.positions[3] = Vec3::new(2.0, 2.0, 0.0);
        assert_eq!(mesh.degenerate_triangles(), vec![(0, 1)]);
    }

    #[test]
    fn test_bounds() {
        let bounds = quad().bounds();
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 0.0));
    }
}
