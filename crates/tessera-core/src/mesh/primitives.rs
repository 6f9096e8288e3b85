//! Procedural meshes for tests, benchmarks and the CLI

use std::f32::consts::{PI, TAU};

use super::MeshInputData;
use crate::math::{Vec2, Vec3};

/// Closed cube spanning [-1, 1] with 8 shared corners and 12 triangles.
///
/// Corner `i` sits at `x = i & 1`, `y = i & 2`, `z = i & 4` (set bit = +1).
pub fn cube() -> MeshInputData {
    let positions: Vec<Vec3> = (0..8)
        .map(|i| {
            let axis = |bit: u32| if i & bit != 0 { 1.0 } else { -1.0 };
            Vec3::new(axis(1), axis(2), axis(4))
        })
        .collect();
    let normals = positions.iter().map(|p| p.normalize()).collect();
    let uvs = positions.iter().map(|p| Vec2::new(p.x, p.y) * 0.5 + 0.5).collect();

    #[rustfmt::skip]
    let indices = vec![
        0, 2, 3,  0, 3, 1, // -z
        4, 5, 7,  4, 7, 6, // +z
        0, 4, 6,  0, 6, 2, // -x
        1, 3, 7,  1, 7, 5, // +x
        0, 1, 5,  0, 5, 4, // -y
        2, 6, 7,  2, 7, 3, // +y
    ];

    MeshInputData::new(positions, normals, uvs, indices)
}

/// Flat grid of `quads_x` by `quads_z` unit quads in the XZ plane, facing +Y.
///
/// Vertex `(i, j)` sits at `(i, 0, j)`, two triangles per quad.
pub fn grid(quads_x: u32, quads_z: u32) -> MeshInputData {
    let row = quads_x + 1;
    let mut positions = Vec::with_capacity((row * (quads_z + 1)) as usize);
    let mut uvs = Vec::with_capacity(positions.capacity());

    for j in 0..=quads_z {
        for i in 0..=quads_x {
            positions.push(Vec3::new(i as f32, 0.0, j as f32));
            uvs.push(Vec2::new(
                i as f32 / quads_x.max(1) as f32,
                j as f32 / quads_z.max(1) as f32,
            ));
        }
    }
    let normals = vec![Vec3::Y; positions.len()];

    let mut indices = Vec::with_capacity((quads_x * quads_z * 6) as usize);
    for j in 0..quads_z {
        for i in 0..quads_x {
            let a = j * row + i;
            let b = a + 1;
            let c = b + row;
            let d = a + row;
            indices.extend_from_slice(&[a, d, c, a, c, b]);
        }
    }

    MeshInputData::new(positions, normals, uvs, indices)
}

/// Unit UV sphere with `segments` columns and `rings` rows.
///
/// Seam and pole vertices are duplicated for their UVs but share bit-identical
/// positions, so the surface is closed under exact position welding.
pub fn uv_sphere(segments: u32, rings: u32) -> MeshInputData {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let row = segments + 1;

    let mut positions = Vec::with_capacity((row * (rings + 1)) as usize);
    let mut uvs = Vec::with_capacity(positions.capacity());

    for r in 0..=rings {
        let theta = PI * r as f32 / rings as f32;
        for s in 0..=segments {
            // the seam column reuses phi = 0 so both copies weld
            let phi = if s == segments { 0.0 } else { TAU * s as f32 / segments as f32 };
            let position = if r == 0 {
                Vec3::Y
            } else if r == rings {
                Vec3::NEG_Y
            } else {
                Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin())
            };
            positions.push(position);
            uvs.push(Vec2::new(s as f32 / segments as f32, r as f32 / rings as f32));
        }
    }
    let normals = positions.clone();

    let mut indices = Vec::new();
    for r in 0..rings {
        for s in 0..segments {
            let a = r * row + s;
            let b = a + 1;
            let c = b + row;
            let d = a + row;
            if r != 0 {
                indices.extend_from_slice(&[a, b, c]);
            }
            if r != rings - 1 {
                indices.extend_from_slice(&[a, c, d]);
            }
        }
    }

    MeshInputData::new(positions, normals, uvs, indices)
}
