//! Wavefront OBJ debug export

use std::io::{self, Write};

use tessera_core::MeshInputData;

use crate::cluster::Cluster;

/// Write a mesh as OBJ, one comment header per submesh
pub fn write_mesh<W: Write>(mesh: &MeshInputData, out: &mut W) -> io::Result<()> {
    writeln!(out, "# Exported from MeshInputData")?;
    writeln!(out, "# Vertices: {}", mesh.vertex_count())?;
    writeln!(out, "# Triangles: {}", mesh.triangle_count())?;
    writeln!(out)?;

    for p in &mesh.positions {
        writeln!(out, "v {} {} {}", p.x, p.y, p.z)?;
    }
    for uv in &mesh.uvs {
        writeln!(out, "vt {} {}", uv.x, uv.y)?;
    }
    for n in &mesh.normals {
        writeln!(out, "vn {} {} {}", n.x, n.y, n.z)?;
    }

    for (submesh, range) in mesh.submesh_ranges().into_iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "# Mesh {} (Material Index: {})", submesh, mesh.material_index(submesh))?;
        for triangle in range {
            let [a, b, c] = mesh.triangle(triangle).map(|i| i + 1);
            writeln!(out, "f {a}/{a}/{a} {b}/{b}/{b} {c}/{c}/{c}")?;
        }
    }
    Ok(())
}

/// Write a single cluster as OBJ
pub fn write_cluster<W: Write>(cluster: &Cluster, out: &mut W) -> io::Result<()> {
    write_mesh(&cluster.to_mesh(), out)
}

/// Write every cluster of `lod_level` as OBJ, one submesh per cluster
pub fn write_level<W: Write>(clusters: &[Cluster], lod_level: u32, out: &mut W) -> io::Result<()> {
    let mut mesh = MeshInputData {
        lod_level,
        ..MeshInputData::default()
    };
    for cluster in clusters.iter().filter(|c| c.lod_level == lod_level) {
        mesh.append(&cluster.to_mesh());
    }
    write_mesh(&mesh, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::mesh::primitives;
    use tessera_core::RecursiveBisection;

    use crate::cluster::Clusterer;

    fn to_string(write: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buffer = Vec::new();
        write(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_mesh_export() {
        let text = to_string(|out| write_mesh(&primitives::cube(), out));

        assert!(text.starts_with("# Exported from MeshInputData\n# Vertices: 8\n# Triangles: 12\n"));
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), 8);
        assert_eq!(text.lines().filter(|l| l.starts_with("vt ")).count(), 8);
        assert_eq!(text.lines().filter(|l| l.starts_with("vn ")).count(), 8);
        assert_eq!(text.lines().filter(|l| l.starts_with("f ")).count(), 12);
        assert!(text.contains("# Mesh 0 (Material Index: 0)"));
        assert!(text.contains("f 1/1/1 3/3/3 4/4/4"));
    }

    #[test]
    fn test_level_export_one_submesh_per_cluster() {
        let partitioner = RecursiveBisection::default();
        let mesh = primitives::grid(16, 8);
        let (clusters, _) = Clusterer::new(64, &partitioner).cluster_submesh(&mesh, 0, 0);

        let text = to_string(|out| write_level(&clusters, 0, out));
        assert_eq!(text.lines().filter(|l| l.starts_with("# Mesh ")).count(), clusters.len());
        assert_eq!(text.lines().filter(|l| l.starts_with("f ")).count(), 256);

        let empty = to_string(|out| write_level(&clusters, 3, out));
        assert!(empty.contains("# Triangles: 0"));
        assert!(!empty.contains("# Mesh"));
    }

    #[test]
    fn test_cluster_export() {
        let partitioner = RecursiveBisection::default();
        let (clusters, _) = Clusterer::new(128, &partitioner).cluster_submesh(&primitives::cube(), 0, 0);
        let text = to_string(|out| write_cluster(&clusters[0], out));
        assert_eq!(text.lines().filter(|l| l.starts_with("f ")).count(), 12);
    }
}
