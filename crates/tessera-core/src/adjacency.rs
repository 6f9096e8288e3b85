//! Adjacency between mesh elements
//!
//! Edges, triangles and clusters are adjacent when they share a geometric
//! edge. The weight of a connection is the number of shared edges.

use smallvec::SmallVec;

use crate::hash::PositionHashIndex;
use crate::math::Vec3;

/// Neighbor list of one element: `(neighbor, weight)`
pub type Neighbors = SmallVec<[(u32, u32); 8]>;

/// Symmetric weighted adjacency over `N` elements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdjacencyGraph {
    neighbors: Vec<Neighbors>,
}

impl AdjacencyGraph {
    /// Graph over `len` elements with no connections
    pub fn new(len: usize) -> Self {
        Self {
            neighbors: vec![Neighbors::new(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Add `weight` to the connection between `a` and `b` on both sides.
    ///
    /// `a == b` records a self-loop once.
    pub fn add_edge(&mut self, a: u32, b: u32, weight: u32) {
        Self::bump(&mut self.neighbors[a as usize], b, weight);
        if a != b {
            Self::bump(&mut self.neighbors[b as usize], a, weight);
        }
    }

    fn bump(list: &mut Neighbors, neighbor: u32, weight: u32) {
        match list.iter_mut().find(|(n, _)| *n == neighbor) {
            Some(entry) => entry.1 += weight,
            None => list.push((neighbor, weight)),
        }
    }

    /// Connections of an element
    pub fn neighbors(&self, element: u32) -> &[(u32, u32)] {
        &self.neighbors[element as usize]
    }

    /// Weight of the connection between `a` and `b`, 0 if none
    pub fn weight(&self, a: u32, b: u32) -> u32 {
        self.neighbors(a)
            .iter()
            .find(|(n, _)| *n == b)
            .map_or(0, |&(_, w)| w)
    }

    /// Sum of connection weights of an element, self-loops excluded
    pub fn degree(&self, element: u32) -> u32 {
        self.neighbors(element)
            .iter()
            .filter(|(n, _)| *n != element)
            .map(|&(_, w)| w)
            .sum()
    }

    /// Check that every connection is mirrored with the same weight
    pub fn is_symmetric(&self) -> bool {
        (0..self.len() as u32).all(|a| {
            self.neighbors(a)
                .iter()
                .all(|&(b, w)| (b as usize) < self.len() && self.weight(b, a) == w)
        })
    }

    /// Total weight of connections whose endpoints are assigned differently
    pub fn cut_weight(&self, assignment: &[u32]) -> u64 {
        let mut cut = 0u64;
        for a in 0..self.len() as u32 {
            for &(b, w) in self.neighbors(a) {
                if a < b && assignment[a as usize] != assignment[b as usize] {
                    cut += w as u64;
                }
            }
        }
        cut
    }

    /// Collapse elements into `owner_count` owners.
    ///
    /// Connections between elements of the same owner become self-loops.
    pub fn fold(&self, owners: &[u32], owner_count: usize) -> AdjacencyGraph {
        let mut folded = AdjacencyGraph::new(owner_count);
        for a in 0..self.len() as u32 {
            for &(b, w) in self.neighbors(a) {
                if a < b {
                    folded.add_edge(owners[a as usize], owners[b as usize], w);
                }
            }
        }
        folded
    }

    /// Drop self-loops
    pub fn without_self_loops(mut self) -> Self {
        for (element, list) in self.neighbors.iter_mut().enumerate() {
            list.retain(|(n, _)| *n as usize != element);
        }
        self
    }
}

/// Adjacency between directed edges given as `(from, to)` positions.
///
/// Two edges are adjacent when one runs exactly opposite to the other. Edges
/// shared by more than two triangles connect pairwise to every opposite edge.
pub fn build_edge_adjacency(edges: &[(Vec3, Vec3)]) -> AdjacencyGraph {
    let mut index = PositionHashIndex::with_capacity(edges.len());
    let mut graph = AdjacencyGraph::new(edges.len());
    for &(a, b) in edges {
        let (id, opposite) = index.insert_edge(a, b);
        for other in opposite {
            graph.add_edge(id, other, 1);
        }
    }
    graph
}

/// Directed edges of triangles, three per triangle in corner order
pub fn triangle_edges(corners: &[[Vec3; 3]]) -> Vec<(Vec3, Vec3)> {
    corners
        .iter()
        .flat_map(|&[a, b, c]| [(a, b), (b, c), (c, a)])
        .collect()
}

/// Adjacency between triangles weighted by shared edge count, self-loops dropped
pub fn triangle_adjacency(corners: &[[Vec3; 3]]) -> AdjacencyGraph {
    let edges = build_edge_adjacency(&triangle_edges(corners));
    let owners: Vec<u32> = (0..edges.len() as u32).map(|e| e / 3).collect();
    edges.fold(&owners, corners.len()).without_self_loops()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::primitives;

    fn corners(mesh: &crate::mesh::MeshInputData) -> Vec<[Vec3; 3]> {
        (0..mesh.triangle_count()).map(|t| mesh.triangle_positions(t)).collect()
    }

    #[test]
    fn test_add_edge_is_symmetric() {
        let mut graph = AdjacencyGraph::new(3);
        graph.add_edge(0, 1, 2);
        graph.add_edge(1, 0, 1);
        graph.add_edge(2, 2, 1);

        assert_eq!(graph.weight(0, 1), 3);
        assert_eq!(graph.weight(1, 0), 3);
        assert_eq!(graph.neighbors(2), &[(2, 1)]);
        assert_eq!(graph.degree(2), 0);
        assert!(graph.is_symmetric());
    }

    #[test]
    fn test_edge_adjacency_pairs_opposite_edges() {
        let edges = [
            (Vec3::ZERO, Vec3::X),
            (Vec3::X, Vec3::Y),
            (Vec3::X, Vec3::ZERO),
            (Vec3::Y, Vec3::X),
        ];
        let graph = build_edge_adjacency(&edges);
        assert_eq!(graph.neighbors(0), &[(2, 1)]);
        assert_eq!(graph.neighbors(1), &[(3, 1)]);
        assert!(graph.is_symmetric());
    }

    #[test]
    fn test_non_manifold_edge_connects_all() {
        // three triangles hinged on the same edge
        let tris = [
            [Vec3::ZERO, Vec3::X, Vec3::Y],
            [Vec3::X, Vec3::ZERO, Vec3::Z],
            [Vec3::X, Vec3::ZERO, Vec3::NEG_Y],
        ];
        let graph = triangle_adjacency(&tris);
        assert_eq!(graph.weight(0, 1), 1);
        assert_eq!(graph.weight(0, 2), 1);
        assert_eq!(graph.weight(1, 2), 0);
    }

    #[test]
    fn test_cube_triangle_adjacency() {
        let mesh = primitives::cube();
        let graph = triangle_adjacency(&corners(&mesh));
        assert_eq!(graph.len(), 12);
        assert!(graph.is_symmetric());
        for t in 0..12 {
            assert_eq!(graph.degree(t), 3, "triangle {}", t);
        }
    }

    #[test]
    fn test_grid_triangle_adjacency() {
        let mesh = primitives::grid(2, 1);
        let graph = triangle_adjacency(&corners(&mesh));
        // quad diagonals and the shared column edge
        assert_eq!(graph.weight(0, 1), 1);
        assert_eq!(graph.weight(2, 3), 1);
        assert_eq!(graph.weight(1, 2), 1);
        assert_eq!(graph.weight(0, 3), 0);
        assert!(graph.is_symmetric());
    }

    #[test]
    fn test_fold_and_cut() {
        let mut graph = AdjacencyGraph::new(4);
        graph.add_edge(0, 1, 1);
        graph.add_edge(1, 2, 2);
        graph.add_edge(2, 3, 1);

        assert_eq!(graph.cut_weight(&[0, 0, 1, 1]), 2);
        let folded = graph.fold(&[0, 0, 1, 1], 2);
        assert_eq!(folded.weight(0, 1), 2);
        assert_eq!(folded.weight(0, 0), 1);
        assert_eq!(folded.without_self_loops().weight(0, 0), 0);
    }
}
