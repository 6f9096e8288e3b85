//! Exact position hashing
//!
//! Positions are welded only when bit-identical (after folding -0.0 into 0.0).
//! Directed edges are keyed by the hashes of their endpoints so the opposite
//! half-edge of a shared edge can be found in O(1).

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::math::Vec3;

#[inline]
fn murmur_finalize(mut hash: u32) -> u32 {
    hash ^= hash >> 16;
    hash = hash.wrapping_mul(0x85eb_ca6b);
    hash ^= hash >> 13;
    hash = hash.wrapping_mul(0xc2b2_ae35);
    hash ^= hash >> 16;
    hash
}

#[inline]
fn murmur_mix(mut hash: u32, mut element: u32) -> u32 {
    element = element.wrapping_mul(0xcc9e_2d51);
    element = element.rotate_left(15);
    element = element.wrapping_mul(0x1b87_3593);

    hash ^= element;
    hash = hash.rotate_left(13);
    hash.wrapping_mul(5).wrapping_add(0xe654_6b64)
}

/// Murmur3-style 32-bit hash over a sequence of words
pub fn murmur32(words: &[u32]) -> u32 {
    let hash = words.iter().fold(0, |hash, &word| murmur_mix(hash, word));
    murmur_finalize(hash)
}

/// Bit pattern of a coordinate with -0.0 folded into 0.0
#[inline]
pub fn canonical_bits(value: f32) -> u32 {
    if value == 0.0 { 0 } else { value.to_bits() }
}

/// Bit-exact key of a position
#[inline]
pub fn position_key(position: Vec3) -> [u32; 3] {
    [
        canonical_bits(position.x),
        canonical_bits(position.y),
        canonical_bits(position.z),
    ]
}

/// 32-bit hash of a position
#[inline]
pub fn hash_position(position: Vec3) -> u32 {
    murmur32(&position_key(position))
}

/// 64-bit key of the directed edge `a -> b`
#[inline]
pub fn edge_key(a: Vec3, b: Vec3) -> u64 {
    let h0 = hash_position(a) as u64;
    let h1 = hash_position(b) as u64;
    h0 | (h1 << 32)
}

/// Hash table of directed edges for finding their opposite half-edges
#[derive(Debug, Default)]
pub struct PositionHashIndex {
    table: AHashMap<u64, SmallVec<[u32; 2]>>,
    edges: Vec<(Vec3, Vec3)>,
}

impl PositionHashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(edges: usize) -> Self {
        Self {
            table: AHashMap::with_capacity(edges),
            edges: Vec::with_capacity(edges),
        }
    }

    /// Insert the directed edge `a -> b` and return its id together with the
    /// ids of earlier edges running exactly `b -> a`.
    ///
    /// Hash collisions are filtered by comparing endpoint bits, so only true
    /// coincidences are reported. A non-manifold edge reports every earlier
    /// opposite edge.
    pub fn insert_edge(&mut self, a: Vec3, b: Vec3) -> (u32, SmallVec<[u32; 2]>) {
        let id = self.edges.len() as u32;
        let (ka, kb) = (position_key(a), position_key(b));

        let mut opposite = SmallVec::new();
        if let Some(candidates) = self.table.get(&edge_key(b, a)) {
            for &other in candidates {
                let (oa, ob) = self.edges[other as usize];
                if position_key(oa) == kb && position_key(ob) == ka {
                    opposite.push(other);
                }
            }
        }

        self.table.entry(edge_key(a, b)).or_default().push(id);
        self.edges.push((a, b));
        (id, opposite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_zero_hashes_like_zero() {
        let a = Vec3::new(0.0, 1.0, -0.0);
        let b = Vec3::new(-0.0, 1.0, 0.0);
        assert_eq!(position_key(a), position_key(b));
        assert_eq!(hash_position(a), hash_position(b));
    }

    #[test]
    fn test_hash_distinguishes_positions() {
        let a = hash_position(Vec3::new(1.0, 2.0, 3.0));
        let b = hash_position(Vec3::new(3.0, 2.0, 1.0));
        let c = hash_position(Vec3::new(1.0, 2.0, 3.000001));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_edge_key_is_ordered() {
        let a = Vec3::X;
        let b = Vec3::Y;
        assert_ne!(edge_key(a, b), edge_key(b, a));
        assert_eq!(edge_key(a, b) as u32, hash_position(a));
        assert_eq!((edge_key(a, b) >> 32) as u32, hash_position(b));
    }

    #[test]
    fn test_insert_finds_opposite_edge() {
        let mut index = PositionHashIndex::new();
        let (first, opposite) = index.insert_edge(Vec3::ZERO, Vec3::X);
        assert_eq!(first, 0);
        assert!(opposite.is_empty());

        // same direction is not a match
        let (_, opposite) = index.insert_edge(Vec3::ZERO, Vec3::X);
        assert!(opposite.is_empty());

        let (id, opposite) = index.insert_edge(Vec3::X, Vec3::ZERO);
        assert_eq!(id, 2);
        assert_eq!(opposite.as_slice(), &[0, 1]);
    }

    #[test]
    fn test_near_positions_do_not_weld() {
        let mut index = PositionHashIndex::new();
        index.insert_edge(Vec3::ZERO, Vec3::X);
        let (_, opposite) = index.insert_edge(Vec3::new(1.0 + f32::EPSILON, 0.0, 0.0), Vec3::ZERO);
        assert!(opposite.is_empty());
    }
}
