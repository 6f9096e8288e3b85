//! Balanced k-way graph partitioning
//!
//! The default backend is recursive bisection. Each bisection grows one side
//! greedily from a pseudo-peripheral node and then improves the cut with
//! size-preserving Kernighan-Lin swaps. Part sizes never differ by more
//! than one.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use ahash::AHashMap;

use crate::adjacency::{AdjacencyGraph, Neighbors};
use crate::error::Diagnostic;

/// Result of partitioning a graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    /// Part of every node, in `[0, part_count)`
    pub assignment: Vec<u32>,
    /// Number of parts actually produced
    pub part_count: usize,
    /// Non-fatal conditions hit while partitioning
    pub diagnostics: Vec<Diagnostic>,
}

impl Partition {
    /// Nodes of each part, ascending
    pub fn parts(&self) -> Vec<Vec<u32>> {
        let mut parts = vec![Vec::new(); self.part_count];
        for (node, &part) in self.assignment.iter().enumerate() {
            parts[part as usize].push(node as u32);
        }
        parts
    }

    /// Node count of each part
    pub fn part_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.part_count];
        for &part in &self.assignment {
            sizes[part as usize] += 1;
        }
        sizes
    }
}

/// Balanced min-cut partitioning backend
pub trait Partitioner: Send + Sync {
    /// Split the graph into `target_parts` parts of near-equal size.
    ///
    /// A target of 0 is treated as 1. A target above the node count is
    /// clamped and reported as [`Diagnostic::PartitionInfeasible`].
    fn partition(&self, graph: &AdjacencyGraph, target_parts: usize) -> Partition;
}

/// Recursive bisection with greedy growing and swap refinement
#[derive(Debug, Clone, PartialEq)]
pub struct RecursiveBisection {
    /// Best candidates per side considered for each refinement swap, 0 disables refinement
    pub swap_candidates: usize,
}

impl Default for RecursiveBisection {
    fn default() -> Self {
        Self { swap_candidates: 8 }
    }
}

impl Partitioner for RecursiveBisection {
    fn partition(&self, graph: &AdjacencyGraph, target_parts: usize) -> Partition {
        let len = graph.len();
        let mut diagnostics = Vec::new();
        if len == 0 {
            return Partition::default();
        }

        let mut parts = target_parts.max(1);
        if parts > len {
            diagnostics.push(Diagnostic::PartitionInfeasible {
                requested: target_parts,
                available: len,
            });
            parts = len;
        }

        let mut assignment = vec![0u32; len];
        let nodes: Vec<u32> = (0..len as u32).collect();
        self.split(graph, nodes, parts, 0, &mut assignment);

        Partition {
            assignment,
            part_count: parts,
            diagnostics,
        }
    }
}

impl RecursiveBisection {
    fn split(
        &self,
        graph: &AdjacencyGraph,
        nodes: Vec<u32>,
        parts: usize,
        first_part: u32,
        assignment: &mut [u32],
    ) {
        if parts <= 1 {
            for node in nodes {
                assignment[node as usize] = first_part;
            }
            return;
        }

        let left_parts = parts / 2;
        let base = nodes.len() / parts;
        let remainder = nodes.len() % parts;
        let left_size = left_parts * base + remainder.min(left_parts);

        let side = self.bisect(graph, &nodes, left_size);
        let (mut left, mut right) = (Vec::with_capacity(left_size), Vec::new());
        for (local, node) in nodes.into_iter().enumerate() {
            if side[local] {
                left.push(node);
            } else {
                right.push(node);
            }
        }

        self.split(graph, left, left_parts, first_part, assignment);
        self.split(graph, right, parts - left_parts, first_part + left_parts as u32, assignment);
    }

    /// Pick exactly `left_size` of `nodes` for the left side
    fn bisect(&self, graph: &AdjacencyGraph, nodes: &[u32], left_size: usize) -> Vec<bool> {
        if left_size == 0 || left_size >= nodes.len() {
            return vec![left_size > 0; nodes.len()];
        }

        let local = local_subgraph(graph, nodes);
        let mut left = grow(&local, left_size);
        if self.swap_candidates > 0 {
            refine(&local, &mut left, self.swap_candidates);
        }
        left
    }
}

/// Induced subgraph over `nodes`, renumbered by position, without self-loops
fn local_subgraph(graph: &AdjacencyGraph, nodes: &[u32]) -> Vec<Neighbors> {
    let local_of: AHashMap<u32, u32> = nodes
        .iter()
        .enumerate()
        .map(|(local, &node)| (node, local as u32))
        .collect();

    nodes
        .iter()
        .map(|&node| {
            graph
                .neighbors(node)
                .iter()
                .filter(|&&(n, _)| n != node)
                .filter_map(|&(n, w)| local_of.get(&n).map(|&l| (l, w)))
                .collect()
        })
        .collect()
}

/// Last node reached by a breadth-first search from `start`
fn farthest(local: &[Neighbors], start: usize) -> usize {
    let mut visited = vec![false; local.len()];
    let mut queue = VecDeque::from([start]);
    visited[start] = true;
    let mut last = start;
    while let Some(node) = queue.pop_front() {
        last = node;
        for &(n, _) in &local[node] {
            if !visited[n as usize] {
                visited[n as usize] = true;
                queue.push_back(n as usize);
            }
        }
    }
    last
}

/// Approximate end of the longest shortest path in `start`'s component
fn pseudo_peripheral(local: &[Neighbors], start: usize) -> usize {
    farthest(local, farthest(local, start))
}

/// Greedy graph growing.
///
/// The grown side always absorbs the frontier node with the heaviest
/// connection to it (lowest index on ties). An exhausted frontier means the
/// side covers whole components, so growing restarts in the next one.
fn grow(local: &[Neighbors], left_size: usize) -> Vec<bool> {
    let mut in_left = vec![false; local.len()];
    let mut gain = vec![0u32; local.len()];
    let mut frontier = BinaryHeap::new();
    let mut next_seed = 0;

    frontier.push((0u32, Reverse(pseudo_peripheral(local, 0) as u32)));

    for _ in 0..left_size {
        let node = loop {
            match frontier.pop() {
                Some((g, Reverse(n))) => {
                    let n = n as usize;
                    if !in_left[n] && gain[n] == g {
                        break n;
                    }
                }
                None => {
                    while in_left[next_seed] {
                        next_seed += 1;
                    }
                    break pseudo_peripheral(local, next_seed);
                }
            }
        };

        in_left[node] = true;
        for &(n, w) in &local[node] {
            let n = n as usize;
            if !in_left[n] {
                gain[n] += w;
                frontier.push((gain[n], Reverse(n as u32)));
            }
        }
    }

    in_left
}

/// Heap entry of the refinement: `(gain, node, version)`
type SwapCandidate = (i64, Reverse<u32>, u32);

/// External minus internal connection weight
fn swap_gain(local: &[Neighbors], left: &[bool], node: usize) -> i64 {
    local[node]
        .iter()
        .map(|&(n, w)| if left[n as usize] != left[node] { w as i64 } else { -(w as i64) })
        .sum()
}

fn pop_best(
    heap: &mut BinaryHeap<SwapCandidate>,
    count: usize,
    version: &[u32],
) -> Vec<SwapCandidate> {
    let mut best = Vec::with_capacity(count);
    while best.len() < count {
        match heap.pop() {
            Some(entry) if version[entry.1.0 as usize] == entry.2 => best.push(entry),
            Some(_) => {}
            None => break,
        }
    }
    best
}

/// Kernighan-Lin style swap refinement.
///
/// Only pairs are exchanged, so side sizes are preserved. Each accepted swap
/// strictly lowers the cut, which bounds the loop.
fn refine(local: &[Neighbors], left: &mut [bool], candidates: usize) {
    let len = local.len();
    let mut gain: Vec<i64> = (0..len).map(|n| swap_gain(local, left, n)).collect();
    let mut version = vec![0u32; len];

    // heaps[1] holds left nodes, heaps[0] right nodes
    let mut heaps = [BinaryHeap::new(), BinaryHeap::new()];
    for node in 0..len {
        heaps[left[node] as usize].push((gain[node], Reverse(node as u32), 0));
    }

    for _ in 0..len {
        let from_left = pop_best(&mut heaps[1], candidates, &version);
        let from_right = pop_best(&mut heaps[0], candidates, &version);

        let mut best: Option<(i64, usize, usize)> = None;
        for &(ga, Reverse(a), _) in &from_left {
            for &(gb, Reverse(b), _) in &from_right {
                let shared = local[a as usize]
                    .iter()
                    .find(|&&(n, _)| n == b)
                    .map_or(0, |&(_, w)| w as i64);
                let swap = ga + gb - 2 * shared;
                if swap > 0 && best.is_none_or(|(g, _, _)| swap > g) {
                    best = Some((swap, a as usize, b as usize));
                }
            }
        }

        let Some((_, a, b)) = best else {
            break;
        };

        left[a] = false;
        left[b] = true;

        let mut touched: Vec<usize> = [a, b]
            .into_iter()
            .chain(local[a].iter().chain(local[b].iter()).map(|&(n, _)| n as usize))
            .collect();
        touched.sort_unstable();
        touched.dedup();
        for &node in &touched {
            gain[node] = swap_gain(local, left, node);
            version[node] += 1;
            heaps[left[node] as usize].push((gain[node], Reverse(node as u32), version[node]));
        }

        for entry in from_left.into_iter().chain(from_right) {
            let node = entry.1.0 as usize;
            if version[node] == entry.2 {
                heaps[left[node] as usize].push(entry);
            }
        }
    }
}
