//! Random tree generation by preferential attachment
//!
//! Nodes are added one at a time and attach to an existing node chosen with
//! probability proportional to its current degree. Starting from a single
//! root this always yields a tree: `n - 1` edges, connected and acyclic.
//!
//! The result is stored the way the force kernel consumes it: a flattened
//! neighbor array with one contiguous `(start, count)` range per node, plus
//! the edge endpoints in generation order for line drawing.

use bytemuck::{Pod, Zeroable};
use rand::Rng;
use tracing::debug;

use crate::error::{LayoutError, Result};

/// A node's slice of the flattened neighbor array.
///
/// Layout matches `vec2<u32>` in WGSL for direct buffer upload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct AdjacencyRange {
    /// Offset of the first neighbor
    pub start: u32,
    /// Number of neighbors
    pub count: u32,
}

impl AdjacencyRange {
    /// Create a new range
    pub fn new(start: u32, count: u32) -> Self {
        Self { start, count }
    }

    /// The range as `usize` bounds into the neighbor array
    pub fn as_range(&self) -> std::ops::Range<usize> {
        let start = self.start as usize;
        start..start + self.count as usize
    }
}

/// Immutable topology of a preferential-attachment tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentTree {
    adjacency: Vec<AdjacencyRange>,
    neighbors: Vec<u32>,
    line_pairs: Vec<u32>,
}

impl AttachmentTree {
    /// Grow a tree of `n` nodes from root 0.
    ///
    /// The attachment pool starts as `[0]`. Each new node `i` picks a uniform
    /// element `j` of the pool, records the edge `(i, j)` and pushes both
    /// endpoints, so every node appears in the pool once per incident edge
    /// (the root once more).
    ///
    /// Each node lists its parent first, then its children in attachment order.
    pub fn generate<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<Self> {
        if n < 1 {
            return Err(LayoutError::Configuration(format!(
                "node count must be at least 1, got {n}"
            )));
        }
        if u32::try_from(n).is_err() {
            return Err(LayoutError::Configuration(format!(
                "node count {n} does not fit in a u32 index"
            )));
        }

        let mut pool: Vec<u32> = Vec::with_capacity(2 * n - 1);
        pool.push(0);
        let mut lists: Vec<Vec<u32>> = vec![Vec::new(); n];
        let mut line_pairs = Vec::with_capacity(2 * (n - 1));

        for i in 1..n as u32 {
            let j = pool[rng.gen_range(0..pool.len())];
            line_pairs.push(i);
            line_pairs.push(j);
            pool.push(i);
            pool.push(j);
            lists[i as usize].push(j);
            lists[j as usize].push(i);
        }

        let mut adjacency = Vec::with_capacity(n);
        let mut neighbors = Vec::with_capacity(2 * (n - 1));
        for list in &lists {
            adjacency.push(AdjacencyRange::new(
                neighbors.len() as u32,
                list.len() as u32,
            ));
            neighbors.extend_from_slice(list);
        }

        debug!(nodes = n, edges = n - 1, "attachment tree generated");

        Ok(Self {
            adjacency,
            neighbors,
            line_pairs,
        })
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of undirected edges (always `node_count - 1`)
    pub fn edge_count(&self) -> usize {
        self.line_pairs.len() / 2
    }

    /// Per-node ranges into [`Self::neighbors`]
    pub fn adjacency(&self) -> &[AdjacencyRange] {
        &self.adjacency
    }

    /// Flattened neighbor array, `2 * edge_count` entries
    pub fn neighbors(&self) -> &[u32] {
        &self.neighbors
    }

    /// Edge endpoints `(i, j)` flattened in generation order, for line drawing
    pub fn line_pairs(&self) -> &[u32] {
        &self.line_pairs
    }

    /// Neighbors of one node
    pub fn neighbors_of(&self, idx: usize) -> &[u32] {
        &self.neighbors[self.adjacency[idx].as_range()]
    }

    /// Degree of one node
    pub fn degree(&self, idx: usize) -> usize {
        self.adjacency[idx].count as usize
    }

    /// Edges as `(new node, attached-to node)` in generation order
    pub fn edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.line_pairs.chunks_exact(2).map(|pair| (pair[0], pair[1]))
    }
}
