//! Adjacency builder: edge list → neighbor map
//!
//! A pure, stateless helper served on its own channel, independent of the
//! layout engine's lifecycle. Edges are treated as undirected and duplicate
//! edges are idempotent.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// An undirected edge between two node indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
}

/// Request on the adjacency channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborRequest {
    pub edges: Vec<Edge>,
}

/// Response on the adjacency channel
///
/// Neighbor lists are sorted so the wire output is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborResponse {
    pub neighbours: HashMap<usize, Vec<usize>>,
}

impl NeighborResponse {
    /// Answer a request by computing the neighbor map
    pub fn for_request(request: &NeighborRequest) -> Self {
        let neighbours = compute_neighbors(&request.edges)
            .into_iter()
            .map(|(node, set)| {
                let mut sorted: Vec<usize> = set.into_iter().collect();
                sorted.sort_unstable();
                (node, sorted)
            })
            .collect();
        Self { neighbours }
    }
}

/// Build the neighbor map for an edge list: for every edge, target joins
/// source's neighbor set and vice versa
pub fn compute_neighbors(edges: &[Edge]) -> HashMap<usize, HashSet<usize>> {
    let mut neighbors: HashMap<usize, HashSet<usize>> = HashMap::new();
    for edge in edges {
        neighbors.entry(edge.source).or_default().insert(edge.target);
        neighbors.entry(edge.target).or_default().insert(edge.source);
    }
    neighbors
}
