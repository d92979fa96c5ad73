use crate::map::Environment;

use anyhow::bail;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

/// Undirected weighted graph whose vertices are grid coordinates.
///
/// Adjacency is kept in ordered maps so neighbor order, and therefore search
/// results, do not depend on hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphMap {
    adjacency: BTreeMap<(usize, usize), BTreeMap<(usize, usize), usize>>,
}

impl GraphMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, vertex: (usize, usize)) {
        self.adjacency.entry(vertex).or_default();
    }

    /// Adds or re-weights the edge `u - v`. Both endpoints are added as vertices.
    pub fn add_edge(&mut self, u: (usize, usize), v: (usize, usize), weight: usize) -> anyhow::Result<()> {
        if u == v {
            bail!("self loop on {u:?}, waiting is implicit");
        }
        if weight == 0 {
            bail!("edge {u:?} - {v:?} must have a positive weight");
        }
        self.adjacency.entry(u).or_default().insert(v, weight);
        self.adjacency.entry(v).or_default().insert(u, weight);
        Ok(())
    }

    pub fn num_vertices(&self) -> usize {
        self.adjacency.len()
    }

    pub fn num_edges(&self) -> usize {
        self.adjacency.values().map(BTreeMap::len).sum::<usize>() / 2
    }

    pub fn vertices(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adjacency.keys().copied()
    }

    /// Every edge once, as `(u, v, weight)` with `u < v`.
    pub fn edges(&self) -> Vec<((usize, usize), (usize, usize), usize)> {
        self.adjacency
            .iter()
            .flat_map(|(&u, neighbors)| {
                neighbors
                    .iter()
                    .filter(move |&(&v, _)| u < v)
                    .map(move |(&v, &weight)| (u, v, weight))
            })
            .collect()
    }

    /// A variant over the same vertices keeping `num_edges` edges picked at random.
    pub fn sample_edges<R: Rng + ?Sized>(&self, num_edges: usize, rng: &mut R) -> anyhow::Result<GraphMap> {
        let edges = self.edges();
        if num_edges > edges.len() {
            bail!(
                "cannot sample {num_edges} edges from a graph with {} edges",
                edges.len()
            );
        }

        let mut variant = GraphMap::new();
        for vertex in self.vertices() {
            variant.add_vertex(vertex);
        }
        let chosen: BTreeSet<usize> = (0..edges.len())
            .collect::<Vec<_>>()
            .choose_multiple(rng, num_edges)
            .copied()
            .collect();
        for index in chosen {
            let (u, v, weight) = edges[index];
            variant.add_edge(u, v, weight)?;
        }
        Ok(variant)
    }
}

impl Environment for GraphMap {
    fn contains(&self, position: (usize, usize)) -> bool {
        self.adjacency.contains_key(&position)
    }

    fn neighbors(&self, position: (usize, usize)) -> Vec<((usize, usize), usize)> {
        self.adjacency
            .get(&position)
            .map(|neighbors| neighbors.iter().map(|(&v, &weight)| (v, weight)).collect())
            .unwrap_or_default()
    }

    fn edge_cost(&self, from: (usize, usize), to: (usize, usize)) -> Option<usize> {
        self.adjacency.get(&from)?.get(&to).copied()
    }
}

/// Shared test graph: a plus-shaped crossing inside a 3x3 block with six spurs.
/// 19 vertices and 22 edges.
#[cfg(test)]
pub(crate) fn crossing_graph(weight: impl Fn(usize) -> usize) -> GraphMap {
    let edges = [
        // 3x3 block around (2, 2)
        ((1, 1), (1, 2)),
        ((1, 2), (1, 3)),
        ((2, 1), (2, 2)),
        ((2, 2), (2, 3)),
        ((3, 1), (3, 2)),
        ((3, 2), (3, 3)),
        ((1, 1), (2, 1)),
        ((2, 1), (3, 1)),
        ((1, 2), (2, 2)),
        ((2, 2), (3, 2)),
        ((1, 3), (2, 3)),
        ((2, 3), (3, 3)),
        // arms of the plus
        ((2, 0), (2, 1)),
        ((2, 3), (2, 4)),
        ((0, 2), (1, 2)),
        ((3, 2), (4, 2)),
        // spurs
        ((0, 1), (1, 1)),
        ((0, 3), (1, 3)),
        ((4, 1), (3, 1)),
        ((4, 3), (3, 3)),
        ((1, 4), (2, 4)),
        ((3, 4), (2, 4)),
    ];

    let mut graph = GraphMap::new();
    for (index, &(u, v)) in edges.iter().enumerate() {
        graph
            .add_edge(u, v, weight(index))
            .expect("fixture edges are valid");
    }
    graph
}
