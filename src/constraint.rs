use crate::common::TemporalGridCell;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A restriction placed on one agent at one timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Constraint {
    /// The agent may not occupy `position` at `time_step`.
    Vertex {
        agent: usize,
        position: (usize, usize),
        time_step: usize,
    },
    /// The agent may not traverse `from -> to` arriving at `time_step`.
    Edge {
        agent: usize,
        from: (usize, usize),
        to: (usize, usize),
        time_step: usize,
    },
}

impl Constraint {
    pub fn agent(&self) -> usize {
        match *self {
            Constraint::Vertex { agent, .. } | Constraint::Edge { agent, .. } => agent,
        }
    }

    pub fn time_step(&self) -> usize {
        match *self {
            Constraint::Vertex { time_step, .. } | Constraint::Edge { time_step, .. } => time_step,
        }
    }
}

/// All constraints of a single agent, indexed for the low-level pruning checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    agent: usize,
    vertices: HashSet<TemporalGridCell>,
    // Stored with the endpoints ordered, edge constraints match both directions.
    edges: HashSet<(usize, (usize, usize), (usize, usize))>,
    // Latest vertex constraint time per cell.
    latest_vertex: HashMap<(usize, usize), usize>,
    max_time_step: Option<usize>,
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new(agent: usize) -> Self {
        ConstraintSet {
            agent,
            ..Default::default()
        }
    }

    pub fn agent(&self) -> usize {
        self.agent
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    /// Returns `false` if the constraint was already present.
    ///
    /// Constraints addressed to another agent are a caller bug.
    pub fn insert(&mut self, constraint: Constraint) -> bool {
        debug_assert_eq!(constraint.agent(), self.agent, "constraint for the wrong agent");

        let inserted = match constraint {
            Constraint::Vertex {
                position,
                time_step,
                ..
            } => {
                let inserted = self.vertices.insert(TemporalGridCell::at(time_step, position));
                if inserted {
                    let latest = self.latest_vertex.entry(position).or_insert(time_step);
                    *latest = (*latest).max(time_step);
                }
                inserted
            }
            Constraint::Edge {
                from, to, time_step, ..
            } => self.edges.insert(Self::edge_key(time_step, from, to)),
        };

        if inserted {
            self.max_time_step = Some(self.max_time_step.map_or(constraint.time_step(), |max| {
                max.max(constraint.time_step())
            }));
            self.constraints.push(constraint);
        }
        inserted
    }

    pub fn contains(&self, constraint: &Constraint) -> bool {
        self.constraints.contains(constraint)
    }

    pub fn violates_vertex(&self, cell: &TemporalGridCell) -> bool {
        self.vertices.contains(cell)
    }

    /// Either direction of the edge is forbidden: a swap is symmetric.
    pub fn violates_edge(&self, time_step: usize, from: (usize, usize), to: (usize, usize)) -> bool {
        !self.edges.is_empty() && self.edges.contains(&Self::edge_key(time_step, from, to))
    }

    /// Latest timestep with a vertex constraint on `position`.
    pub fn latest_vertex_time(&self, position: (usize, usize)) -> Option<usize> {
        self.latest_vertex.get(&position).copied()
    }

    /// Latest timestep of any constraint; after it the agent is unconstrained.
    pub fn max_time_step(&self) -> Option<usize> {
        self.max_time_step
    }

    /// Whether a path, indexed by time, breaks any constraint of this set.
    pub fn is_violated_by(&self, path: &[TemporalGridCell]) -> bool {
        path.iter().any(|cell| self.violates_vertex(cell))
            || path
                .windows(2)
                .any(|step| self.violates_edge(step[1].time, step[0].position(), step[1].position()))
    }

    fn edge_key(
        time_step: usize,
        a: (usize, usize),
        b: (usize, usize),
    ) -> (usize, (usize, usize), (usize, usize)) {
        if a <= b {
            (time_step, a, b)
        } else {
            (time_step, b, a)
        }
    }
}
