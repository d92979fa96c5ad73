use super::conflict::{detect_conflicts, Conflict};
use crate::algorithm::LowLevelSolution;
use crate::common::Path;
use crate::constraint::{Constraint, ConstraintSet};
use crate::error::SearchError;
use crate::queue::Prioritized;

use clap::ValueEnum;
use serde::Deserialize;

/// How the per-agent costs of a node add up to the node cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CostType {
    #[default]
    SumOfCosts,
    /// Largest single-agent cost.
    Makespan,
}

impl CostType {
    pub fn combine(&self, costs: &[usize]) -> usize {
        match self {
            CostType::SumOfCosts => costs.iter().sum(),
            CostType::Makespan => costs.iter().copied().max().unwrap_or(0),
        }
    }
}

/// Node of the constraint tree: one constraint set and one path per agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintTreeNode {
    pub constraints: Vec<ConstraintSet>,
    pub paths: Vec<Path>,
    pub costs: Vec<usize>,
    /// `costs` combined by `cost_type`.
    pub cost: usize,
    pub cost_type: CostType,
    pub conflicts: Vec<Conflict>,
    pub depth: usize,
}

impl Prioritized for ConstraintTreeNode {
    // Lowest cost first, fewer conflicts on equal cost.
    type Priority = (usize, usize);

    fn priority(&self) -> Self::Priority {
        (self.cost, self.conflicts.len())
    }
}

impl ConstraintTreeNode {
    /// Root node from unconstrained low-level solutions, in agent order.
    pub fn root(solutions: Vec<LowLevelSolution>, cost_type: CostType) -> Self {
        let constraints = (0..solutions.len()).map(ConstraintSet::new).collect();
        let (paths, costs): (Vec<_>, Vec<_>) = solutions
            .into_iter()
            .map(|solution| (solution.path, solution.cost))
            .unzip();
        let conflicts = detect_conflicts(&paths);

        ConstraintTreeNode {
            constraints,
            cost: cost_type.combine(&costs),
            cost_type,
            paths,
            costs,
            conflicts,
            depth: 0,
        }
    }

    pub fn first_conflict(&self) -> Option<&Conflict> {
        self.conflicts.first()
    }

    /// Child with `constraint` added and its agent replanned by `replan`.
    ///
    /// `Ok(None)` when the agent has no path left under the new constraints.
    pub fn branch<F>(&self, constraint: Constraint, replan: F) -> Result<Option<Self>, SearchError>
    where
        F: FnOnce(&ConstraintSet) -> Result<LowLevelSolution, SearchError>,
    {
        let agent = constraint.agent();
        let mut constraints = self.constraints.clone();
        constraints[agent].insert(constraint);

        let solution = match replan(&constraints[agent]) {
            Ok(solution) => solution,
            Err(SearchError::NoPathFound) => return Ok(None),
            Err(err) => return Err(err),
        };

        let mut paths = self.paths.clone();
        let mut costs = self.costs.clone();
        paths[agent] = solution.path;
        costs[agent] = solution.cost;
        let conflicts = detect_conflicts(&paths);

        Ok(Some(ConstraintTreeNode {
            constraints,
            cost: self.cost_type.combine(&costs),
            cost_type: self.cost_type,
            paths,
            costs,
            conflicts,
            depth: self.depth + 1,
        }))
    }
}
