use crate::map::Environment;
use crate::solver::count_conflicts;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// A grid position at a discrete timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemporalGridCell {
    pub time: usize,
    pub x: usize,
    pub y: usize,
}

impl TemporalGridCell {
    pub fn new(time: usize, x: usize, y: usize) -> Self {
        TemporalGridCell { time, x, y }
    }

    pub fn at(time: usize, position: (usize, usize)) -> Self {
        TemporalGridCell {
            time,
            x: position.0,
            y: position.1,
        }
    }

    pub fn position(&self) -> (usize, usize) {
        (self.x, self.y)
    }
}

/// Cells indexed by time: `path[t].time == t`.
pub type Path = Vec<TemporalGridCell>;

/// Position of an agent at `time`. Agents stay at their last cell once the path ends.
pub(crate) fn position_at(path: &Path, time: usize) -> Option<(usize, usize)> {
    path.get(time)
        .or_else(|| path.last())
        .map(TemporalGridCell::position)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: usize,
    pub start: (usize, usize),
    pub goal: (usize, usize),
}

impl Agent {
    pub fn verify<E: Environment + ?Sized>(&self, env: &E) -> bool {
        env.contains(self.start) && env.contains(self.goal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// Keyed by agent id.
    pub paths: BTreeMap<usize, Path>,
    /// Per-agent path costs combined by the solver's cost type.
    pub cost: usize,
}

impl Solution {
    /// Re-checks a solution from scratch: endpoints, timestamps, moves and conflicts.
    pub fn verify<E: Environment + ?Sized>(&self, env: &E, agents: &[Agent]) -> bool {
        if self.paths.len() != agents.len() {
            warn!("solution has {} paths for {} agents", self.paths.len(), agents.len());
            return false;
        }

        let mut ordered = Vec::with_capacity(agents.len());
        let mut seen = HashSet::new();
        for agent in agents {
            let Some(path) = self.paths.get(&agent.id) else {
                warn!("agent {} has no path", agent.id);
                return false;
            };
            if !seen.insert(agent.id) {
                warn!("agent {} listed twice", agent.id);
                return false;
            }

            match (path.first(), path.last()) {
                (Some(first), Some(last))
                    if first.position() == agent.start && last.position() == agent.goal => {}
                _ => {
                    warn!("agent {} path does not connect start and goal", agent.id);
                    return false;
                }
            }

            for (time, cell) in path.iter().enumerate() {
                if cell.time != time || !env.contains(cell.position()) {
                    warn!("agent {} has an invalid cell {cell:?}", agent.id);
                    return false;
                }
            }

            for step in path.windows(2) {
                let (from, to) = (step[0].position(), step[1].position());
                if from != to && env.edge_cost(from, to).is_none() {
                    warn!("agent {} moves along a missing edge {from:?} -> {to:?}", agent.id);
                    return false;
                }
            }
            ordered.push(path.clone());
        }

        let conflicts = count_conflicts(&ordered);
        if conflicts > 0 {
            warn!("solution still has {conflicts} conflicts");
            return false;
        }
        true
    }

    pub fn makespan(&self) -> usize {
        self.paths
            .values()
            .map(|path| path.len().saturating_sub(1))
            .max()
            .unwrap_or(0)
    }
}
