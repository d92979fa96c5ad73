use crate::common::{position_at, Path};
use crate::constraint::Constraint;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ConflictType {
    /// Both agents occupy `position` at `time_step`.
    Vertex {
        position: (usize, usize),
        time_step: usize,
    },
    /// Agent 1 moves `from -> to` while agent 2 moves `to -> from`, both arriving at `time_step`.
    Edge {
        from: (usize, usize),
        to: (usize, usize),
        time_step: usize,
    },
}

/// Agents are indices into the solver's agent list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Conflict {
    pub agent_1: usize,
    pub agent_2: usize,
    pub conflict_type: ConflictType,
}

impl Conflict {
    pub fn time_step(&self) -> usize {
        match self.conflict_type {
            ConflictType::Vertex { time_step, .. } | ConflictType::Edge { time_step, .. } => {
                time_step
            }
        }
    }

    /// One constraint per agent; every conflict-free solution satisfies at least one of them.
    pub fn constraints(&self) -> [Constraint; 2] {
        match self.conflict_type {
            ConflictType::Vertex {
                position,
                time_step,
            } => [
                Constraint::Vertex {
                    agent: self.agent_1,
                    position,
                    time_step,
                },
                Constraint::Vertex {
                    agent: self.agent_2,
                    position,
                    time_step,
                },
            ],
            ConflictType::Edge {
                from,
                to,
                time_step,
            } => [
                Constraint::Edge {
                    agent: self.agent_1,
                    from,
                    to,
                    time_step,
                },
                Constraint::Edge {
                    agent: self.agent_2,
                    from: to,
                    to: from,
                    time_step,
                },
            ],
        }
    }
}

/// All conflicts between `paths`, earliest timestep first, then by agent pair,
/// vertex before edge. Agents wait at their last cell once their path ends.
pub fn detect_conflicts(paths: &[Path]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    let max_length = paths.iter().map(Vec::len).max().unwrap_or(0);

    for step in 0..max_length {
        for i in 0..paths.len() {
            for j in (i + 1)..paths.len() {
                let (path1, path2) = (&paths[i], &paths[j]);
                let (Some(pos1), Some(pos2)) = (position_at(path1, step), position_at(path2, step))
                else {
                    continue;
                };

                // Check for Vertex Conflict
                if pos1 == pos2 {
                    conflicts.push(Conflict {
                        agent_1: i,
                        agent_2: j,
                        conflict_type: ConflictType::Vertex {
                            position: pos1,
                            time_step: step,
                        },
                    });
                    continue;
                }

                // Check for Edge Conflict, only while both agents are still moving.
                if step == 0 || step >= path1.len() || step >= path2.len() {
                    continue;
                }
                let prev_pos1 = path1[step - 1].position();
                let prev_pos2 = path2[step - 1].position();
                if prev_pos1 == pos2 && prev_pos2 == pos1 {
                    conflicts.push(Conflict {
                        agent_1: i,
                        agent_2: j,
                        conflict_type: ConflictType::Edge {
                            from: prev_pos1,
                            to: pos1,
                            time_step: step,
                        },
                    });
                }
            }
        }
    }

    conflicts
}

pub fn first_conflict(paths: &[Path]) -> Option<Conflict> {
    detect_conflicts(paths).into_iter().next()
}

pub fn count_conflicts(paths: &[Path]) -> usize {
    detect_conflicts(paths).len()
}
