mod cbs;
mod conflict;
mod node;

pub use cbs::CBS;
pub use conflict::{count_conflicts, detect_conflicts, first_conflict, Conflict, ConflictType};
pub use node::{ConstraintTreeNode, CostType};

use crate::budget::Budget;
use crate::common::{Agent, Solution};
use crate::config::Config;
use crate::error::SolverFailure;
use crate::map::Environment;

pub trait Solver {
    fn solve(&mut self, config: &Config) -> Result<Solution, SolverFailure>;
}

/// Conflict-free paths for `agents` with minimal sum of costs.
///
/// Use [`CBS::with_cost_type`] to minimise the makespan instead.
pub fn solve<E: Environment + ?Sized>(
    agents: &[Agent],
    env: &E,
    budget: &Budget,
) -> Result<Solution, SolverFailure> {
    CBS::new(agents.to_vec(), env).search(budget)
}
