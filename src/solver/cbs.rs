use super::node::{ConstraintTreeNode, CostType};
use super::{Conflict, Solver};
use crate::algorithm::{a_star_search, LowLevelSolution};
use crate::budget::{Budget, Deadline, TimeKeeper};
use crate::common::{Agent, Solution};
use crate::config::Config;
use crate::constraint::{Constraint, ConstraintSet};
use crate::error::{BestEffort, SearchError, SolverFailure};
use crate::map::{Environment, HeuristicTable};
use crate::queue::MutablePriorityQueue;
use crate::stat::{SearchStatistics, Stats};

use std::collections::HashSet;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

const PLANNING: &str = "planning";
const LOW_LEVEL: &str = "low_level";

type Child = (Result<Option<ConstraintTreeNode>, SearchError>, SearchStatistics);

/// Conflict-Based Search: best-first search over a binary constraint tree,
/// replanning one agent per branch with the space-time A*.
pub struct CBS<'a, E: ?Sized> {
    agents: Vec<Agent>,
    env: &'a E,
    heuristics: Vec<HeuristicTable>,
    cost_type: CostType,
    parallel_branching: bool,
    stats: Stats,
    time_keeper: TimeKeeper,
}

impl<'a, E: Environment + ?Sized> CBS<'a, E> {
    pub fn new(agents: Vec<Agent>, env: &'a E) -> Self {
        let heuristics = agents
            .iter()
            .map(|agent| HeuristicTable::new(env, agent.goal))
            .collect();
        CBS {
            agents,
            env,
            heuristics,
            cost_type: CostType::default(),
            parallel_branching: false,
            stats: Stats::default(),
            time_keeper: TimeKeeper::new(),
        }
    }

    /// Build the two children of every expansion on two threads.
    pub fn with_parallel_branching(mut self, parallel_branching: bool) -> Self {
        self.parallel_branching = parallel_branching;
        self
    }

    pub fn with_cost_type(mut self, cost_type: CostType) -> Self {
        self.cost_type = cost_type;
        self
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Statistics of the last search.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn time_keeper(&self) -> &TimeKeeper {
        &self.time_keeper
    }

    #[instrument(skip_all, name = "cbs", fields(agents = self.agents.len()))]
    pub fn search(&mut self, budget: &Budget) -> Result<Solution, SolverFailure> {
        self.stats = Stats::default();
        self.time_keeper.reset_all();

        self.time_keeper.start(PLANNING);
        let result = self.run(budget);
        let elapsed = self.time_keeper.stop(PLANNING);

        self.stats.low_level_time = self.time_keeper.elapsed(LOW_LEVEL).unwrap_or_default();
        self.stats
            .finalize(elapsed, result.as_ref().ok().map(|solution| solution.cost));
        self.stats.print();

        match &result {
            Ok(solution) => info!("solution found with cost {}", solution.cost),
            Err(err) => warn!("cbs failed: {err}"),
        }
        result
    }

    fn run(&mut self, budget: &Budget) -> Result<Solution, SolverFailure> {
        self.validate()?;
        let deadline = budget.deadline_from(Instant::now());

        let root = self.plan_root(deadline)?;
        self.stats.record_generation();
        debug!("root: cost {} conflicts {}", root.cost, root.conflicts.len());

        let mut best = root.clone();
        let mut open = MutablePriorityQueue::new();
        let mut next_key = 0usize;
        open.insert(next_key, root)
            .map_err(|err| SolverFailure::Search(err.into()))?;

        loop {
            if deadline.expired() || budget.expansions_exhausted(self.stats.high_level.nodes_expanded)
            {
                warn!("budget exceeded after {} expansions", self.stats.high_level.nodes_expanded);
                return Err(self.budget_exceeded(Some(best)));
            }

            let Ok((_, current)) = open.pop_min() else {
                break;
            };

            let Some(&conflict) = current.first_conflict() else {
                return Ok(self.to_solution(&current));
            };
            self.stats.record_expansion();
            debug!(
                "expand: cost {} depth {} conflict {conflict:?}",
                current.cost, current.depth
            );

            self.time_keeper.start(LOW_LEVEL);
            let children = self.branch(&current, &conflict, deadline);
            self.time_keeper.stop(LOW_LEVEL);

            for (child, search_stats) in children {
                self.stats.record_generation();
                self.stats.record_low_level(&search_stats);
                if child.is_ok() {
                    self.stats.record_evaluation();
                }
                match child {
                    Ok(Some(child)) => {
                        debug_assert!(child.cost >= current.cost, "child cheaper than its parent");
                        if (child.conflicts.len(), child.cost) < (best.conflicts.len(), best.cost) {
                            best = child.clone();
                        }
                        next_key += 1;
                        open.insert(next_key, child)
                            .map_err(|err| SolverFailure::Search(err.into()))?;
                    }
                    Ok(None) => debug!("branch pruned: no path under its constraints"),
                    Err(SearchError::BudgetExceeded) => {
                        warn!("budget exceeded during low-level search");
                        return Err(self.budget_exceeded(Some(best)));
                    }
                    Err(err) => return Err(SolverFailure::Search(err)),
                }
            }
        }

        Err(SolverFailure::NoSolutionFound)
    }

    fn validate(&self) -> Result<(), SolverFailure> {
        if self.agents.is_empty() {
            return Err(SolverFailure::InvalidInput("no agents".to_string()));
        }

        let mut ids = HashSet::new();
        let mut starts = HashSet::new();
        let mut goals = HashSet::new();
        for agent in &self.agents {
            if !self.env.contains(agent.start) || !self.env.contains(agent.goal) {
                return Err(SolverFailure::InvalidInput(format!(
                    "agent {} starts or ends outside the environment",
                    agent.id
                )));
            }
            if !ids.insert(agent.id) {
                return Err(SolverFailure::InvalidInput(format!(
                    "agent id {} is used twice",
                    agent.id
                )));
            }
            if !starts.insert(agent.start) {
                return Err(SolverFailure::InvalidInput(format!(
                    "start {:?} is shared by several agents",
                    agent.start
                )));
            }
            if !goals.insert(agent.goal) {
                return Err(SolverFailure::InvalidInput(format!(
                    "goal {:?} is shared by several agents",
                    agent.goal
                )));
            }
        }
        Ok(())
    }

    fn plan(
        &self,
        agent: usize,
        constraints: &ConstraintSet,
        deadline: Deadline,
        stats: &mut SearchStatistics,
    ) -> Result<LowLevelSolution, SearchError> {
        a_star_search(
            self.env,
            &self.agents[agent],
            &self.heuristics[agent],
            constraints,
            deadline,
            stats,
        )
    }

    fn plan_root(&mut self, deadline: Deadline) -> Result<ConstraintTreeNode, SolverFailure> {
        self.time_keeper.start(LOW_LEVEL);
        let mut solutions = Vec::with_capacity(self.agents.len());
        let mut failure = None;
        for agent in 0..self.agents.len() {
            let mut search_stats = SearchStatistics::default();
            let result = self.plan(agent, &ConstraintSet::new(agent), deadline, &mut search_stats);
            self.stats.record_low_level(&search_stats);
            match result {
                Ok(solution) => solutions.push(solution),
                Err(err) => {
                    failure = Some((agent, err));
                    break;
                }
            }
        }
        self.time_keeper.stop(LOW_LEVEL);

        match failure {
            None => Ok(ConstraintTreeNode::root(solutions, self.cost_type)),
            Some((agent, SearchError::NoPathFound)) => {
                debug!("agent {} cannot reach its goal", self.agents[agent].id);
                Err(SolverFailure::NoSolutionFound)
            }
            Some((_, SearchError::BudgetExceeded)) => Err(self.budget_exceeded(None)),
            Some((_, err)) => Err(SolverFailure::Search(err)),
        }
    }

    fn branch(&self, node: &ConstraintTreeNode, conflict: &Conflict, deadline: Deadline) -> [Child; 2] {
        let [first, second] = conflict.constraints();
        let build = |constraint: Constraint| -> Child {
            let agent = constraint.agent();
            let mut search_stats = SearchStatistics::default();
            let child = node.branch(constraint, |constraints| {
                self.plan(agent, constraints, deadline, &mut search_stats)
            });
            (child, search_stats)
        };

        if self.parallel_branching {
            thread::scope(|scope| {
                let handle = scope.spawn(|| build(first));
                let second = build(second);
                let first = handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload));
                [first, second]
            })
        } else {
            [build(first), build(second)]
        }
    }

    fn to_solution(&self, node: &ConstraintTreeNode) -> Solution {
        Solution {
            paths: self
                .agents
                .iter()
                .zip(&node.paths)
                .map(|(agent, path)| (agent.id, path.clone()))
                .collect(),
            cost: node.cost,
        }
    }

    fn budget_exceeded(&self, best: Option<ConstraintTreeNode>) -> SolverFailure {
        SolverFailure::BudgetExceeded {
            best: best.map(|node| {
                Box::new(BestEffort {
                    solution: self.to_solution(&node),
                    remaining_conflicts: node.conflicts.len(),
                })
            }),
        }
    }
}

impl<E: Environment + ?Sized> Solver for CBS<'_, E> {
    fn solve(&mut self, config: &Config) -> Result<Solution, SolverFailure> {
        self.parallel_branching = config.parallel_branching;
        self.cost_type = config.cost_type;
        self.search(&config.budget())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::crossing_graph;
    use crate::map::GridMap;

    // Helper function to setup tracing
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();
    }

    fn agent(id: usize, start: (usize, usize), goal: (usize, usize)) -> Agent {
        Agent { id, start, goal }
    }

    #[test]
    fn test_single_agent() {
        init_tracing();
        let map = GridMap::from_file("map_file/test/test.map").unwrap();
        let agents = vec![agent(0, (0, 0), (2, 2))];
        let mut solver = CBS::new(agents.clone(), &map);

        let solution = solver.search(&Budget::unlimited()).unwrap();
        assert_eq!(solution.cost, 4);
        assert!(solution.verify(&map, &agents));
        assert_eq!(solver.stats().high_level.nodes_generated, 1);
        assert_eq!(solver.stats().high_level.nodes_expanded, 0);
        assert_eq!(solver.stats().high_level.nodes_evaluated, 0);
        assert_eq!(solver.stats().low_level_searches, 1);
    }

    #[test]
    fn test_agents_crossing_at_one_cell() {
        init_tracing();
        let graph = crossing_graph(|_| 1);
        assert_eq!(graph.num_vertices(), 19);
        assert_eq!(graph.num_edges(), 22);
        let agents = vec![agent(0, (2, 0), (2, 4)), agent(1, (0, 2), (4, 2))];

        let mut solver = CBS::new(agents.clone(), &graph);
        let solution = solver.search(&Budget::unlimited()).unwrap();
        assert!(solution.verify(&graph, &agents));

        let path_costs: Vec<usize> = solution
            .paths
            .values()
            .map(|path| path.len() - 1)
            .collect();
        assert!(path_costs.iter().all(|&cost| cost >= 4));
        assert!(path_costs.iter().any(|&cost| cost > 4));
        assert_eq!(solution.cost, 9);
        assert!(solver.stats().high_level.nodes_expanded >= 1);
        // The root is generated without an evaluation, every child after its replan.
        let high_level = solver.stats().high_level;
        assert_eq!(high_level.nodes_evaluated, 2 * high_level.nodes_expanded);
        assert_eq!(high_level.nodes_generated, high_level.nodes_evaluated + 1);
    }

    #[test]
    fn test_makespan_cost() {
        init_tracing();
        let graph = crossing_graph(|_| 1);
        let agents = vec![agent(0, (2, 0), (2, 4)), agent(1, (0, 2), (4, 2))];

        let mut solver = CBS::new(agents.clone(), &graph).with_cost_type(CostType::Makespan);
        let solution = solver.search(&Budget::unlimited()).unwrap();
        assert!(solution.verify(&graph, &agents));
        // One agent yields a timestep, the longer path sets the makespan.
        assert_eq!(solution.cost, 5);
        assert_eq!(solution.cost, solution.makespan());
    }

    #[test]
    fn test_default_config_stops_on_infeasible_instance() {
        let map = GridMap::new(1, 2, &[]);
        let agents = vec![agent(0, (0, 0), (0, 1)), agent(1, (0, 1), (0, 0))];
        let config = Config::default();
        assert_ne!(config.budget(), Budget::unlimited());

        let result = CBS::new(agents, &map).solve(&config);
        assert!(matches!(
            result,
            Err(SolverFailure::BudgetExceeded { best: Some(_) })
        ));
    }

    #[test]
    fn test_swapping_agents_use_a_pocket() {
        init_tracing();
        // A corridor (0, 0) - (0, 1) - (0, 2) with a pocket below its middle.
        let map = GridMap::new(2, 3, &[(1, 0), (1, 2)]);
        let agents = vec![agent(0, (0, 0), (0, 2)), agent(1, (0, 2), (0, 0))];

        let mut solver = CBS::new(agents.clone(), &map);
        let solution = solver.search(&Budget::unlimited()).unwrap();
        assert!(solution.verify(&map, &agents));
        // Unconstrained costs are 2 + 2; someone has to step aside.
        assert!(solution.cost > 4);
    }

    #[test]
    fn test_open_map_with_several_agents() {
        init_tracing();
        let map = GridMap::from_file("map_file/test/open.map").unwrap();
        let agents = vec![
            agent(0, (0, 0), (3, 4)),
            agent(1, (2, 0), (2, 4)),
            agent(2, (0, 4), (3, 0)),
        ];

        let mut solver = CBS::new(agents.clone(), &map);
        let solution = solver.search(&Budget::unlimited()).unwrap();
        assert!(solution.verify(&map, &agents));
        assert_eq!(solution.paths.len(), 3);
        assert!(solution.cost >= 7 + 4 + 7);

        let report = solver.stats().to_report();
        assert_eq!(report.solution_cost, Some(solution.cost));
    }

    #[test]
    fn test_parallel_branching_matches_sequential() {
        let map = GridMap::from_file("map_file/test/open.map").unwrap();
        let agents = vec![
            agent(0, (0, 0), (0, 4)),
            agent(1, (0, 4), (0, 0)),
            agent(2, (2, 0), (2, 4)),
        ];

        let sequential = CBS::new(agents.clone(), &map)
            .search(&Budget::unlimited())
            .unwrap();
        let parallel = CBS::new(agents.clone(), &map)
            .with_parallel_branching(true)
            .search(&Budget::unlimited())
            .unwrap();
        assert!(parallel.verify(&map, &agents));
        assert_eq!(sequential.cost, parallel.cost);
    }

    #[test]
    fn test_invalid_input() {
        let map = GridMap::from_file("map_file/test/test.map").unwrap();

        let empty = CBS::new(Vec::new(), &map).search(&Budget::unlimited());
        assert!(matches!(empty, Err(SolverFailure::InvalidInput(_))));

        let same_goal = vec![agent(0, (0, 0), (2, 2)), agent(1, (0, 2), (2, 2))];
        let result = CBS::new(same_goal, &map).search(&Budget::unlimited());
        assert!(matches!(result, Err(SolverFailure::InvalidInput(_))));

        let same_start = vec![agent(0, (0, 0), (2, 2)), agent(1, (0, 0), (2, 0))];
        let result = CBS::new(same_start, &map).search(&Budget::unlimited());
        assert!(matches!(result, Err(SolverFailure::InvalidInput(_))));

        let on_obstacle = vec![agent(0, (1, 1), (2, 2))];
        let result = CBS::new(on_obstacle, &map).search(&Budget::unlimited());
        assert!(matches!(result, Err(SolverFailure::InvalidInput(_))));

        let outside = vec![agent(0, (0, 0), (9, 9))];
        let result = CBS::new(outside, &map).search(&Budget::unlimited());
        assert!(matches!(result, Err(SolverFailure::InvalidInput(_))));
    }

    #[test]
    fn test_unreachable_goal() {
        let map = GridMap::new(1, 3, &[(0, 1)]);
        let agents = vec![agent(0, (0, 0), (0, 2))];
        let result = CBS::new(agents, &map).search(&Budget::unlimited());
        assert_eq!(result, Err(SolverFailure::NoSolutionFound));
    }

    #[test]
    fn test_budget_exceeded_keeps_best_effort() {
        init_tracing();
        // Two agents swapping in a two-cell corridor can never pass each other.
        let map = GridMap::new(1, 2, &[]);
        let agents = vec![agent(0, (0, 0), (0, 1)), agent(1, (0, 1), (0, 0))];

        let mut solver = CBS::new(agents, &map);
        let result = solver.search(&Budget::unlimited().with_max_expansions(8));
        let Err(SolverFailure::BudgetExceeded { best: Some(best) }) = result else {
            panic!("expected a best-effort result, got {result:?}");
        };
        assert!(best.remaining_conflicts > 0);
        assert_eq!(best.solution.paths.len(), 2);
        assert_eq!(solver.stats().high_level.nodes_expanded, 8);
        assert_eq!(solver.stats().costs, None);
    }

    #[test]
    fn test_zero_time_limit() {
        let map = GridMap::from_file("map_file/test/open.map").unwrap();
        let agents = vec![agent(0, (0, 0), (0, 4)), agent(1, (0, 4), (0, 0))];
        let budget = Budget::unlimited().with_time_limit(std::time::Duration::ZERO);
        let result = CBS::new(agents, &map).search(&budget);
        assert!(matches!(result, Err(SolverFailure::BudgetExceeded { .. })));
    }

    #[test]
    fn test_solve_through_config() {
        let map = GridMap::from_file("map_file/test/open.map").unwrap();
        let agents = vec![agent(0, (0, 0), (0, 4)), agent(1, (0, 4), (0, 0))];
        let config = Config {
            parallel_branching: true,
            max_expansions: Some(10_000),
            ..Config::default()
        };

        let mut solver = CBS::new(agents.clone(), &map);
        let solution = solver.solve(&config).unwrap();
        assert!(solution.verify(&map, &agents));
    }
}
