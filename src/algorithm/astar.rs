use crate::budget::Deadline;
use crate::common::{Agent, Path, TemporalGridCell};
use crate::constraint::ConstraintSet;
use crate::error::SearchError;
use crate::map::{Environment, HeuristicTable};
use crate::search::{best_first_search, PruningMethod, SearchNode, SearchProblem};
use crate::stat::SearchStatistics;

use tracing::{debug, instrument};

/// Cost of staying in place for one timestep.
pub const WAIT_COST: usize = 1;

/// Low-level search node: a temporal cell, its cost-to-come and its predecessor handle.
pub type TemporalGridCellNode = SearchNode<TemporalGridCell>;

/// Prunes cells and moves that break the agent's constraints.
#[derive(Debug, Clone, Copy)]
pub struct PruneConstraints<'a> {
    constraints: &'a ConstraintSet,
}

impl<'a> PruneConstraints<'a> {
    pub fn new(constraints: &'a ConstraintSet) -> Self {
        PruneConstraints { constraints }
    }
}

impl PruningMethod<TemporalGridCell> for PruneConstraints<'_> {
    fn should_prune(&self, candidate: &TemporalGridCell, predecessor: Option<&TemporalGridCell>) -> bool {
        if self.constraints.violates_vertex(candidate) {
            return true;
        }
        match predecessor {
            Some(previous) if previous.position() != candidate.position() => {
                self.constraints
                    .violates_edge(candidate.time, previous.position(), candidate.position())
            }
            _ => false,
        }
    }
}

/// Prunes cells outside the environment and moves along missing edges.
#[derive(Debug, Clone, Copy)]
pub struct PruneInvalidMoves<'a, E: ?Sized> {
    env: &'a E,
}

impl<'a, E: Environment + ?Sized> PruneInvalidMoves<'a, E> {
    pub fn new(env: &'a E) -> Self {
        PruneInvalidMoves { env }
    }
}

impl<E: Environment + ?Sized> PruningMethod<TemporalGridCell> for PruneInvalidMoves<'_, E> {
    fn should_prune(&self, candidate: &TemporalGridCell, predecessor: Option<&TemporalGridCell>) -> bool {
        if !self.env.contains(candidate.position()) {
            return true;
        }
        match predecessor {
            Some(previous) if previous.position() != candidate.position() => self
                .env
                .edge_cost(previous.position(), candidate.position())
                .is_none(),
            _ => false,
        }
    }
}

/// Single-agent search through `(t, x, y)` space.
///
/// Past the latest constraint timestep nothing can be pruned any more, so time
/// stops advancing there (`horizon`) and the state space stays finite.
pub struct SpaceTimeProblem<'a, E: ?Sized> {
    env: &'a E,
    start: (usize, usize),
    goal: (usize, usize),
    heuristic: &'a HeuristicTable,
    horizon: usize,
    // The goal is only final once no vertex constraint on it is left.
    goal_blocked_until: Option<usize>,
}

impl<'a, E: Environment + ?Sized> SpaceTimeProblem<'a, E> {
    pub fn new(
        env: &'a E,
        agent: &Agent,
        heuristic: &'a HeuristicTable,
        constraints: &ConstraintSet,
    ) -> Self {
        debug_assert_eq!(heuristic.goal(), agent.goal, "heuristic built for another goal");
        SpaceTimeProblem {
            env,
            start: agent.start,
            goal: agent.goal,
            heuristic,
            horizon: constraints.max_time_step().map_or(0, |time_step| time_step + 1),
            goal_blocked_until: constraints.latest_vertex_time(agent.goal),
        }
    }
}

impl<E: Environment + ?Sized> SearchProblem for SpaceTimeProblem<'_, E> {
    type State = TemporalGridCell;

    fn initial_state(&self) -> TemporalGridCell {
        TemporalGridCell::at(0, self.start)
    }

    fn successors(&self, state: &TemporalGridCell) -> Vec<(TemporalGridCell, usize)> {
        let next_time = (state.time + 1).min(self.horizon);
        let position = state.position();

        let mut successors: Vec<_> = self
            .env
            .neighbors(position)
            .into_iter()
            .map(|(neighbor, cost)| (TemporalGridCell::at(next_time, neighbor), cost))
            .collect();
        successors.push((TemporalGridCell::at(next_time, position), WAIT_COST));
        successors
    }

    fn heuristic(&self, state: &TemporalGridCell) -> Option<usize> {
        self.heuristic.get(state.position())
    }

    fn is_goal(&self, state: &TemporalGridCell) -> bool {
        state.position() == self.goal
            && self
                .goal_blocked_until
                .is_none_or(|time_step| state.time > time_step)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowLevelSolution {
    pub path: Path,
    pub cost: usize,
}

/// Optimal path for `agent` under `constraints`, or `NoPathFound`.
#[instrument(skip_all, name = "low_level_a_star", fields(agent = agent.id, constraints = constraints.len()), level = "debug")]
pub fn a_star_search<E: Environment + ?Sized>(
    env: &E,
    agent: &Agent,
    heuristic: &HeuristicTable,
    constraints: &ConstraintSet,
    deadline: Deadline,
    stats: &mut SearchStatistics,
) -> Result<LowLevelSolution, SearchError> {
    debug!("constraints: {:?}", constraints.iter().collect::<Vec<_>>());

    let problem = SpaceTimeProblem::new(env, agent, heuristic, constraints);
    let pruning = (PruneConstraints::new(constraints), PruneInvalidMoves::new(env));

    match best_first_search(&problem, &pruning, deadline, stats) {
        Ok(outcome) => {
            // Frozen timestamps past the horizon are rewritten to the real time.
            let path: Path = outcome
                .path
                .into_iter()
                .enumerate()
                .map(|(time, cell)| TemporalGridCell::at(time, cell.position()))
                .collect();
            debug!("found path of cost {} with {} steps", outcome.cost, path.len());
            Ok(LowLevelSolution {
                path,
                cost: outcome.cost,
            })
        }
        Err(err) => {
            debug!("cannot find solution: {err}");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::graph::crossing_graph;
    use crate::map::GridMap;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    // Helper function to setup tracing
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();
    }

    fn plan<E: Environment + ?Sized>(
        env: &E,
        agent: &Agent,
        constraints: &ConstraintSet,
    ) -> Result<LowLevelSolution, SearchError> {
        let heuristic = HeuristicTable::new(env, agent.goal);
        let mut stats = SearchStatistics::default();
        a_star_search(env, agent, &heuristic, constraints, Deadline::none(), &mut stats)
    }

    fn vertex(agent: usize, position: (usize, usize), time_step: usize) -> Constraint {
        Constraint::Vertex {
            agent,
            position,
            time_step,
        }
    }

    fn corner_agent() -> Agent {
        Agent {
            id: 0,
            start: (2, 2),
            goal: (0, 0),
        }
    }

    fn assert_well_formed(path: &Path, agent: &Agent) {
        assert_eq!(path.first().map(TemporalGridCell::position), Some(agent.start));
        assert_eq!(path.last().map(TemporalGridCell::position), Some(agent.goal));
        for (time, cell) in path.iter().enumerate() {
            assert_eq!(cell.time, time);
        }
    }

    // Ideal Path
    // [(2, 2), (1, 2), (0, 2), (0, 1), (0, 0)]
    // or
    // [(2, 2), (2, 1), (2, 0), (1, 0), (0, 0)]
    #[test]
    fn test_a_star_no_constraint() {
        init_tracing();
        let agent = corner_agent();
        let map = GridMap::from_file("map_file/test/test.map").unwrap();
        let solution = plan(&map, &agent, &ConstraintSet::new(0)).unwrap();
        assert_eq!(solution.path.len(), 5);
        assert_eq!(solution.cost, 4);
        assert_well_formed(&solution.path, &agent);
    }

    #[test]
    fn test_a_star_in_path_vertex_constraint_alternative_path() {
        init_tracing();
        let agent = corner_agent();
        let map = GridMap::from_file("map_file/test/test.map").unwrap();
        let mut constraints = ConstraintSet::new(0);
        constraints.insert(vertex(0, (0, 2), 2));

        let solution = plan(&map, &agent, &constraints).unwrap();
        assert_eq!(solution.path.len(), 5);
        assert!(!constraints.is_violated_by(&solution.path));
    }

    #[test]
    fn test_a_star_in_path_vertex_constraint_forces_wait() {
        init_tracing();
        let agent = corner_agent();
        let map = GridMap::from_file("map_file/test/test.map").unwrap();
        let mut constraints = ConstraintSet::new(0);
        constraints.insert(vertex(0, (0, 2), 2));
        constraints.insert(vertex(0, (2, 0), 2));

        let solution = plan(&map, &agent, &constraints).unwrap();
        assert_eq!(solution.path.len(), 6);
        assert_eq!(solution.cost, 5);
        assert!(!constraints.is_violated_by(&solution.path));
        assert_well_formed(&solution.path, &agent);
    }

    #[test]
    fn test_a_star_edge_constraint() {
        init_tracing();
        let agent = corner_agent();
        let map = GridMap::from_file("map_file/test/test.map").unwrap();
        let mut constraints = ConstraintSet::new(0);
        constraints.insert(Constraint::Edge {
            agent: 0,
            from: (1, 2),
            to: (0, 2),
            time_step: 2,
        });
        constraints.insert(Constraint::Edge {
            agent: 0,
            from: (2, 1),
            to: (2, 0),
            time_step: 2,
        });

        let solution = plan(&map, &agent, &constraints).unwrap();
        assert_eq!(solution.cost, 5);
        assert!(!constraints.is_violated_by(&solution.path));
    }

    #[test]
    fn test_a_star_goal_constraint_delays_arrival() {
        init_tracing();
        let agent = corner_agent();
        let map = GridMap::from_file("map_file/test/test.map").unwrap();
        let mut constraints = ConstraintSet::new(0);
        constraints.insert(vertex(0, (0, 0), 4));

        let solution = plan(&map, &agent, &constraints).unwrap();
        assert_eq!(solution.path.len(), 6);
        assert!(!constraints.is_violated_by(&solution.path));
    }

    #[test]
    fn test_a_star_future_goal_constraint_keeps_searching() {
        init_tracing();
        let agent = corner_agent();
        let map = GridMap::from_file("map_file/test/test.map").unwrap();
        let mut constraints = ConstraintSet::new(0);
        constraints.insert(vertex(0, (0, 0), 6));

        // Arriving at t=4 and staying would hit the constraint at t=6.
        let solution = plan(&map, &agent, &constraints).unwrap();
        assert_eq!(solution.cost, 7);
        assert_eq!(solution.path.last(), Some(&TemporalGridCell::new(7, 0, 0)));
        assert!(!constraints.is_violated_by(&solution.path));
    }

    #[test]
    fn test_a_star_unreachable_goal() {
        init_tracing();
        let map = GridMap::new(1, 3, &[(0, 1)]);
        let agent = Agent {
            id: 0,
            start: (0, 0),
            goal: (0, 2),
        };
        assert_eq!(
            plan(&map, &agent, &ConstraintSet::new(0)),
            Err(SearchError::NoPathFound)
        );
    }

    #[test]
    fn test_a_star_boxed_in_by_constraints() {
        init_tracing();
        let map = GridMap::new(1, 2, &[]);
        let agent = Agent {
            id: 0,
            start: (0, 0),
            goal: (0, 1),
        };
        let mut constraints = ConstraintSet::new(0);
        constraints.insert(vertex(0, (0, 0), 1));
        constraints.insert(vertex(0, (0, 1), 1));

        assert_eq!(plan(&map, &agent, &constraints), Err(SearchError::NoPathFound));
    }

    #[test]
    fn test_a_star_start_is_goal() {
        let map = GridMap::new(2, 2, &[]);
        let agent = Agent {
            id: 0,
            start: (1, 1),
            goal: (1, 1),
        };
        let solution = plan(&map, &agent, &ConstraintSet::new(0)).unwrap();
        assert_eq!(solution.path, vec![TemporalGridCell::new(0, 1, 1)]);
        assert_eq!(solution.cost, 0);
    }

    #[test]
    fn test_prune_constraints_checks_both_edge_directions() {
        let mut constraints = ConstraintSet::new(0);
        constraints.insert(Constraint::Edge {
            agent: 0,
            from: (0, 0),
            to: (0, 1),
            time_step: 1,
        });
        let pruning = PruneConstraints::new(&constraints);

        let a = TemporalGridCell::new(0, 0, 0);
        let b = TemporalGridCell::new(1, 0, 1);
        assert!(pruning.should_prune(&b, Some(&a)));
        assert!(pruning.should_prune(
            &TemporalGridCell::new(1, 0, 0),
            Some(&TemporalGridCell::new(0, 0, 1))
        ));
        assert!(!pruning.should_prune(&TemporalGridCell::new(1, 0, 0), Some(&a)));
        assert!(!pruning.should_prune(&b, None));
    }

    #[test]
    fn test_weighted_graph_variants_use_only_their_own_edges() {
        init_tracing();
        let base = crossing_graph(|index| 1 + index % 3);
        let mut rng = StdRng::seed_from_u64(42);
        let variants = [
            base.sample_edges(22, &mut rng).unwrap(),
            base.sample_edges(8, &mut rng).unwrap(),
            base.sample_edges(10, &mut rng).unwrap(),
        ];
        let vertices: Vec<_> = base.vertices().collect();

        for variant in &variants {
            let mut found = 0;
            for &start in &vertices {
                for &goal in &vertices {
                    let agent = Agent { id: 0, start, goal };
                    let Ok(solution) = plan(variant, &agent, &ConstraintSet::new(0)) else {
                        continue;
                    };
                    found += 1;

                    let mut cost = 0;
                    for step in solution.path.windows(2) {
                        let (from, to) = (step[0].position(), step[1].position());
                        if from == to {
                            cost += WAIT_COST;
                        } else {
                            let weight = variant.edge_cost(from, to);
                            assert!(weight.is_some(), "edge {from:?} -> {to:?} not in variant");
                            cost += weight.unwrap_or_default();
                        }
                    }
                    assert_eq!(cost, solution.cost);
                    assert_eq!(
                        Some(solution.cost),
                        HeuristicTable::new(variant, goal).get(start)
                    );
                }
            }
            // Every vertex at least reaches itself.
            assert!(found >= vertices.len());
        }

        // The full variant is connected.
        let full = &variants[0];
        let agent = Agent {
            id: 0,
            start: (2, 0),
            goal: (4, 3),
        };
        assert!(plan(full, &agent, &ConstraintSet::new(0)).is_ok());
    }

    // (is_edge, x, y, time_step, edge goes along y)
    fn constraint_set(raw: &[(bool, usize, usize, usize, bool)]) -> ConstraintSet {
        let mut constraints = ConstraintSet::new(0);
        for &(is_edge, x, y, time_step, along_y) in raw {
            if !is_edge {
                constraints.insert(vertex(0, (x, y), time_step));
                continue;
            }
            let to = if along_y { (x, y + 1) } else { (x + 1, y) };
            if to.0 < 3 && to.1 < 3 {
                constraints.insert(Constraint::Edge {
                    agent: 0,
                    from: (x, y),
                    to,
                    time_step,
                });
            }
        }
        constraints
    }

    proptest! {
        #[test]
        fn prop_paths_respect_random_constraints(
            raw in prop::collection::vec(
                (any::<bool>(), 0usize..3, 0usize..3, 1usize..8, any::<bool>()),
                0..12,
            ),
        ) {
            let map = GridMap::from_file("map_file/test/test.map").unwrap();
            let agent = corner_agent();
            let constraints = constraint_set(&raw);

            match plan(&map, &agent, &constraints) {
                Ok(solution) => {
                    prop_assert!(!constraints.is_violated_by(&solution.path));
                    assert_well_formed(&solution.path, &agent);
                    prop_assert!(solution.cost >= 4);
                    let arrival = solution.path.len() - 1;
                    if let Some(blocked) = constraints.latest_vertex_time(agent.goal) {
                        prop_assert!(blocked < arrival);
                    }
                }
                Err(err) => prop_assert_eq!(err, SearchError::NoPathFound),
            }
        }
    }
}
