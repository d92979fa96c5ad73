//! Generic best-first search shared by the single-agent planners.
//!
//! A search is described by a [`SearchProblem`] and filtered by a
//! [`PruningMethod`]. Nodes live in a [`NodeArena`] and refer to their
//! predecessor by [`NodeId`], so paths are rebuilt by walking handles
//! backwards and no reference cycles can form.

use crate::budget::Deadline;
use crate::error::SearchError;
use crate::queue::{MutablePriorityQueue, Prioritized};
use crate::stat::SearchStatistics;

use std::cmp::Reverse;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::trace;

// Expansions between two deadline checks.
const DEADLINE_CHECK_INTERVAL: usize = 256;

pub trait SearchProblem {
    /// Also the duplicate-detection key of the open and closed lists.
    type State: Clone + Eq + Hash + Debug;

    fn initial_state(&self) -> Self::State;

    /// Successor states with the cost of reaching them from `state`.
    fn successors(&self, state: &Self::State) -> Vec<(Self::State, usize)>;

    /// Admissible estimate of the remaining cost, `None` if the goal is unreachable.
    fn heuristic(&self, state: &Self::State) -> Option<usize>;

    fn is_goal(&self, state: &Self::State) -> bool;
}

/// Rejects candidate states before they enter the open list. Must be pure.
pub trait PruningMethod<S> {
    fn should_prune(&self, candidate: &S, predecessor: Option<&S>) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPruning;

impl<S> PruningMethod<S> for NoPruning {
    fn should_prune(&self, _candidate: &S, _predecessor: Option<&S>) -> bool {
        false
    }
}

/// Disjunction: prunes when either side prunes.
impl<S, A, B> PruningMethod<S> for (A, B)
where
    A: PruningMethod<S>,
    B: PruningMethod<S>,
{
    fn should_prune(&self, candidate: &S, predecessor: Option<&S>) -> bool {
        self.0.should_prune(candidate, predecessor) || self.1.should_prune(candidate, predecessor)
    }
}

impl<S, P> PruningMethod<S> for &P
where
    P: PruningMethod<S> + ?Sized,
{
    fn should_prune(&self, candidate: &S, predecessor: Option<&S>) -> bool {
        (**self).should_prune(candidate, predecessor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchNode<S> {
    pub state: S,
    /// Cost-to-come.
    pub g: usize,
    pub h: usize,
    pub parent: Option<NodeId>,
}

impl<S> SearchNode<S> {
    pub fn f(&self) -> usize {
        self.g + self.h
    }
}

#[derive(Debug, Clone)]
pub struct NodeArena<S> {
    nodes: Vec<SearchNode<S>>,
}

impl<S> Default for NodeArena<S> {
    fn default() -> Self {
        NodeArena { nodes: Vec::new() }
    }
}

impl<S: Clone> NodeArena<S> {
    pub fn push(&mut self, node: SearchNode<S>) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> &SearchNode<S> {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut SearchNode<S> {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// States from the root to `id`.
    pub fn path_to(&self, id: NodeId) -> Vec<S> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.get(id);
            path.push(node.state.clone());
            current = node.parent;
        }
        path.reverse();
        path
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    node: NodeId,
    g: usize,
    f: usize,
}

impl Prioritized for OpenEntry {
    // Lowest f first, deeper nodes first on equal f.
    type Priority = (usize, Reverse<usize>);

    fn priority(&self) -> Self::Priority {
        (self.f, Reverse(self.g))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome<S> {
    pub path: Vec<S>,
    pub cost: usize,
}

/// A* over `problem`. Requires a consistent heuristic: closed states are never reopened.
pub fn best_first_search<P, R>(
    problem: &P,
    pruning: &R,
    deadline: Deadline,
    stats: &mut SearchStatistics,
) -> Result<SearchOutcome<P::State>, SearchError>
where
    P: SearchProblem,
    R: PruningMethod<P::State> + ?Sized,
{
    let mut arena = NodeArena::default();
    let mut open: MutablePriorityQueue<P::State, OpenEntry> = MutablePriorityQueue::new();
    let mut closed: HashSet<P::State> = HashSet::new();

    let root = problem.initial_state();
    stats.record_generation();
    if pruning.should_prune(&root, None) {
        stats.record_pruned();
        return Err(SearchError::NoPathFound);
    }
    let Some(h) = problem.heuristic(&root) else {
        return Err(SearchError::NoPathFound);
    };
    stats.record_evaluation();
    let id = arena.push(SearchNode {
        state: root.clone(),
        g: 0,
        h,
        parent: None,
    });
    open.insert(root, OpenEntry { node: id, g: 0, f: h })?;

    let mut expansions = 0;
    while let Ok((state, entry)) = open.pop_min() {
        if expansions % DEADLINE_CHECK_INTERVAL == 0 && deadline.expired() {
            return Err(SearchError::BudgetExceeded);
        }
        trace!("expand node: {state:?} g {} f {}", entry.g, entry.f);

        if problem.is_goal(&state) {
            return Ok(SearchOutcome {
                path: arena.path_to(entry.node),
                cost: entry.g,
            });
        }
        closed.insert(state.clone());
        stats.record_expansion();
        expansions += 1;

        for (child, step_cost) in problem.successors(&state) {
            if closed.contains(&child) {
                continue;
            }
            stats.record_generation();

            if pruning.should_prune(&child, Some(&state)) {
                stats.record_pruned();
                continue;
            }
            let Some(h) = problem.heuristic(&child) else {
                continue;
            };
            stats.record_evaluation();
            let g = entry.g + step_cost;

            if let Some(existing) = open.get(&child) {
                // Decrease-key: a cheaper way into a state that is still open.
                if g < existing.g {
                    let id = existing.node;
                    let node = arena.get_mut(id);
                    node.g = g;
                    node.parent = Some(entry.node);
                    open.update(&child, |open_entry| {
                        open_entry.g = g;
                        open_entry.f = g + h;
                    })?;
                }
                continue;
            }

            let id = arena.push(SearchNode {
                state: child.clone(),
                g,
                h,
                parent: Some(entry.node),
            });
            open.insert(child, OpenEntry { node: id, g, f: g + h })?;
        }
    }

    Err(SearchError::NoPathFound)
}
