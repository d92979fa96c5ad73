use crate::common::Solution;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("priority queue is empty")]
    Empty,
    #[error("key is already present in the priority queue")]
    DuplicateKey,
    #[error("key is not present in the priority queue")]
    MissingKey,
}

/// Failure of a single-agent search.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("open list exhausted without reaching the goal")]
    NoPathFound,
    #[error("search budget exceeded")]
    BudgetExceeded,
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Conflicted paths of the best constraint tree node seen before the budget ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestEffort {
    pub solution: Solution,
    pub remaining_conflicts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverFailure {
    #[error("invalid problem input: {0}")]
    InvalidInput(String),
    #[error("no conflict-free solution exists")]
    NoSolutionFound,
    #[error("search budget exceeded")]
    BudgetExceeded { best: Option<Box<BestEffort>> },
    #[error("low-level search failed: {0}")]
    Search(SearchError),
}
