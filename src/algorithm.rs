mod astar;

pub use astar::{
    a_star_search, LowLevelSolution, PruneConstraints, PruneInvalidMoves, SpaceTimeProblem,
    TemporalGridCellNode, WAIT_COST,
};
