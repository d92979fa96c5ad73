pub mod algorithm;
pub mod budget;
pub mod common;
pub mod config;
pub mod constraint;
pub mod error;
pub mod graph;
pub mod map;
pub mod queue;
pub mod scenario;
pub mod search;
pub mod solver;
pub mod stat;
