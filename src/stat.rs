use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Counters of one search run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStatistics {
    pub nodes_expanded: usize,
    pub nodes_generated: usize,
    /// Generated nodes that got a cost and heuristic, or a low-level plan.
    pub nodes_evaluated: usize,
    pub nodes_pruned: usize,
}

impl SearchStatistics {
    pub fn record_expansion(&mut self) {
        self.nodes_expanded += 1;
    }

    pub fn record_generation(&mut self) {
        self.nodes_generated += 1;
    }

    pub fn record_evaluation(&mut self) {
        self.nodes_evaluated += 1;
    }

    pub fn record_pruned(&mut self) {
        self.nodes_pruned += 1;
    }

    pub fn merge(&mut self, other: &SearchStatistics) {
        self.nodes_expanded += other.nodes_expanded;
        self.nodes_generated += other.nodes_generated;
        self.nodes_evaluated += other.nodes_evaluated;
        self.nodes_pruned += other.nodes_pruned;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub high_level: SearchStatistics,
    pub low_level: SearchStatistics,
    pub low_level_searches: usize,
    pub low_level_time: Duration,
    pub elapsed: Duration,
    pub costs: Option<usize>,
}

/// Serializable summary of a solve, written next to the solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub nodes_expanded: usize,
    pub nodes_generated: usize,
    pub nodes_evaluated: usize,
    /// Seconds.
    pub elapsed_time: f64,
    pub solution_cost: Option<usize>,
    pub low_level_searches: usize,
    pub low_level_nodes_expanded: usize,
    pub low_level_nodes_generated: usize,
    pub low_level_nodes_evaluated: usize,
    pub low_level_nodes_pruned: usize,
    /// Seconds.
    pub low_level_time: f64,
}

impl Stats {
    pub fn record_expansion(&mut self) {
        self.high_level.record_expansion();
    }

    pub fn record_generation(&mut self) {
        self.high_level.record_generation();
    }

    pub fn record_evaluation(&mut self) {
        self.high_level.record_evaluation();
    }

    pub fn record_low_level(&mut self, search: &SearchStatistics) {
        self.low_level_searches += 1;
        self.low_level.merge(search);
    }

    pub fn finalize(&mut self, elapsed: Duration, solution_cost: Option<usize>) {
        self.elapsed = elapsed;
        self.costs = solution_cost;
    }

    pub fn to_report(&self) -> StatsReport {
        StatsReport {
            nodes_expanded: self.high_level.nodes_expanded,
            nodes_generated: self.high_level.nodes_generated,
            nodes_evaluated: self.high_level.nodes_evaluated,
            elapsed_time: self.elapsed.as_secs_f64(),
            solution_cost: self.costs,
            low_level_searches: self.low_level_searches,
            low_level_nodes_expanded: self.low_level.nodes_expanded,
            low_level_nodes_generated: self.low_level.nodes_generated,
            low_level_nodes_evaluated: self.low_level.nodes_evaluated,
            low_level_nodes_pruned: self.low_level.nodes_pruned,
            low_level_time: self.low_level_time.as_secs_f64(),
        }
    }

    pub fn print(&self) {
        info!(
            "Cost {:?} Time(microseconds) {:?} High level expand nodes number: {:?} Low level expand nodes number {:?}",
            self.costs,
            self.elapsed.as_micros(),
            self.high_level.nodes_expanded,
            self.low_level.nodes_expanded
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_reflects_counters() {
        let mut stats = Stats::default();
        stats.record_generation();
        stats.record_generation();
        stats.record_expansion();
        stats.record_evaluation();

        let mut search = SearchStatistics::default();
        search.record_expansion();
        search.record_generation();
        search.record_evaluation();
        search.record_pruned();
        stats.record_low_level(&search);
        stats.record_low_level(&search);
        stats.finalize(Duration::from_millis(1500), Some(12));

        let report = stats.to_report();
        assert_eq!(report.nodes_generated, 2);
        assert_eq!(report.nodes_expanded, 1);
        assert_eq!(report.nodes_evaluated, 1);
        assert_eq!(report.low_level_nodes_evaluated, 2);
        assert_eq!(report.solution_cost, Some(12));
        assert_eq!(report.low_level_searches, 2);
        assert_eq!(report.low_level_nodes_pruned, 2);
        assert!((report.elapsed_time - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let mut stats = Stats::default();
        stats.finalize(Duration::ZERO, None);
        let json = serde_json::to_value(stats.to_report()).unwrap();
        assert_eq!(json["solution_cost"], serde_json::Value::Null);
        assert_eq!(json["nodes_expanded"], 0);
        assert_eq!(json["nodes_evaluated"], 0);
    }
}
