use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

/// Limits for one solve. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    pub time_limit: Option<Duration>,
    pub max_expansions: Option<usize>,
}

impl Budget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = Some(max_expansions);
        self
    }

    pub fn deadline_from(&self, start: Instant) -> Deadline {
        Deadline(self.time_limit.map(|limit| start + limit))
    }

    pub fn expansions_exhausted(&self, expansions: usize) -> bool {
        self.max_expansions.is_some_and(|max| expansions >= max)
    }
}

/// Wall-clock cut-off shared by the high- and low-level searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Deadline(None)
    }

    pub fn after(limit: Duration) -> Self {
        Deadline(Some(Instant::now() + limit))
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Named phase timers. Owned by whoever runs the search, never global.
///
/// A phase can be started and stopped repeatedly; its elapsed time accumulates.
#[derive(Debug, Clone, Default)]
pub struct TimeKeeper {
    recorded: HashMap<String, Duration>,
    active: HashMap<String, Instant>,
}

impl TimeKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, phase: &str) {
        if self.active.contains_key(phase) {
            warn!("timer '{phase}' already active");
            return;
        }
        self.active.insert(phase.to_string(), Instant::now());
    }

    /// Returns the time spent in this run of the phase.
    pub fn stop(&mut self, phase: &str) -> Duration {
        let Some(started) = self.active.remove(phase) else {
            warn!("timer '{phase}' not active");
            return Duration::ZERO;
        };
        let lap = started.elapsed();
        *self.recorded.entry(phase.to_string()).or_default() += lap;
        lap
    }

    /// Runs `f` inside the phase.
    pub fn time<T>(&mut self, phase: &str, f: impl FnOnce() -> T) -> T {
        self.start(phase);
        let result = f();
        self.stop(phase);
        result
    }

    /// Accumulated time including a currently running lap. `None` for unknown phases.
    pub fn elapsed(&self, phase: &str) -> Option<Duration> {
        let recorded = self.recorded.get(phase).copied();
        let running = self.active.get(phase).map(Instant::elapsed);
        match (recorded, running) {
            (None, None) => None,
            (recorded, running) => Some(recorded.unwrap_or_default() + running.unwrap_or_default()),
        }
    }

    pub fn is_active(&self, phase: &str) -> bool {
        self.active.contains_key(phase)
    }

    pub fn reset(&mut self, phase: &str) {
        self.active.remove(phase);
        self.recorded.remove(phase);
    }

    pub fn reset_all(&mut self) {
        self.active.clear();
        self.recorded.clear();
    }
}
