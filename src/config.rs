use crate::budget::Budget;
use crate::solver::CostType;

use anyhow::{anyhow, Context};
use clap::Parser;
use serde::Deserialize;
use std::time::Duration;

#[derive(Parser, Debug, Default)]
#[command(
    name = "CBS planner",
    about = "Conflict-Based Search for multi-agent path finding.",
    version = "0.1"
)]
pub struct Cli {
    #[arg(long, help = "Path to a YAML config file")]
    pub config: Option<String>,

    #[arg(long, help = "Path to the map file")]
    pub map_path: Option<String>,

    #[arg(long, help = "Path to the MovingAI scenario file")]
    pub scen_path: Option<String>,

    #[arg(long, help = "Path to a YAML agent list, used instead of the scenario")]
    pub agents_path: Option<String>,

    #[arg(long, help = "Path to the JSON statistics report")]
    pub output_path: Option<String>,

    #[arg(long, help = "Number of agents")]
    pub num_agents: Option<usize>,

    #[arg(long, help = "Distribution of agents over scenario buckets", use_value_delimiter = true)]
    pub agents_dist: Vec<usize>,

    #[arg(long, help = "Seed for the random number generator")]
    pub seed: Option<u64>,

    #[arg(long, help = "Wall-clock limit of the search in milliseconds")]
    pub time_limit_ms: Option<u64>,

    #[arg(long, value_enum, help = "How agent costs add up to a constraint tree node cost")]
    pub cost_type: Option<CostType>,

    #[arg(long, help = "Maximum number of constraint tree expansions")]
    pub max_expansions: Option<usize>,

    #[arg(long, help = "Build both children of an expansion in parallel")]
    pub parallel_branching: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub map_path: String,
    pub scen_path: String,
    pub agents_path: Option<String>,
    pub output_path: Option<String>,
    pub num_agents: usize,
    pub agents_dist: Vec<usize>,
    pub seed: u64,
    pub time_limit_ms: Option<u64>,
    pub max_expansions: Option<usize>,
    pub cost_type: CostType,
    pub parallel_branching: bool,
}

/// Wall-clock limit used unless a config file or flag sets one.
pub const DEFAULT_TIME_LIMIT_MS: u64 = 5_000;

impl Default for Config {
    fn default() -> Self {
        Config {
            map_path: "map_file/test/open.map".to_string(),
            scen_path: "map_file/test/open.scen".to_string(),
            agents_path: None,
            output_path: None,
            num_agents: 4,
            agents_dist: Vec::new(),
            seed: 0,
            time_limit_ms: Some(DEFAULT_TIME_LIMIT_MS),
            max_expansions: None,
            cost_type: CostType::default(),
            parallel_branching: false,
        }
    }
}

impl Config {
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("invalid YAML config")
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {path}"))?;
        Self::from_yaml_str(&content).with_context(|| format!("error with config file: {path}"))
    }

    /// Command line flags win over the file.
    pub fn override_from_command_line(mut self, cli: &Cli) -> anyhow::Result<Self> {
        if let Some(map_path) = &cli.map_path {
            self.map_path = map_path.clone();
        }
        if let Some(scen_path) = &cli.scen_path {
            self.scen_path = scen_path.clone();
        }
        if cli.agents_path.is_some() {
            self.agents_path = cli.agents_path.clone();
        }
        if cli.output_path.is_some() {
            self.output_path = cli.output_path.clone();
        }
        if let Some(num_agents) = cli.num_agents {
            self.num_agents = num_agents;
        }
        if !cli.agents_dist.is_empty() {
            self.agents_dist = cli.agents_dist.clone();
        }
        if let Some(seed) = cli.seed {
            self.seed = seed;
        }
        if cli.time_limit_ms.is_some() {
            self.time_limit_ms = cli.time_limit_ms;
        }
        if let Some(cost_type) = cli.cost_type {
            self.cost_type = cost_type;
        }
        if cli.max_expansions.is_some() {
            self.max_expansions = cli.max_expansions;
        }
        self.parallel_branching |= cli.parallel_branching;

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_agents == 0 {
            return Err(anyhow!("Number of agents must be positive"));
        }

        if !self.agents_dist.is_empty() && self.agents_dist.len() != self.num_agents {
            return Err(anyhow!(
                "Agent distribution lists {} buckets for {} agents",
                self.agents_dist.len(),
                self.num_agents
            ));
        }

        if self.time_limit_ms == Some(0) {
            return Err(anyhow!("Time limit must be positive when set"));
        }
        Ok(())
    }

    pub fn budget(&self) -> Budget {
        let mut budget = Budget::unlimited();
        if let Some(limit) = self.time_limit_ms {
            budget = budget.with_time_limit(Duration::from_millis(limit));
        }
        if let Some(max_expansions) = self.max_expansions {
            budget = budget.with_max_expansions(max_expansions);
        }
        budget
    }
}
