use anyhow::{anyhow, bail, Context, Result};
use rand::prelude::*;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use tracing::info;

use crate::common::Agent;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Route {
    pub start_x: usize,
    pub start_y: usize,
    pub goal_x: usize,
    pub goal_y: usize,
}

type Bucket = Vec<Route>;

/// A MovingAI `.scen` benchmark: routes grouped into buckets of similar length.
#[derive(Debug, Default, Deserialize)]
pub struct Scenario {
    pub map: String,
    pub map_width: usize,
    pub map_height: usize,
    pub buckets: BTreeMap<usize, Bucket>,
}

impl Scenario {
    pub fn load_from_scen<P: AsRef<Path>>(path: P) -> Result<Scenario> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("cannot open scenario {}", path.display()))?;
        Self::parse(BufReader::new(file))
            .with_context(|| format!("invalid scenario {}", path.display()))
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Scenario> {
        let mut lines = reader.lines();

        // First line is "version x.x" which we can skip
        let version = lines.next().transpose()?.unwrap_or_default();
        if !version.starts_with("version") {
            bail!("missing version line");
        }

        let mut scenario = Scenario::default();
        for (line_number, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 8 {
                bail!("line {}: expected at least 8 fields", line_number + 2);
            }
            let field = |index: usize| -> Result<usize> {
                parts[index].parse().with_context(|| {
                    format!("line {}: bad number {:?}", line_number + 2, parts[index])
                })
            };

            // Scenario coordinates are (column, row); the map is indexed by (row, column).
            let route = Route {
                start_x: field(5)?,
                start_y: field(4)?,
                goal_x: field(7)?,
                goal_y: field(6)?,
            };

            if scenario.map.is_empty() {
                // Initialize map details from the first route entry
                scenario.map = parts[1].to_string();
                scenario.map_width = field(2)?;
                scenario.map_height = field(3)?;
            }

            scenario.buckets.entry(field(0)?).or_default().push(route);
        }

        Ok(scenario)
    }

    pub fn num_routes(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// One agent per entry of `agent_buckets`, each on an unused route of that bucket.
    pub fn generate_agents_by_buckets<R: Rng + ?Sized>(
        &self,
        num_agents: usize,
        agent_buckets: &[usize],
        rng: &mut R,
    ) -> Result<Vec<Agent>> {
        if agent_buckets.len() != num_agents {
            bail!("Number of agents does not match the length of agent_buckets");
        }

        let mut agents: Vec<Agent> = Vec::new();
        let mut used_routes: BTreeMap<usize, HashSet<usize>> = BTreeMap::new();

        for (agent_id, &bucket_index) in agent_buckets.iter().enumerate() {
            let bucket = self
                .buckets
                .get(&bucket_index)
                .ok_or_else(|| anyhow!("Bucket {bucket_index} not found"))?;

            // Find unused routes
            let available_routes: Vec<usize> = (0..bucket.len())
                .filter(|idx| {
                    used_routes
                        .get(&bucket_index)
                        .is_none_or(|used| !used.contains(idx))
                })
                .collect();

            // Select a random route from available ones
            let &route_index = available_routes
                .choose(rng)
                .ok_or_else(|| anyhow!("No available routes left in bucket {bucket_index}"))?;

            let route = &bucket[route_index];
            agents.push(Agent {
                id: agent_id,
                start: (route.start_x, route.start_y),
                goal: (route.goal_x, route.goal_y),
            });

            // Mark this route as used
            used_routes
                .entry(bucket_index)
                .or_default()
                .insert(route_index);
        }

        info!("Generate scen: {agents:?}");
        Ok(agents)
    }

    /// `num_agents` distinct routes drawn from all buckets.
    pub fn generate_agents_randomly<R: Rng + ?Sized>(
        &self,
        num_agents: usize,
        rng: &mut R,
    ) -> Result<Vec<Agent>> {
        let mut available_routes: Vec<&Route> = self.buckets.values().flatten().collect();
        available_routes.sort();
        available_routes.dedup();

        if available_routes.len() < num_agents {
            bail!("Not enough unique routes available to match the number of agents");
        }

        // Shuffle the available routes to randomize the route selection
        available_routes.shuffle(rng);

        let agents: Vec<Agent> = available_routes
            .into_iter()
            .take(num_agents)
            .enumerate()
            .map(|(agent_id, route)| Agent {
                id: agent_id,
                start: (route.start_x, route.start_y),
                goal: (route.goal_x, route.goal_y),
            })
            .collect();

        info!("Generate scen: {agents:?}");
        Ok(agents)
    }

    pub fn load_agents_from_yaml<P: AsRef<Path>>(path: P) -> Result<Vec<Agent>> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("cannot open agent list {}", path.display()))?;
        let reader = BufReader::new(file);
        let agents = serde_yaml::from_reader(reader)
            .with_context(|| format!("invalid agent list {}", path.display()))?;
        Ok(agents)
    }

    pub fn write_agents_to_yaml<P: AsRef<Path>>(path: P, agents: &[Agent]) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = io::BufWriter::new(file);
        let yaml_data = serde_yaml::to_string(&agents)?;
        writer.write_all(yaml_data.as_bytes())?;

        Ok(())
    }
}
