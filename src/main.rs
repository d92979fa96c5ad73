use cbs_planner::config::{Cli, Config};
use cbs_planner::error::SolverFailure;
use cbs_planner::map::GridMap;
use cbs_planner::scenario::Scenario;
use cbs_planner::solver::{Solver, CBS};

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::BufWriter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let config = if let Some(config_file) = cli.config.as_ref() {
        Config::from_file(config_file)?
    } else {
        info!("No config file specified, using default config");
        Config::default()
    }
    .override_from_command_line(&cli)?;

    let map = GridMap::from_file(&config.map_path)?;
    let agents = if let Some(agents_path) = config.agents_path.as_ref() {
        Scenario::load_agents_from_yaml(agents_path)?
    } else {
        let scenario = Scenario::load_from_scen(&config.scen_path)?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        if config.agents_dist.is_empty() {
            scenario.generate_agents_randomly(config.num_agents, &mut rng)?
        } else {
            scenario.generate_agents_by_buckets(config.num_agents, &config.agents_dist, &mut rng)?
        }
    };
    if let Some(agent) = agents.iter().find(|agent| !agent.verify(&map)) {
        anyhow::bail!("agent {} starts or ends on a blocked cell", agent.id);
    }

    let mut solver = CBS::new(agents.clone(), &map);
    match solver.solve(&config) {
        Ok(solution) => {
            if !solution.verify(&map, &agents) {
                anyhow::bail!("cbs returned an invalid solution");
            }
            info!(
                "cbs solution: cost {} makespan {}",
                solution.cost,
                solution.makespan()
            );
        }
        Err(SolverFailure::BudgetExceeded { best: Some(best) }) => {
            warn!(
                "cbs ran out of budget, best node has cost {} and {} conflicts",
                best.solution.cost, best.remaining_conflicts
            );
        }
        Err(err) => error!("cbs solve fails: {err}"),
    }

    if let Some(output_path) = config.output_path.as_ref() {
        let file = File::create(output_path)
            .with_context(|| format!("cannot create output file {output_path}"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &solver.stats().to_report())?;
        info!("statistics written to {output_path}");
    }

    Ok(())
}
