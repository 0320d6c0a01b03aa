//! Scenario runner: loads a JSON scenario, steps the chemical transport
//! kernel under constant forcing and writes a JSON run summary, plus
//! optional ASCII-grid concentration dumps.

mod scenario;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use scenario::Scenario;

#[derive(Parser, Debug)]
#[command(name = "chemflux-run", about = "Run a chemical transport scenario and summarise the mass budget")]
struct Args {
    /// Scenario JSON document
    #[arg(long)]
    scenario: PathBuf,

    /// Number of timesteps (overrides the scenario)
    #[arg(long)]
    steps: Option<usize>,

    /// Timestep in seconds (overrides the scenario)
    #[arg(long)]
    dt: Option<f64>,

    /// Summary JSON path; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for final concentration grids
    #[arg(long)]
    grids: Option<PathBuf>,

    /// Log limiter activations and dry-cell drops
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let scenario = Scenario::load(&args.scenario)?;
    let steps = args.steps.unwrap_or(scenario.steps);
    let dt = args.dt.unwrap_or(scenario.dt);
    let base = args.scenario.parent().unwrap_or_else(|| Path::new("."));

    let mut run = scenario.build(base)?;
    log::info!(
        "{} compartments, {} chemicals, {steps} steps of {dt} s",
        run.kernel.topology().len(),
        run.kernel.model().n_chemicals()
    );
    run.advance(steps, dt)?;

    let summary = run.summary(dt);
    if summary.instabilities > 0 {
        log::warn!("{} negative-mass events were clamped; consider a shorter timestep", summary.instabilities);
    }
    let json = serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Cannot write {}", path.display()))?;
            log::info!("summary written to {}", path.display());
        }
        None => println!("{json}"),
    }

    if let Some(dir) = &args.grids {
        let n = run.write_grids(dir)?;
        log::info!("{n} concentration files written to {}", dir.display());
    }
    Ok(())
}
