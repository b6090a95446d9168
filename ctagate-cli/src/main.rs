//! ctagate CLI — run and optimize commands.
//!
//! Commands:
//! - `run` — execute a single backtest from a TOML job file
//! - `optimize` — search the job's parameter space, brute-force or genetic

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use ctagate_core::data::CsvFeed;
use ctagate_core::engine::BacktestEngine;
use ctagate_runner::{
    run_brute_force, run_genetic, Evaluator, ParameterSetting, PerformanceMetrics, SweepConfig,
    SweepOutcome,
};

#[derive(Parser)]
#[command(name = "ctagate", about = "ctagate CLI — gated CTA backtesting and optimization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single backtest from a TOML job file.
    Run {
        /// Path to the TOML job file.
        #[arg(long)]
        config: PathBuf,

        /// Directory holding `<symbol>_<interval>.csv` data files.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Search the job's parameter space and rank the candidates.
    Optimize {
        /// Path to the TOML job file (must contain an [optimize] block).
        #[arg(long)]
        config: PathBuf,

        /// Directory holding `<symbol>_<interval>.csv` data files.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Use the genetic search instead of the brute-force sweep.
        #[arg(long, default_value_t = false)]
        ga: bool,

        /// Worker pool width. Overrides the config file.
        #[arg(long)]
        workers: Option<usize>,

        /// Write the ranked results as JSON to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, data_dir } => run_cmd(&config, &data_dir),
        Commands::Optimize {
            config,
            data_dir,
            ga,
            workers,
            output,
        } => optimize_cmd(&config, &data_dir, ga, workers, output.as_deref()),
    }
}

fn run_cmd(config_path: &PathBuf, data_dir: &PathBuf) -> Result<()> {
    let job = SweepConfig::from_path(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let factory = job.factory()?;
    let feed = CsvFeed::new(data_dir);

    // An empty setting makes the factory fall back to the configured
    // parameter defaults.
    let defaults = ParameterSetting::new(Vec::new());

    let mut engine = BacktestEngine::new();
    engine.set_parameters(&job.run)?;
    engine.attach_strategy(factory.build(&defaults)?)?;
    if let Some(filter) = factory.filter(&defaults) {
        engine.attach_filter(filter)?;
    }
    engine.load_data(&feed)?;
    let result = engine.run_backtesting()?;

    println!(
        "{} {} bars replayed, {} fills",
        job.run.symbol,
        result.bar_count,
        result.trades.len()
    );
    let metrics = PerformanceMetrics::compute(&result, &job.run);
    for (name, value) in metrics.to_map() {
        println!("  {name:<24} {value:.4}");
    }
    Ok(())
}

fn optimize_cmd(
    config_path: &PathBuf,
    data_dir: &PathBuf,
    ga: bool,
    workers: Option<usize>,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let job = SweepConfig::from_path(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let Some(optimize) = job.optimize.clone() else {
        bail!("job file has no [optimize] block");
    };

    let factory = job.factory()?;
    let evaluator = Evaluator::new(
        job.run.clone(),
        factory,
        Arc::new(CsvFeed::new(data_dir)),
        optimize.target.clone(),
    );
    let space = optimize.space();
    let workers = workers.unwrap_or(optimize.workers);
    let report = |line: &str| println!("{line}");

    let outcome: SweepOutcome = if ga {
        let search = optimize.ga.clone().unwrap_or_default().build();
        run_genetic(&evaluator, &space, &search, workers, &report)?
    } else {
        run_brute_force(&evaluator, &space, workers, &report)?
    };

    if let Some(best) = outcome.best() {
        println!(
            "best: {} with {} = {:.4}",
            best.setting, optimize.target, best.metric
        );
    }
    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&outcome.results)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Ranked results saved to: {}", path.display());
    }
    Ok(())
}
