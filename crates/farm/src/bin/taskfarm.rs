//! taskfarm: run a dynamic task farm.
//!
//! # Usage
//!
//! ```bash
//! # Everything in one process, 4 in-process workers
//! taskfarm local --workers 4 --depth 10
//!
//! # Coordinator and workers as separate processes over TCP
//! TASKFARM_TRANSPORT_KIND=tcp taskfarm coordinator --workers 2
//! TASKFARM_TRANSPORT_KIND=tcp taskfarm worker --workers 2 --id 0
//! TASKFARM_TRANSPORT_KIND=tcp taskfarm worker --workers 2 --id 1
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use taskfarm::scheduler::RunReport;
use taskfarm::{run_coordinator, run_local, run_worker};
use taskfarm_core::config::{load_dotenv, TransportKind};
use taskfarm_core::{FarmConfig, Tally};

/// Dynamic task farm: one coordinator, a fixed pool of workers.
#[derive(Parser, Debug)]
#[command(name = "taskfarm", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the coordinator and all workers in this process.
    Local(RunArgs),
    /// Run the coordinator; workers connect over ZeroMQ.
    Coordinator(RunArgs),
    /// Run one worker against a running coordinator.
    Worker {
        #[command(flatten)]
        run: RunArgs,

        /// This worker's rank, `0..workers`.
        #[arg(long, env = "TASKFARM_WORKER_ID")]
        id: u32,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to taskfarm.toml. Built-in defaults are used when absent.
    #[arg(long, env = "TASKFARM_CONFIG")]
    config: Option<PathBuf>,

    /// Worker count (overrides `workers.count`).
    #[arg(long)]
    workers: Option<u32>,

    /// Seed task depth (overrides `tree.depth`).
    #[arg(long)]
    depth: Option<u32>,

    /// Number of seed tasks (overrides `tree.seeds`).
    #[arg(long)]
    seeds: Option<u32>,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn load_config(&self) -> anyhow::Result<FarmConfig> {
        let mut config = match &self.config {
            Some(path) => FarmConfig::from_file(path)?,
            None => FarmConfig::from_env()?,
        };
        if let Some(workers) = self.workers {
            config.workers.count = workers;
        }
        if let Some(depth) = self.depth {
            config.tree.depth = depth;
        }
        if let Some(seeds) = self.seeds {
            config.tree.seeds = seeds;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting taskfarm");

    match cli.command {
        Command::Local(args) => {
            let mut config = args.load_config()?;
            if config.transport.kind != TransportKind::Local {
                tracing::warn!(kind = ?config.transport.kind, "local run ignores transport.kind");
                config.transport.kind = TransportKind::Local;
            }
            config.log_summary();
            let report = run_local(&config, Tally::new()).await?;
            print_report(&report, args.json)?;
        }
        Command::Coordinator(args) => {
            let config = args.load_config()?;
            config.log_summary();
            let report = run_coordinator(&config, Tally::new()).await?;
            print_report(&report, args.json)?;
        }
        Command::Worker { run, id } => {
            let config = run.load_config()?;
            let summary = run_worker(&config, id).await?;
            if run.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }
    }

    tracing::info!("taskfarm exited cleanly");
    Ok(())
}

fn print_report<T: Serialize>(report: &RunReport<T>, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        tracing::info!(
            run_id = %report.run_id,
            dispatched = report.stats.dispatched,
            reports = report.stats.reports,
            failures = report.stats.failures,
            max_queue_depth = report.stats.max_queue_depth,
            "run complete"
        );
    }
    Ok(())
}
