//! Operator CLI for the discovery engine.
//!
//! Commands are linear and always exit with an explicit status: `run-cycle`
//! and `test` drive the in-process engine; `train` and `serve` run the
//! external training pipeline and status service as child processes.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use streamscout::config::ScoutConfig;
use streamscout::engine::Engine;
use streamscout::telemetry::{self, CycleLog};

#[derive(Parser)]
#[command(
    name = "streamscout",
    version,
    about = "Autonomous discovery engine for live sports streaming sites"
)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "scout_config.json", env = "STREAMSCOUT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one Plan -> Execute -> Report discovery cycle.
    RunCycle,
    /// Abbreviated cycle with page and time caps.
    Test,
    /// Drive the external classifier training pipeline.
    Train {
        /// Command line of the trainer, e.g. `scout-train --out model.json`.
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Start the external status service.
    Serve {
        /// Command line of the status service.
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let log = CycleLog::new();
    telemetry::init(&log);

    let cli = Cli::parse();
    match run(cli, log).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, log: CycleLog) -> anyhow::Result<()> {
    let config = if cli.config.exists() {
        ScoutConfig::load(&cli.config)?
    } else {
        warn!(
            "no configuration file at {}, using defaults",
            cli.config.display()
        );
        ScoutConfig::default()
    };

    let engine = Engine::new(config, log).await?;

    match cli.command {
        Command::RunCycle => {
            let outcome = engine.run_cycle().await?;
            print_outcome(&outcome);
        }
        Command::Test => {
            let outcome = engine.test_cycle().await?;
            print_outcome(&outcome);
        }
        Command::Train { command } => {
            engine.run_external("train", &command).await?;
        }
        Command::Serve { command } => {
            engine.run_external("serve", &command).await?;
        }
    }

    Ok(())
}

fn print_outcome(outcome: &streamscout::engine::CycleOutcome) {
    info!(
        "cycle summary: plan={:?} queries={} | sweep examined={} reactivated={} quarantined={} \
         deactivated={} | crawl pages={} links={} admitted={} | report {}",
        outcome.plan.mission_type,
        outcome.plan.seed_queries.len(),
        outcome.sweep.examined,
        outcome.sweep.reactivated,
        outcome.sweep.quarantined,
        outcome.sweep.deactivated,
        outcome.crawl.pages_crawled,
        outcome.crawl.links_evaluated,
        outcome.crawl.sites_admitted,
        outcome.report_path.display()
    );
}
