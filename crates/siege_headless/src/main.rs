//! Headless attack session runner.
//!
//! Plays one scenario without graphics and prints a JSON summary on
//! stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario with the default combat config
//! cargo run -p siege_headless -- run --scenario scenarios/outpost.ron
//!
//! # Custom config, tick budget and tick length
//! cargo run -p siege_headless -- run --scenario scenarios/outpost.ron --config combat.ron --ticks 2000 --dt 0.1
//!
//! # Verify determinism by running the same scenario several times
//! cargo run -p siege_headless -- verify --scenario scenarios/outpost.ron --runs 5
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use siege_core::math::Fixed;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use siege_headless::{load_config_or_default, load_scenario, run_session, verify_scenario, LoadError, RunConfig};

#[derive(Parser)]
#[command(name = "siege_headless")]
#[command(about = "Headless attack session runner for scenario testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one attack session
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Combat config file (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum number of ticks
        #[arg(short, long, default_value = "6000")]
        ticks: u64,

        /// Seconds per tick
        #[arg(long, default_value = "0.05")]
        dt: f64,

        /// Skip day resolution after the session
        #[arg(long)]
        no_day_end: bool,
    },

    /// Verify determinism by running the same scenario multiple times
    Verify {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Combat config file (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum number of ticks per run
        #[arg(short, long, default_value = "6000")]
        ticks: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is for the JSON summary
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            config,
            ticks,
            dt,
            no_day_end,
        } => cmd_run(scenario, config, ticks, dt, no_day_end),
        Commands::Verify {
            scenario,
            config,
            ticks,
            runs,
        } => cmd_verify(scenario, config, ticks, runs),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(%err, "Headless run failed");
            ExitCode::FAILURE
        }
    }
}

/// Run a single session and print its summary.
fn cmd_run(
    scenario: PathBuf,
    config: Option<PathBuf>,
    ticks: u64,
    dt: f64,
    no_day_end: bool,
) -> Result<ExitCode, LoadError> {
    let scenario = load_scenario(&scenario)?;
    let config = load_config_or_default(config.as_deref())?;
    let Some(dt) = Fixed::checked_from_num(dt).filter(|dt| *dt > Fixed::ZERO) else {
        tracing::error!(dt, "Tick length must be a positive number");
        return Ok(ExitCode::FAILURE);
    };

    let run = RunConfig {
        max_ticks: ticks,
        dt,
        resolve_day: !no_day_end,
    };
    let summary = run_session(config, &scenario, run)?;
    print_json(&summary);
    Ok(ExitCode::SUCCESS)
}

/// Run a scenario several times and compare final hashes.
fn cmd_verify(scenario: PathBuf, config: Option<PathBuf>, ticks: u64, runs: u32) -> Result<ExitCode, LoadError> {
    let scenario = load_scenario(&scenario)?;
    let config = load_config_or_default(config.as_deref())?;
    tracing::info!(scenario = %scenario.name, runs, "Verifying determinism");

    let run = RunConfig {
        max_ticks: ticks,
        ..RunConfig::default()
    };
    let report = verify_scenario(&config, &scenario, run, runs)?;
    print_json(&report);
    if report.deterministic {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::error!(%err, "Failed to serialize summary"),
    }
}
