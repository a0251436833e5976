//! RepairNet launcher
//!
//! Each invocation is one externally triggered pass or one operator action;
//! nothing runs in the background.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "repairnet", about = "Interface error detection and staged remediation")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: $REPAIRNET_HOME/repairnet.toml)
    #[arg(short = 'c', long, global = true, env = "REPAIRNET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect events in the current telemetry window and open incidents
    Detect {
        /// Newline-delimited JSON telemetry export
        #[arg(long)]
        telemetry: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run pending incidents through their remediation chains
    Handle {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Full pass: detect, open incidents, then handle them
    Run {
        /// Newline-delimited JSON telemetry export
        #[arg(long)]
        telemetry: PathBuf,

        /// Write counters in Prometheus text format to this file after the pass
        #[arg(long)]
        metrics_file: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the topology snapshot
    Hosts {
        #[command(subcommand)]
        action: cli::hosts::HostsAction,
    },

    /// Inspect and recover incidents
    Incidents {
        #[command(subcommand)]
        action: cli::incidents::IncidentsAction,
    },

    /// Show the effective configuration
    Config {
        /// Output as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match repairnet_logging::init_logging(repairnet_logging::LogConfig {
        app_name: "repairnet",
        verbose: cli.verbose,
    }) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: file logging disabled: {:#}", e);
            None
        }
    };

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let ctx = cli::context::CliContext::load(cli.config.as_deref())?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Detect { telemetry, json } => cli::pass::detect(&ctx, &telemetry, json).await,
            Commands::Handle { json } => cli::pass::handle(&ctx, json).await,
            Commands::Run {
                telemetry,
                metrics_file,
                json,
            } => cli::pass::run(&ctx, &telemetry, metrics_file.as_deref(), json).await,
            Commands::Hosts { action } => cli::hosts::run(&ctx, action).await,
            Commands::Incidents { action } => cli::incidents::run(&ctx, action).await,
            Commands::Config { json } => cli::config::run(&ctx, json),
        }
    })
}
