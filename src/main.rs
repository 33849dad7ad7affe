//! arbor - hierarchical statechart runner
//!
//! Loads a chart from a JSON or YAML file, then validates it, fires a batch
//! of events against it, or drives it interactively.

mod commands;
mod config;
mod repl;
mod session;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Run hierarchical statecharts from JSON or YAML files")]
#[command(version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, env = "ARBOR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log engine steps (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a chart and print its tree
    Check {
        /// Chart file (.json, .yaml or .yml)
        chart: PathBuf,
    },

    /// Fire events against a fresh instance
    Run {
        /// Chart file (.json, .yaml or .yml)
        chart: PathBuf,

        /// Initial state path, overriding the chart's
        #[arg(short, long)]
        initial: Option<String>,

        /// Initial context JSON (or @file.json to read from file)
        #[arg(short, long)]
        ctx: Option<String>,

        /// Events to fire, as `name` or `name:json`
        events: Vec<String>,
    },

    /// Start interactive REPL
    Repl {
        /// Chart file (.json, .yaml or .yml)
        chart: PathBuf,

        /// Initial state path, overriding the chart's
        #[arg(short, long)]
        initial: Option<String>,

        /// Initial context JSON (or @file.json to read from file)
        #[arg(short, long)]
        ctx: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Commands::Repl {
            chart,
            initial,
            ctx,
        } => {
            repl::run(&config, &chart, initial.as_deref(), ctx.as_deref())?;
        }
        cmd => match commands::execute(&config, cmd) {
            Ok(output) => {
                println!("{}", output);
            }
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
