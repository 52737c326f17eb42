//! AdbPilot CLI — the main entry point.
//!
//! Commands:
//! - `run`      — Carry out a task on the device
//! - `devices`  — List attached devices
//! - `actions`  — Print the action catalog
//! - `doctor`   — Diagnose system health
//! - `onboard`  — Write a default config

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "adbpilot",
    about = "AdbPilot — drive an Android device with an LLM over adb",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Carry out a task on the device
    Run {
        /// What the agent should do, in plain language
        task: String,

        /// Target device serial (overrides config and ADBPILOT_DEVICE)
        #[arg(short, long)]
        serial: Option<String>,

        /// Maximum model rounds before giving up (at least 1)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_rounds: Option<u32>,
    },

    /// List attached devices
    Devices,

    /// Print the actions advertised to the model
    Actions,

    /// Diagnose system health
    Doctor,

    /// Initialize configuration
    Onboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            task,
            serial,
            max_rounds,
        } => commands::run::run(task, serial, max_rounds).await?,
        Commands::Devices => commands::devices::run().await?,
        Commands::Actions => commands::actions::run()?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Onboard => commands::onboard::run().await?,
    }

    Ok(())
}
